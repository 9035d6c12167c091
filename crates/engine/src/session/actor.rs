// Session actor: the single owner of a chapter's buffer.
//
// Every mutation (typed edits, stream tokens, fix application, rollback)
// arrives as a message and is applied in receipt order against the latest
// committed text. Network calls that don't need the buffer run on their own
// tasks and report back through the event queue.

use std::future::pending;
use std::ops::Range;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace, warn};

use inkstone_common::protocol::api::{ContinueRequest, RewriteRequest};
use inkstone_common::text::{
    char_count, char_slice, needs_line_break, replace_first, splice_chars, trailing_window,
};
use inkstone_common::types::{
    Chapter, ConsistencyIssue, FixProposal, Snapshot, SnapshotId,
};

use super::autosave::AutosaveScheduler;
use super::buffer::Buffer;
use super::issues::{IssueBoard, IssueEntry, IssueId};
use super::stream::{spawn_ingest, StreamEvent, StreamId};
use super::view::{SessionNotice, SessionView};
use super::writer::{Reply, WriterHandle};
use crate::backend::{Backend, BackendError};
use crate::config::EditorConfig;
use crate::error::{RejectReason, SessionError};

pub(crate) type Respond<T> = oneshot::Sender<Result<T, SessionError>>;

/// Requests from the session handle.
pub(crate) enum Command {
    Commit { text: String, reply: oneshot::Sender<u64> },
    Save { reply: Reply<()> },
    StartContinuation { instruction: Option<String>, reply: Respond<()> },
    CancelStream { reply: oneshot::Sender<bool> },
    RewriteSelection { range: Range<usize>, instruction: String, reply: Respond<String> },
    DetectIssues { reply: Respond<Vec<IssueEntry>> },
    GenerateFix { id: IssueId, reply: Respond<FixProposal> },
    ApplyFix { id: IssueId, reply: Respond<()> },
    IgnoreIssue { id: IssueId, reply: Respond<()> },
    CreateSnapshot { label: Option<String>, reply: Reply<Snapshot> },
    Rollback { snapshot_id: SnapshotId, reply: Respond<()> },
    Close { reply: oneshot::Sender<()> },
}

/// Results reported back by tasks the actor spawned.
pub(crate) enum Event {
    Stream { stream_id: StreamId, event: StreamEvent },
    IssuesDetected {
        seq: u64,
        result: Result<Vec<ConsistencyIssue>, BackendError>,
        reply: Respond<Vec<IssueEntry>>,
    },
    FixGenerated {
        id: IssueId,
        result: Result<FixProposal, BackendError>,
        reply: Respond<FixProposal>,
    },
    Rewritten {
        range: Range<usize>,
        original: String,
        result: Result<String, BackendError>,
        reply: Respond<String>,
    },
}

struct ActiveStream {
    id: StreamId,
    task: JoinHandle<()>,
    /// Answered when the service accepts or refuses the request.
    opened: Option<Respond<()>>,
    /// A newline goes in before the first token.
    line_break_pending: bool,
    appended_chars: usize,
}

pub(crate) struct SessionActor<B: Backend> {
    backend: Arc<B>,
    chapter: Chapter,
    config: EditorConfig,
    buffer: Buffer,
    autosave: AutosaveScheduler,
    board: IssueBoard,
    stream: Option<ActiveStream>,
    next_stream_id: StreamId,
    /// Detections started, and the latest one whose result was applied.
    detections_started: u64,
    detection_applied: u64,
    auto_snapshot_taken: bool,
    writer: WriterHandle,
    view: Arc<watch::Sender<SessionView>>,
    notices: broadcast::Sender<SessionNotice>,
    events: mpsc::UnboundedSender<Event>,
}

impl<B: Backend> SessionActor<B> {
    pub fn new(
        backend: Arc<B>,
        chapter: Chapter,
        config: EditorConfig,
        writer: WriterHandle,
        view: Arc<watch::Sender<SessionView>>,
        notices: broadcast::Sender<SessionNotice>,
        events: mpsc::UnboundedSender<Event>,
    ) -> Self {
        let buffer = Buffer::new(chapter.body());
        let autosave = AutosaveScheduler::new(config.autosave_window());
        Self {
            backend,
            chapter,
            config,
            buffer,
            autosave,
            board: IssueBoard::new(),
            stream: None,
            next_stream_id: 0,
            detections_started: 0,
            detection_applied: 0,
            auto_snapshot_taken: false,
            writer,
            view,
            notices,
            events,
        }
    }

    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::UnboundedReceiver<Event>,
        writer_task: JoinHandle<()>,
    ) {
        self.publish();
        info!(chapter_id = self.chapter.id, chars = self.buffer.char_count(), "session opened");

        let close_reply = loop {
            let deadline = self.autosave.deadline();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Close { reply }) => break Some(reply),
                    Some(command) => self.handle_command(command).await,
                    None => break None,
                },
                Some(event) = events.recv() => self.handle_event(event),
                _ = wait_for(deadline) => {
                    if self.autosave.take_due() {
                        trace!(chapter_id = self.chapter.id, revision = self.buffer.revision(), "autosave due");
                        self.writer.save_detached(self.buffer.text().to_string());
                    }
                }
            }
        };

        self.shutdown(writer_task).await;
        if let Some(reply) = close_reply {
            let _ = reply.send(());
        }
    }

    // ── Commands ────────────────────────────────────────────────────

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Commit { text, reply } => {
                if self.buffer.commit(text) {
                    self.autosave.arm();
                    self.publish();
                }
                let _ = reply.send(self.buffer.revision());
            }
            Command::Save { reply } => {
                self.autosave.cancel();
                self.writer.save_with(self.buffer.text().to_string(), reply);
            }
            Command::StartContinuation { instruction, reply } => {
                self.start_continuation(instruction, reply);
            }
            Command::CancelStream { reply } => {
                let _ = reply.send(self.cancel_stream());
            }
            Command::RewriteSelection { range, instruction, reply } => {
                if let Err(reason) = self.start_rewrite(range, instruction, reply) {
                    debug!(chapter_id = self.chapter.id, %reason, "rewrite rejected");
                }
            }
            Command::DetectIssues { reply } => self.start_detection(reply),
            Command::GenerateFix { id, reply } => self.start_fix_generation(id, reply),
            Command::ApplyFix { id, reply } => {
                let result = self.apply_fix(id).await;
                let _ = reply.send(result);
            }
            Command::IgnoreIssue { id, reply } => {
                let result = self.board.ignore(id).map_err(SessionError::from);
                if result.is_ok() {
                    debug!(chapter_id = self.chapter.id, issue = %id, "issue ignored");
                    self.publish();
                }
                let _ = reply.send(result);
            }
            Command::CreateSnapshot { label, reply } => {
                // The service snapshots stored content, so persist the buffer first.
                self.autosave.cancel();
                self.writer.save_detached(self.buffer.text().to_string());
                let label = label
                    .filter(|label| !label.trim().is_empty())
                    .unwrap_or_else(|| format!("Manual snapshot - {}", timestamp_label()));
                self.writer.create_snapshot_with(label, reply);
            }
            Command::Rollback { snapshot_id, reply } => {
                let result = self.rollback(snapshot_id).await;
                let _ = reply.send(result);
            }
            Command::Close { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn start_continuation(&mut self, instruction: Option<String>, reply: Respond<()>) {
        if self.stream.is_some() {
            let _ = reply.send(Err(RejectReason::AlreadyStreaming.into()));
            return;
        }

        let text = self.buffer.text();
        let request = ContinueRequest {
            project_id: self.chapter.project_id,
            chapter_id: self.chapter.id,
            context: trailing_window(text, self.config.context_chars).to_string(),
            instruction: Some(
                instruction
                    .filter(|i| !i.trim().is_empty())
                    .unwrap_or_else(|| self.config.continue_instruction.clone()),
            ),
        };
        let line_break_pending = needs_line_break(text);

        let id = self.next_stream_id;
        self.next_stream_id += 1;
        let task = spawn_ingest(self.backend.clone(), request, id, self.events.clone());
        self.stream = Some(ActiveStream {
            id,
            task,
            opened: Some(reply),
            line_break_pending,
            appended_chars: 0,
        });
        info!(chapter_id = self.chapter.id, stream_id = id, "continuation started");
        self.publish();
    }

    /// Stop the active stream, if any. Tokens already queued from it are
    /// dropped when they arrive. A start still waiting on the service
    /// resolves as accepted.
    fn cancel_stream(&mut self) -> bool {
        let Some(mut stream) = self.stream.take() else {
            return false;
        };
        stream.task.abort();
        if let Some(opened) = stream.opened.take() {
            let _ = opened.send(Ok(()));
        }
        info!(chapter_id = self.chapter.id, stream_id = stream.id, "continuation cancelled");
        self.notify(SessionNotice::GenerationStopped {
            appended_chars: stream.appended_chars,
            error: None,
        });
        self.publish();
        true
    }

    fn start_rewrite(
        &mut self,
        range: Range<usize>,
        instruction: String,
        reply: Respond<String>,
    ) -> Result<(), RejectReason> {
        let checked = self.check_selection(&range, &instruction);
        let original = match checked {
            Ok(original) => original,
            Err(reason) => {
                let _ = reply.send(Err(reason.clone().into()));
                return Err(reason);
            }
        };

        let backend = self.backend.clone();
        let events = self.events.clone();
        let request =
            RewriteRequest { project_id: self.chapter.project_id, text: original.clone(), instruction };
        tokio::spawn(async move {
            let result = backend.rewrite(request).await;
            let _ = events.send(Event::Rewritten { range, original, result, reply });
        });
        Ok(())
    }

    fn check_selection(&self, range: &Range<usize>, instruction: &str) -> Result<String, RejectReason> {
        if range.start >= range.end {
            return Err(RejectReason::EmptySelection);
        }
        let len = self.buffer.char_count();
        if range.end > len {
            return Err(RejectReason::SelectionOutOfBounds { end: range.end, len });
        }
        let selected = range.end - range.start;
        if selected > self.config.rewrite_max_chars {
            return Err(RejectReason::SelectionTooLong {
                len: selected,
                max: self.config.rewrite_max_chars,
            });
        }
        if instruction.trim().is_empty() {
            return Err(RejectReason::EmptyInput("instruction"));
        }
        char_slice(self.buffer.text(), range.clone())
            .map(str::to_string)
            .ok_or(RejectReason::SelectionOutOfBounds { end: range.end, len })
    }

    fn start_detection(&mut self, reply: Respond<Vec<IssueEntry>>) {
        // Detection reads stored content; flush a pending save ahead of it.
        let flushed = if self.autosave.cancel() {
            Some(self.writer.save(self.buffer.text().to_string()))
        } else {
            None
        };

        self.detections_started += 1;
        let seq = self.detections_started;
        let backend = self.backend.clone();
        let events = self.events.clone();
        let chapter_id = self.chapter.id;
        tokio::spawn(async move {
            if let Some(flushed) = flushed {
                if let Ok(Err(error)) = flushed.await {
                    warn!(chapter_id, %error, "save before consistency check failed");
                }
            }
            let result = backend.detect_issues(chapter_id).await;
            let _ = events.send(Event::IssuesDetected { seq, result, reply });
        });
    }

    fn start_fix_generation(&mut self, id: IssueId, reply: Respond<FixProposal>) {
        let request = match self.board.begin_fix(id) {
            Ok(request) => request,
            Err(reason) => {
                let _ = reply.send(Err(reason.into()));
                return;
            }
        };
        debug!(chapter_id = self.chapter.id, issue = %id, "generating fix");
        self.publish();

        let backend = self.backend.clone();
        let events = self.events.clone();
        let chapter_id = self.chapter.id;
        tokio::spawn(async move {
            let result = backend.generate_fix(chapter_id, request).await;
            let _ = events.send(Event::FixGenerated { id, result, reply });
        });
    }

    async fn apply_fix(&mut self, id: IssueId) -> Result<(), SessionError> {
        let proposal = self.board.proposal(id)?.clone();

        if !self.auto_snapshot_taken {
            self.take_auto_snapshot().await;
        }

        let fixed = replace_first(self.buffer.text(), &proposal.original, &proposal.fixed)
            .ok_or(RejectReason::NoLongerMatches)?;
        self.board.mark_fixed(id)?;
        self.buffer.commit(fixed);
        self.autosave.cancel();
        self.writer.save_detached(self.buffer.text().to_string());
        info!(chapter_id = self.chapter.id, issue = %id, "fix applied");
        self.notify(SessionNotice::FixApplied { issue: id });
        self.publish();
        Ok(())
    }

    /// Save, then snapshot, before the first fix of the session. Failure is
    /// reported but never blocks the fix; the next fix tries again.
    async fn take_auto_snapshot(&mut self) {
        self.autosave.cancel();
        let saved = self.writer.save(self.buffer.text().to_string());
        let created = self
            .writer
            .create_snapshot(format!("Auto snapshot before fix - {}", timestamp_label()));

        if let Ok(Err(error)) = saved.await {
            warn!(chapter_id = self.chapter.id, %error, "save before auto snapshot failed");
        }
        match created.await {
            Ok(Ok(snapshot)) => {
                self.auto_snapshot_taken = true;
                info!(chapter_id = self.chapter.id, snapshot_id = snapshot.id, "auto snapshot taken");
            }
            Ok(Err(error)) => {
                warn!(chapter_id = self.chapter.id, %error, "auto snapshot failed");
                self.notify(SessionNotice::AutoSnapshotFailed { message: error.to_string() });
            }
            Err(_) => warn!(chapter_id = self.chapter.id, "document writer gone before auto snapshot"),
        }
    }

    /// On failure the buffer, pending save and running stream are untouched.
    async fn rollback(&mut self, snapshot_id: SnapshotId) -> Result<(), SessionError> {
        let chapter = self.writer.rollback(snapshot_id).await.map_err(|_| SessionError::Closed)??;
        self.cancel_stream();
        self.autosave.cancel();
        self.buffer.commit(chapter.body().to_string());
        self.chapter = chapter;
        info!(chapter_id = self.chapter.id, snapshot_id, "rolled back to snapshot");
        self.notify(SessionNotice::RolledBack { snapshot_id });
        self.publish();
        Ok(())
    }

    // ── Events ──────────────────────────────────────────────────────

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Stream { stream_id, event } => self.handle_stream_event(stream_id, event),
            Event::IssuesDetected { seq, result, reply } => {
                let result = match result {
                    Ok(_) if seq < self.detection_applied => {
                        debug!(chapter_id = self.chapter.id, seq, "dropping stale consistency check");
                        Err(RejectReason::Superseded.into())
                    }
                    Ok(issues) => {
                        self.detection_applied = seq;
                        let batch = self.board.replace(issues);
                        info!(
                            chapter_id = self.chapter.id,
                            %batch,
                            count = self.board.entries().len(),
                            "consistency check finished"
                        );
                        self.publish();
                        Ok(self.board.entries().to_vec())
                    }
                    Err(error) => Err(error.into()),
                };
                let _ = reply.send(result);
            }
            Event::FixGenerated { id, result, reply } => {
                let result = match result {
                    Ok(proposal) if self.board.fix_generated(id, proposal.clone()) => {
                        self.publish();
                        Ok(proposal)
                    }
                    Ok(_) => {
                        debug!(chapter_id = self.chapter.id, issue = %id, "dropping fix for replaced issue");
                        Err(RejectReason::UnknownIssue.into())
                    }
                    Err(error) => {
                        warn!(chapter_id = self.chapter.id, issue = %id, %error, "fix generation failed");
                        if self.board.fix_failed(id) {
                            self.publish();
                        }
                        Err(error.into())
                    }
                };
                let _ = reply.send(result);
            }
            Event::Rewritten { range, original, result, reply } => {
                let result = result
                    .map_err(SessionError::from)
                    .and_then(|rewritten| self.splice_rewrite(range, &original, rewritten));
                let _ = reply.send(result);
            }
        }
    }

    fn handle_stream_event(&mut self, stream_id: StreamId, event: StreamEvent) {
        let Some(stream) = self.stream.as_mut().filter(|stream| stream.id == stream_id) else {
            trace!(chapter_id = self.chapter.id, stream_id, "dropping event from inactive stream");
            return;
        };

        match event {
            StreamEvent::Opened => {
                if let Some(opened) = stream.opened.take() {
                    let _ = opened.send(Ok(()));
                }
            }
            StreamEvent::Token(token) => {
                if stream.line_break_pending {
                    stream.line_break_pending = false;
                    self.buffer.append("\n");
                }
                stream.appended_chars += char_count(&token);
                self.buffer.append(&token);
                self.autosave.arm();
                self.publish();
            }
            StreamEvent::Finished => {
                let appended_chars = stream.appended_chars;
                self.stream = None;
                self.autosave.cancel();
                self.writer.save_detached(self.buffer.text().to_string());
                info!(chapter_id = self.chapter.id, stream_id, appended_chars, "continuation finished");
                self.notify(SessionNotice::GenerationCompleted { appended_chars });
                self.publish();
            }
            StreamEvent::Failed(error) => {
                if let Some(opened) = stream.opened.take() {
                    let _ = opened.send(Err(error.clone().into()));
                }
                let appended_chars = stream.appended_chars;
                self.stream = None;
                warn!(chapter_id = self.chapter.id, stream_id, %error, "continuation failed");
                self.notify(SessionNotice::GenerationStopped {
                    appended_chars,
                    error: Some(error.to_string()),
                });
                self.publish();
            }
        }
    }

    fn splice_rewrite(
        &mut self,
        range: Range<usize>,
        original: &str,
        rewritten: String,
    ) -> Result<String, SessionError> {
        let text = self.buffer.text();
        if char_slice(text, range.clone()) != Some(original) {
            return Err(RejectReason::NoLongerMatches.into());
        }
        let spliced = splice_chars(text, range, &rewritten).ok_or(RejectReason::NoLongerMatches)?;
        self.buffer.commit(spliced);
        self.autosave.cancel();
        self.writer.save_detached(self.buffer.text().to_string());
        debug!(chapter_id = self.chapter.id, "selection rewritten");
        self.publish();
        Ok(rewritten)
    }

    // ── Plumbing ────────────────────────────────────────────────────

    fn publish(&self) {
        let text = self.buffer.text();
        self.view.send_modify(|view| {
            view.chapter_id = self.chapter.id;
            if view.text != text {
                view.text = text.to_string();
            }
            view.char_count = self.buffer.char_count();
            view.revision = self.buffer.revision();
            view.streaming = self.stream.is_some();
            view.issues = self.board.entries().to_vec();
        });
    }

    fn notify(&self, notice: SessionNotice) {
        // No subscribers is fine.
        let _ = self.notices.send(notice);
    }

    async fn shutdown(mut self, writer_task: JoinHandle<()>) {
        self.cancel_stream();
        let flushed = self
            .autosave
            .cancel()
            .then(|| self.writer.save(self.buffer.text().to_string()));

        let chapter_id = self.chapter.id;
        drop(self);
        if let Some(flushed) = flushed {
            match flushed.await {
                Ok(Ok(())) => debug!(chapter_id, "pending save flushed on close"),
                Ok(Err(error)) => warn!(chapter_id, %error, "pending save failed on close"),
                Err(_) => warn!(chapter_id, "document writer gone before close flush"),
            }
        }
        let _ = writer_task.await;
        info!(chapter_id, "session closed");
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

fn timestamp_label() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
