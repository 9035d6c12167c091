// Editing session for one chapter.
//
// `open_session` loads the chapter and spawns two tasks: the session actor,
// which owns the buffer and applies every mutation in order, and the
// document writer, which performs remote writes in FIFO order. The returned
// `SessionHandle` is the only way in.

mod actor;
pub mod autosave;
pub mod buffer;
pub mod issues;
mod stream;
pub mod view;
mod writer;

use std::ops::Range;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use inkstone_common::types::{Chapter, ChapterId, FixProposal, Snapshot, SnapshotId};

use self::actor::{Command, SessionActor};
use crate::backend::Backend;
use crate::config::EditorConfig;
use crate::error::SessionError;

pub use self::issues::{FixState, IssueEntry, IssueId};
pub use self::view::{SessionNotice, SessionView};

const COMMAND_QUEUE_CAPACITY: usize = 64;
const NOTICE_CAPACITY: usize = 64;

/// Load `chapter_id` and start a session on it.
pub async fn open_session<B: Backend>(
    backend: Arc<B>,
    chapter_id: ChapterId,
    config: EditorConfig,
) -> Result<SessionHandle<B>, SessionError> {
    let chapter = backend.get_chapter(chapter_id).await?;
    Ok(SessionHandle::start(backend, chapter, config))
}

/// Handle to a running session.
///
/// Dropping the handle closes the session in the background; a pending
/// debounced save is still flushed. Use `close` to wait for that.
pub struct SessionHandle<B: Backend> {
    chapter: Chapter,
    backend: Arc<B>,
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<SessionView>,
    notices: broadcast::Sender<SessionNotice>,
    task: JoinHandle<()>,
}

impl<B: Backend> SessionHandle<B> {
    /// Start a session on an already-loaded chapter.
    pub fn start(backend: Arc<B>, chapter: Chapter, config: EditorConfig) -> Self {
        let (view_tx, view) = watch::channel(SessionView {
            chapter_id: chapter.id,
            ..SessionView::default()
        });
        let view_tx = Arc::new(view_tx);
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        let (commands, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let (writer, writer_task) =
            writer::spawn_writer(backend.clone(), chapter.id, view_tx.clone(), notices.clone());
        let actor = SessionActor::new(
            backend.clone(),
            chapter.clone(),
            config,
            writer,
            view_tx,
            notices.clone(),
            events_tx,
        );
        let task = tokio::spawn(actor.run(command_rx, events_rx, writer_task));

        Self { chapter, backend, commands, view, notices, task }
    }

    /// The chapter as loaded when the session opened.
    pub fn chapter(&self) -> &Chapter {
        &self.chapter
    }

    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    pub fn text(&self) -> String {
        self.view.borrow().text.clone()
    }

    /// Watch the session state.
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    pub fn notices(&self) -> broadcast::Receiver<SessionNotice> {
        self.notices.subscribe()
    }

    // ── Buffer ──────────────────────────────────────────────────────

    /// Replace the buffer with `text` and re-arm the autosave. Returns the
    /// buffer revision after the commit.
    pub async fn commit(&self, text: impl Into<String>) -> Result<u64, SessionError> {
        let text = text.into();
        self.request(|reply| Command::Commit { text, reply }).await
    }

    /// Save immediately, cancelling any pending debounced save.
    pub async fn save(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::Save { reply }).await??;
        Ok(())
    }

    // ── Generation ──────────────────────────────────────────────────

    /// Start streaming a continuation into the buffer. Resolves once the
    /// service accepted the request, or once the stream was cancelled before
    /// that. Watch `streaming` or the notices for the end of the stream.
    pub async fn start_continuation(&self, instruction: Option<String>) -> Result<(), SessionError> {
        self.request(|reply| Command::StartContinuation { instruction, reply }).await?
    }

    /// Returns whether a stream was running.
    pub async fn cancel_stream(&self) -> Result<bool, SessionError> {
        self.request(|reply| Command::CancelStream { reply }).await
    }

    /// Rewrite the characters in `range` and splice the result back in.
    pub async fn rewrite_selection(
        &self,
        range: Range<usize>,
        instruction: impl Into<String>,
    ) -> Result<String, SessionError> {
        let instruction = instruction.into();
        self.request(|reply| Command::RewriteSelection { range, instruction, reply }).await?
    }

    // ── Issues ──────────────────────────────────────────────────────

    /// Run a consistency check. The result replaces the previous batch
    /// unless a check started later has already landed.
    pub async fn detect_issues(&self) -> Result<Vec<IssueEntry>, SessionError> {
        self.request(|reply| Command::DetectIssues { reply }).await?
    }

    pub async fn generate_fix(&self, id: IssueId) -> Result<FixProposal, SessionError> {
        self.request(|reply| Command::GenerateFix { id, reply }).await?
    }

    /// Apply the previewed fix for `id`. The first fix of the session is
    /// preceded by an automatic snapshot.
    pub async fn apply_fix(&self, id: IssueId) -> Result<(), SessionError> {
        self.request(|reply| Command::ApplyFix { id, reply }).await?
    }

    pub async fn ignore_issue(&self, id: IssueId) -> Result<(), SessionError> {
        self.request(|reply| Command::IgnoreIssue { id, reply }).await?
    }

    // ── Snapshots ───────────────────────────────────────────────────

    /// Save, then snapshot the chapter. A missing label gets a timestamped one.
    pub async fn create_snapshot(&self, label: Option<String>) -> Result<Snapshot, SessionError> {
        Ok(self.request(|reply| Command::CreateSnapshot { label, reply }).await??)
    }

    /// Snapshots of this chapter, newest first.
    pub async fn list_snapshots(&self) -> Result<Vec<Snapshot>, SessionError> {
        let mut snapshots = self.backend.list_snapshots(self.chapter.id).await?;
        snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(snapshots)
    }

    pub async fn get_snapshot(&self, snapshot_id: SnapshotId) -> Result<Snapshot, SessionError> {
        Ok(self.backend.get_snapshot(snapshot_id).await?)
    }

    /// Restore a snapshot and replace the buffer with the restored chapter.
    /// Once the service has restored it, any running continuation and
    /// pending debounced save are cancelled.
    pub async fn rollback(&self, snapshot_id: SnapshotId) -> Result<(), SessionError> {
        self.request(|reply| Command::Rollback { snapshot_id, reply }).await?
    }

    pub async fn delete_snapshot(&self, snapshot_id: SnapshotId) -> Result<(), SessionError> {
        Ok(self.backend.delete_snapshot(snapshot_id).await?)
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Stop the session: cancel any stream, flush a pending save, and wait
    /// for outstanding writes.
    pub async fn close(self) {
        let (reply, done) = oneshot::channel();
        if self.commands.send(Command::Close { reply }).await.is_ok() {
            let _ = done.await;
        }
        let _ = self.task.await;
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(build(reply)).await.map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }
}
