// In-memory document service for session tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use inkstone_common::protocol::api::{ContinueRequest, FixRequest, RewriteRequest, TaskSubmission};
use inkstone_common::types::{
    BibleInputs, Chapter, ChapterId, ConsistencyIssue, FixProposal, IssueKind, ProjectId,
    Snapshot, SnapshotId, TaskUpdate,
};
use inkstone_engine::backend::{Backend, BackendError, TaskSubscription, TokenStream};
use inkstone_engine::config::EditorConfig;
use inkstone_engine::session::{open_session, SessionHandle, SessionNotice};
use tokio::sync::{broadcast, mpsc};

pub const PROJECT_ID: ProjectId = 1;
pub const CHAPTER_ID: ChapterId = 7;

pub fn chapter(content: &str) -> Chapter {
    Chapter {
        id: CHAPTER_ID,
        project_id: PROJECT_ID,
        volume_id: 1,
        title: "Chapter 7: The Red Sky".into(),
        order_no: 7,
        status: "draft".into(),
        content: Some(content.to_string()),
        word_count: content.chars().count() as i64,
    }
}

pub fn issue(quote: Option<&str>, suggestion: Option<&str>) -> ConsistencyIssue {
    ConsistencyIssue {
        kind: IssueKind::Setting,
        description: "Contradicts the established setting".into(),
        quote: quote.map(Into::into),
        suggestion: suggestion.map(Into::into),
    }
}

pub fn proposal(original: &str, fixed: &str) -> FixProposal {
    FixProposal { original: original.into(), fixed: fixed.into() }
}

/// Let spawned tasks run. Time is paused in these tests, so this only
/// advances the clock once everything else is idle.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

pub async fn open(backend: &MockBackend) -> SessionHandle<MockBackend> {
    open_with(backend, EditorConfig::default()).await
}

pub async fn open_with(backend: &MockBackend, config: EditorConfig) -> SessionHandle<MockBackend> {
    open_session(Arc::new(backend.clone()), CHAPTER_ID, config)
        .await
        .expect("session should open")
}

/// Wait for the next notice matching `pick`.
pub async fn next_notice<T>(
    notices: &mut broadcast::Receiver<SessionNotice>,
    mut pick: impl FnMut(SessionNotice) -> Option<T>,
) -> T {
    loop {
        let notice = notices.recv().await.expect("notice channel should stay open");
        if let Some(found) = pick(notice) {
            return found;
        }
    }
}

#[derive(Default)]
pub struct MockState {
    pub chapters: HashMap<ChapterId, Chapter>,
    pub snapshots: Vec<Snapshot>,
    next_snapshot_id: SnapshotId,
    /// Every remote call, in order, e.g. `update:<text>`, `snapshot:<label>`.
    pub calls: Vec<String>,
    pub saves: Vec<String>,
    pub failing_saves: usize,
    pub failing_snapshots: usize,
    pub streams: VecDeque<Result<TokenStream, BackendError>>,
    /// Continuation requests never get an answer.
    pub stall_streams: bool,
    pub continue_requests: Vec<ContinueRequest>,
    pub issues: Vec<ConsistencyIssue>,
    /// Scripted consistency checks, answered after their delay. Falls back
    /// to `issues` once empty.
    pub delayed_checks: VecDeque<(Duration, Vec<ConsistencyIssue>)>,
    pub fixes: VecDeque<Result<FixProposal, BackendError>>,
    pub fix_requests: Vec<FixRequest>,
    pub rewrites: VecDeque<Result<String, BackendError>>,
    pub rewrite_requests: Vec<RewriteRequest>,
    pub submissions: VecDeque<Result<TaskSubmission, BackendError>>,
    pub bible_inputs: Vec<BibleInputs>,
    pub subscriptions: VecDeque<Result<TaskSubscription, BackendError>>,
}

/// Test backend that keeps chapters and snapshots in memory and returns
/// scripted responses for the generation endpoints.
#[derive(Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn with_chapter(chapter: Chapter) -> Self {
        let backend = Self::default();
        backend.state().chapters.insert(chapter.id, chapter);
        backend
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state lock")
    }

    pub fn saves(&self) -> Vec<String> {
        self.state().saves.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn stored_content(&self) -> String {
        self.state().chapters[&CHAPTER_ID].body().to_string()
    }

    pub fn snapshot_labels(&self) -> Vec<String> {
        self.state().snapshots.iter().filter_map(|s| s.label.clone()).collect()
    }

    /// Queue a continuation and return the sender that feeds it.
    pub fn push_stream(&self) -> mpsc::Sender<Result<String, BackendError>> {
        let (tx, stream) = TokenStream::channel();
        self.state().streams.push_back(Ok(stream));
        tx
    }

    pub fn push_fix(&self, result: Result<FixProposal, BackendError>) {
        self.state().fixes.push_back(result);
    }

    pub fn set_issues(&self, issues: Vec<ConsistencyIssue>) {
        self.state().issues = issues;
    }

    pub fn push_delayed_check(&self, delay: Duration, issues: Vec<ConsistencyIssue>) {
        self.state().delayed_checks.push_back((delay, issues));
    }

    /// Queue a task subscription and return the sender that feeds it.
    pub fn push_subscription(&self) -> mpsc::Sender<Result<TaskUpdate, BackendError>> {
        let (tx, subscription) = TaskSubscription::channel();
        self.state().subscriptions.push_back(Ok(subscription));
        tx
    }

    pub fn insert_snapshot(&self, content: &str, label: &str) -> SnapshotId {
        let mut state = self.state();
        state.next_snapshot_id += 1;
        let id = state.next_snapshot_id;
        state.snapshots.push(snapshot(id, content, label));
        id
    }
}

fn snapshot(id: SnapshotId, content: &str, label: &str) -> Snapshot {
    Snapshot {
        id,
        chapter_id: CHAPTER_ID,
        content: Some(content.to_string()),
        word_count: content.chars().count() as i64,
        label: Some(label.to_string()),
        // Later ids are newer.
        created_at: Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap() + chrono::Duration::minutes(id),
    }
}

fn not_found(what: &str) -> BackendError {
    BackendError::Status { status: 404, detail: format!("{what} not found") }
}

impl Backend for MockBackend {
    async fn get_chapter(&self, chapter_id: ChapterId) -> Result<Chapter, BackendError> {
        self.state().chapters.get(&chapter_id).cloned().ok_or_else(|| not_found("Chapter"))
    }

    async fn update_chapter(&self, chapter_id: ChapterId, content: &str) -> Result<Chapter, BackendError> {
        let mut state = self.state();
        state.calls.push(format!("update:{content}"));
        if state.failing_saves > 0 {
            state.failing_saves -= 1;
            return Err(BackendError::Transport("connection reset".into()));
        }
        state.saves.push(content.to_string());
        let chapter = state.chapters.get_mut(&chapter_id).ok_or_else(|| not_found("Chapter"))?;
        chapter.content = Some(content.to_string());
        chapter.word_count = content.chars().count() as i64;
        Ok(chapter.clone())
    }

    async fn continue_stream(&self, request: ContinueRequest) -> Result<TokenStream, BackendError> {
        let (stall, next) = {
            let mut state = self.state();
            state.calls.push("continue".into());
            state.continue_requests.push(request);
            (state.stall_streams, state.streams.pop_front())
        };
        if stall {
            std::future::pending::<()>().await;
        }
        next.unwrap_or_else(|| Err(BackendError::Status { status: 500, detail: "no stream scripted".into() }))
    }

    async fn rewrite(&self, request: RewriteRequest) -> Result<String, BackendError> {
        let mut state = self.state();
        state.rewrite_requests.push(request);
        state.rewrites.pop_front().unwrap_or_else(|| Ok("rewritten".into()))
    }

    async fn detect_issues(&self, _chapter_id: ChapterId) -> Result<Vec<ConsistencyIssue>, BackendError> {
        let delayed = {
            let mut state = self.state();
            state.calls.push("check".into());
            state.delayed_checks.pop_front()
        };
        match delayed {
            Some((delay, issues)) => {
                tokio::time::sleep(delay).await;
                Ok(issues)
            }
            None => Ok(self.state().issues.clone()),
        }
    }

    async fn generate_fix(&self, _chapter_id: ChapterId, request: FixRequest) -> Result<FixProposal, BackendError> {
        let mut state = self.state();
        state.fix_requests.push(request);
        state
            .fixes
            .pop_front()
            .unwrap_or_else(|| Err(BackendError::Status { status: 500, detail: "no fix scripted".into() }))
    }

    async fn create_snapshot(&self, chapter_id: ChapterId, label: Option<String>) -> Result<Snapshot, BackendError> {
        let mut state = self.state();
        let label = label.unwrap_or_default();
        state.calls.push(format!("snapshot:{label}"));
        if state.failing_snapshots > 0 {
            state.failing_snapshots -= 1;
            return Err(BackendError::Status { status: 500, detail: "snapshot store unavailable".into() });
        }
        let content = state.chapters.get(&chapter_id).ok_or_else(|| not_found("Chapter"))?.body().to_string();
        state.next_snapshot_id += 1;
        let created = snapshot(state.next_snapshot_id, &content, &label);
        state.snapshots.push(created.clone());
        Ok(Snapshot { content: None, ..created })
    }

    async fn list_snapshots(&self, chapter_id: ChapterId) -> Result<Vec<Snapshot>, BackendError> {
        Ok(self
            .state()
            .snapshots
            .iter()
            .filter(|s| s.chapter_id == chapter_id)
            .map(|s| Snapshot { content: None, ..s.clone() })
            .collect())
    }

    async fn get_snapshot(&self, snapshot_id: SnapshotId) -> Result<Snapshot, BackendError> {
        self.state().snapshots.iter().find(|s| s.id == snapshot_id).cloned().ok_or_else(|| not_found("Snapshot"))
    }

    async fn rollback_snapshot(&self, snapshot_id: SnapshotId) -> Result<(), BackendError> {
        let mut state = self.state();
        state.calls.push(format!("rollback:{snapshot_id}"));
        let snapshot =
            state.snapshots.iter().find(|s| s.id == snapshot_id).cloned().ok_or_else(|| not_found("Snapshot"))?;
        let chapter = state.chapters.get_mut(&snapshot.chapter_id).ok_or_else(|| not_found("Chapter"))?;
        chapter.content = snapshot.content;
        Ok(())
    }

    async fn delete_snapshot(&self, snapshot_id: SnapshotId) -> Result<(), BackendError> {
        let mut state = self.state();
        let before = state.snapshots.len();
        state.snapshots.retain(|s| s.id != snapshot_id);
        if state.snapshots.len() == before {
            return Err(not_found("Snapshot"));
        }
        Ok(())
    }

    async fn submit_bible(&self, _project_id: ProjectId, inputs: BibleInputs) -> Result<TaskSubmission, BackendError> {
        let mut state = self.state();
        state.bible_inputs.push(inputs);
        state.submissions.pop_front().unwrap_or_else(|| {
            Ok(TaskSubmission { task_id: "task-1".into(), message: "Generation started".into() })
        })
    }

    async fn subscribe_task(&self, _project_id: ProjectId, task_id: &str) -> Result<TaskSubscription, BackendError> {
        let mut state = self.state();
        state.calls.push(format!("subscribe:{task_id}"));
        state.subscriptions.pop_front().unwrap_or_else(|| Err(not_found("Task")))
    }
}
