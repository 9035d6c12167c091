// Document service collaborator contract.
//
// Everything the engine needs from the remote service goes through the
// `Backend` trait so sessions can run against the HTTP implementation or an
// in-memory double in tests. Streaming endpoints surface as bounded channels:
// dropping the receiver closes the underlying connection.

pub mod http;

use std::future::Future;

use tokio::sync::mpsc;

use inkstone_common::protocol::api::{ContinueRequest, FixRequest, RewriteRequest, TaskSubmission};
use inkstone_common::types::{
    BibleInputs, Chapter, ChapterId, ConsistencyIssue, FixProposal, ProjectId, Snapshot,
    SnapshotId, TaskUpdate,
};

pub use http::HttpBackend;

/// Capacity of the channels behind token streams and task subscriptions.
pub const STREAM_CHANNEL_CAPACITY: usize = 64;

/// Errors from the document service (network or server-side).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// Credentials missing or rejected.
    #[error("not authorized; log in again or set INKSTONE_TOKEN")]
    Unauthorized,
    /// The service answered with a non-success status.
    #[error("service returned {status}: {detail}")]
    Status { status: u16, detail: String },
    /// Network unreachable, connection reset, timeout.
    #[error("transport error: {0}")]
    Transport(String),
    /// The response body could not be decoded.
    #[error("invalid response: {0}")]
    Decode(String),
    /// An event stream ended before it delivered its final message.
    #[error("stream closed before completion")]
    StreamClosed,
}

/// Arrival-ordered text chunks of a streamed continuation.
///
/// `recv` yields `None` once the service closes the stream.
pub struct TokenStream {
    rx: mpsc::Receiver<Result<String, BackendError>>,
}

impl TokenStream {
    pub fn new(rx: mpsc::Receiver<Result<String, BackendError>>) -> Self {
        Self { rx }
    }

    /// Build a stream and the sender that feeds it.
    pub fn channel() -> (mpsc::Sender<Result<String, BackendError>>, Self) {
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        (tx, Self::new(rx))
    }

    pub async fn recv(&mut self) -> Option<Result<String, BackendError>> {
        self.rx.recv().await
    }
}

/// Pushed updates for one long-running task.
pub struct TaskSubscription {
    rx: mpsc::Receiver<Result<TaskUpdate, BackendError>>,
}

impl TaskSubscription {
    pub fn new(rx: mpsc::Receiver<Result<TaskUpdate, BackendError>>) -> Self {
        Self { rx }
    }

    pub fn channel() -> (mpsc::Sender<Result<TaskUpdate, BackendError>>, Self) {
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        (tx, Self::new(rx))
    }

    pub async fn recv(&mut self) -> Option<Result<TaskUpdate, BackendError>> {
        self.rx.recv().await
    }

    /// Stop receiving; the producer observes the closed channel and hangs up.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

/// Abstraction over the document service. Trait-based for testability.
///
/// All methods return `Send` futures so sessions can run on a
/// multi-threaded tokio runtime.
pub trait Backend: Send + Sync + 'static {
    fn get_chapter(
        &self,
        chapter_id: ChapterId,
    ) -> impl Future<Output = Result<Chapter, BackendError>> + Send;

    fn update_chapter(
        &self,
        chapter_id: ChapterId,
        content: &str,
    ) -> impl Future<Output = Result<Chapter, BackendError>> + Send;

    /// Open a streamed continuation. Resolves once the service accepted the
    /// request; chunks then arrive on the returned stream.
    fn continue_stream(
        &self,
        request: ContinueRequest,
    ) -> impl Future<Output = Result<TokenStream, BackendError>> + Send;

    fn rewrite(
        &self,
        request: RewriteRequest,
    ) -> impl Future<Output = Result<String, BackendError>> + Send;

    fn detect_issues(
        &self,
        chapter_id: ChapterId,
    ) -> impl Future<Output = Result<Vec<ConsistencyIssue>, BackendError>> + Send;

    fn generate_fix(
        &self,
        chapter_id: ChapterId,
        request: FixRequest,
    ) -> impl Future<Output = Result<FixProposal, BackendError>> + Send;

    /// The service snapshots the chapter's stored content.
    fn create_snapshot(
        &self,
        chapter_id: ChapterId,
        label: Option<String>,
    ) -> impl Future<Output = Result<Snapshot, BackendError>> + Send;

    fn list_snapshots(
        &self,
        chapter_id: ChapterId,
    ) -> impl Future<Output = Result<Vec<Snapshot>, BackendError>> + Send;

    fn get_snapshot(
        &self,
        snapshot_id: SnapshotId,
    ) -> impl Future<Output = Result<Snapshot, BackendError>> + Send;

    /// Restore the owning chapter's stored content from the snapshot.
    fn rollback_snapshot(
        &self,
        snapshot_id: SnapshotId,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    fn delete_snapshot(
        &self,
        snapshot_id: SnapshotId,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    fn submit_bible(
        &self,
        project_id: ProjectId,
        inputs: BibleInputs,
    ) -> impl Future<Output = Result<TaskSubmission, BackendError>> + Send;

    fn subscribe_task(
        &self,
        project_id: ProjectId,
        task_id: &str,
    ) -> impl Future<Output = Result<TaskSubscription, BackendError>> + Send;
}
