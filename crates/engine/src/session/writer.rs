// Document writer: executes remote writes for one chapter strictly in the
// order they were queued. Saves, snapshot creation and rollback all go
// through here, so a save queued before a snapshot always lands first.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use inkstone_common::text::char_count;
use inkstone_common::types::{Chapter, ChapterId, Snapshot, SnapshotId};

use super::view::{SessionNotice, SessionView};
use crate::backend::{Backend, BackendError};

pub(crate) type Reply<T> = oneshot::Sender<Result<T, BackendError>>;

pub(crate) enum WriteOp {
    /// Persist `text`. Without a reply the save is silent: failures become a
    /// notice instead of an error.
    Save { text: String, reply: Option<Reply<()>> },
    CreateSnapshot { label: String, reply: Reply<Snapshot> },
    /// Restore the snapshot remotely, then re-fetch the chapter.
    Rollback { snapshot_id: SnapshotId, reply: Reply<Chapter> },
}

/// Queue side of the writer. Dropping every handle stops the writer once the
/// queue drains.
pub(crate) struct WriterHandle {
    tx: mpsc::UnboundedSender<WriteOp>,
}

impl WriterHandle {
    /// Silent save.
    pub fn save_detached(&self, text: String) {
        self.enqueue(WriteOp::Save { text, reply: None });
    }

    pub fn save(&self, text: String) -> oneshot::Receiver<Result<(), BackendError>> {
        let (reply, rx) = oneshot::channel();
        self.save_with(text, reply);
        rx
    }

    pub fn save_with(&self, text: String, reply: Reply<()>) {
        self.enqueue(WriteOp::Save { text, reply: Some(reply) });
    }

    pub fn create_snapshot(&self, label: String) -> oneshot::Receiver<Result<Snapshot, BackendError>> {
        let (reply, rx) = oneshot::channel();
        self.create_snapshot_with(label, reply);
        rx
    }

    pub fn create_snapshot_with(&self, label: String, reply: Reply<Snapshot>) {
        self.enqueue(WriteOp::CreateSnapshot { label, reply });
    }

    pub fn rollback(&self, snapshot_id: SnapshotId) -> oneshot::Receiver<Result<Chapter, BackendError>> {
        let (reply, rx) = oneshot::channel();
        self.enqueue(WriteOp::Rollback { snapshot_id, reply });
        rx
    }

    fn enqueue(&self, op: WriteOp) {
        // The writer only stops after every handle is gone.
        if self.tx.send(op).is_err() {
            warn!("document writer stopped, dropping write");
        }
    }
}

/// Spawn the writer task for `chapter_id`.
pub(crate) fn spawn_writer<B: Backend>(
    backend: Arc<B>,
    chapter_id: ChapterId,
    view: Arc<watch::Sender<SessionView>>,
    notices: broadcast::Sender<SessionNotice>,
) -> (WriterHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run_writer(backend, chapter_id, rx, view, notices));
    (WriterHandle { tx }, task)
}

async fn run_writer<B: Backend>(
    backend: Arc<B>,
    chapter_id: ChapterId,
    mut rx: mpsc::UnboundedReceiver<WriteOp>,
    view: Arc<watch::Sender<SessionView>>,
    notices: broadcast::Sender<SessionNotice>,
) {
    while let Some(op) = rx.recv().await {
        match op {
            WriteOp::Save { text, reply } => {
                view.send_modify(|view| view.saving = true);
                let result = backend.update_chapter(chapter_id, &text).await.map(|_| ());
                view.send_modify(|view| view.saving = false);

                match &result {
                    Ok(()) => {
                        let chars = char_count(&text);
                        debug!(chapter_id, chars, "chapter saved");
                        let _ = notices.send(SessionNotice::Saved { chars });
                    }
                    Err(error) if reply.is_none() => {
                        warn!(chapter_id, %error, "autosave failed");
                        let _ = notices.send(SessionNotice::SaveFailed { message: error.to_string() });
                    }
                    Err(error) => debug!(chapter_id, %error, "save failed"),
                }
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            WriteOp::CreateSnapshot { label, reply } => {
                let result = backend.create_snapshot(chapter_id, Some(label)).await;
                if let Ok(snapshot) = &result {
                    info!(chapter_id, snapshot_id = snapshot.id, "snapshot created");
                }
                let _ = reply.send(result);
            }
            WriteOp::Rollback { snapshot_id, reply } => {
                let result = match backend.rollback_snapshot(snapshot_id).await {
                    Ok(()) => backend.get_chapter(chapter_id).await,
                    Err(error) => Err(error),
                };
                let _ = reply.send(result);
            }
        }
    }
    debug!(chapter_id, "document writer stopped");
}
