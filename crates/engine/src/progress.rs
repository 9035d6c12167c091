// Progress tracking for long-running server tasks.
//
// The service pushes `{progress, message, completed?, error?}` updates.
// `ProgressTracker` folds them into a value that never goes backwards and a
// single terminal outcome; `ProgressWatch` runs a tracker against a live
// subscription.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use inkstone_common::types::{ProjectId, TaskUpdate};

use crate::backend::{Backend, BackendError};

const EVENT_CAPACITY: usize = 32;
const COMPLETE: u8 = 100;

/// How a task ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskOutcome {
    Completed,
    Failed { message: String },
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// What a consumer observes, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Progress moved forward.
    Advanced { progress: u8 },
    /// A new status message.
    Message { message: String },
    /// Terminal; nothing follows.
    Finished { outcome: TaskOutcome },
}

// ── Tracker ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    progress: u8,
    message: String,
    outcome: Option<TaskOutcome>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn outcome(&self) -> Option<&TaskOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    /// Fold one update into the tracker and return what changed.
    ///
    /// Regressions are dropped, an error wins over a simultaneous
    /// `completed`, and nothing is reported after the terminal event.
    pub fn observe(&mut self, update: &TaskUpdate) -> Vec<ProgressEvent> {
        if self.is_finished() {
            return Vec::new();
        }
        let mut events = Vec::new();

        if let Some(message) = update.message.as_deref().filter(|m| !m.is_empty()) {
            if message != self.message {
                self.message = message.to_string();
                events.push(ProgressEvent::Message { message: self.message.clone() });
            }
        }

        if let Some(error) = update.error.as_deref().filter(|e| !e.is_empty()) {
            events.push(self.finish(TaskOutcome::Failed { message: error.to_string() }));
            return events;
        }

        let progress = clamp_progress(update.progress);
        let done = update.completed || progress >= COMPLETE;
        let target = if done { COMPLETE } else { progress };
        if target > self.progress {
            self.progress = target;
            events.push(ProgressEvent::Advanced { progress: target });
        }
        if done {
            events.push(self.finish(TaskOutcome::Completed));
        }
        events
    }

    /// The subscription failed or ended. Without a terminal update already
    /// seen, that is a failure.
    pub fn interrupted(&mut self, error: &BackendError) -> Option<ProgressEvent> {
        if self.is_finished() {
            return None;
        }
        Some(self.finish(TaskOutcome::Failed { message: error.to_string() }))
    }

    fn finish(&mut self, outcome: TaskOutcome) -> ProgressEvent {
        self.outcome = Some(outcome.clone());
        ProgressEvent::Finished { outcome }
    }
}

fn clamp_progress(raw: i64) -> u8 {
    raw.clamp(0, i64::from(COMPLETE)) as u8
}

// ── Live watch ──────────────────────────────────────────────────────

/// A running subscription to one task's updates.
///
/// Dropping the watch closes the subscription.
pub struct ProgressWatch {
    task_id: String,
    events: mpsc::Receiver<ProgressEvent>,
    mirror: ProgressTracker,
    task: JoinHandle<()>,
}

impl ProgressWatch {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Last progress seen through `next`.
    pub fn progress(&self) -> u8 {
        self.mirror.progress
    }

    pub fn message(&self) -> &str {
        &self.mirror.message
    }

    /// Next event, or `None` after the terminal event.
    pub async fn next(&mut self) -> Option<ProgressEvent> {
        let event = self.events.recv().await?;
        match &event {
            ProgressEvent::Advanced { progress } => self.mirror.progress = *progress,
            ProgressEvent::Message { message } => self.mirror.message.clone_from(message),
            ProgressEvent::Finished { outcome } => self.mirror.outcome = Some(outcome.clone()),
        }
        Some(event)
    }

    /// Drain events until the task ends, handing each to `on_event`.
    pub async fn finish(mut self, mut on_event: impl FnMut(&ProgressEvent)) -> TaskOutcome {
        while let Some(event) = self.next().await {
            on_event(&event);
            if let ProgressEvent::Finished { outcome } = event {
                return outcome;
            }
        }
        self.mirror.outcome.clone().unwrap_or_else(|| TaskOutcome::Failed {
            message: BackendError::StreamClosed.to_string(),
        })
    }
}

impl Drop for ProgressWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Subscribe to `task_id` and start tracking it.
pub fn watch_task<B: Backend>(
    backend: Arc<B>,
    project_id: ProjectId,
    task_id: impl Into<String>,
) -> ProgressWatch {
    let task_id = task_id.into();
    let (tx, events) = mpsc::channel(EVENT_CAPACITY);
    let task = tokio::spawn(pump(backend, project_id, task_id.clone(), tx));
    ProgressWatch { task_id, events, mirror: ProgressTracker::new(), task }
}

async fn pump<B: Backend>(
    backend: Arc<B>,
    project_id: ProjectId,
    task_id: String,
    tx: mpsc::Sender<ProgressEvent>,
) {
    let mut tracker = ProgressTracker::new();
    let mut subscription = match backend.subscribe_task(project_id, &task_id).await {
        Ok(subscription) => subscription,
        Err(error) => {
            warn!(%task_id, %error, "could not subscribe to task progress");
            if let Some(event) = tracker.interrupted(&error) {
                let _ = tx.send(event).await;
            }
            return;
        }
    };
    debug!(%task_id, "watching task progress");

    while let Some(update) = subscription.recv().await {
        let events = match update {
            Ok(update) => tracker.observe(&update),
            Err(BackendError::Decode(_)) => continue,
            Err(error) => tracker.interrupted(&error).into_iter().collect(),
        };
        for event in events {
            if tx.send(event).await.is_err() {
                subscription.close();
                return;
            }
        }
        if let Some(outcome) = tracker.outcome() {
            info!(%task_id, ?outcome, "task finished");
            subscription.close();
            return;
        }
    }

    if let Some(event) = tracker.interrupted(&BackendError::StreamClosed) {
        warn!(%task_id, "task stream ended without a result");
        let _ = tx.send(event).await;
    }
}
