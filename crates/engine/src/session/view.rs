// Observable session state and user-visible notices.

use serde::Serialize;

use inkstone_common::types::{ChapterId, SnapshotId};

use super::issues::{IssueEntry, IssueId};

/// Latest state of a session, published on every change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionView {
    pub chapter_id: ChapterId,
    pub text: String,
    pub char_count: usize,
    pub revision: u64,
    /// A save is in flight.
    pub saving: bool,
    /// A continuation is streaming into the buffer.
    pub streaming: bool,
    pub issues: Vec<IssueEntry>,
}

/// Non-fatal outcomes worth telling the user about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionNotice {
    Saved { chars: usize },
    SaveFailed { message: String },
    GenerationCompleted { appended_chars: usize },
    /// Stream ended early: cancelled (`error` is `None`) or failed.
    GenerationStopped { appended_chars: usize, error: Option<String> },
    AutoSnapshotFailed { message: String },
    FixApplied { issue: IssueId },
    RolledBack { snapshot_id: SnapshotId },
}
