// Session error types.

use std::fmt::{Display, Formatter};

use crate::backend::BackendError;

/// Why the session refused an operation. The buffer and issue states are
/// left untouched whenever one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Fix generation needs both a quote and a suggestion.
    MissingQuoteOrSuggestion,
    /// The text a fix or rewrite targets is no longer in the buffer verbatim.
    NoLongerMatches,
    /// The issue's fix state does not allow the requested step.
    InvalidTransition { from: &'static str, action: &'static str },
    /// The issue id does not belong to the current detection batch.
    UnknownIssue,
    /// A continuation is already streaming into this session.
    AlreadyStreaming,
    /// A consistency check started later has already replaced the issue list.
    Superseded,
    EmptySelection,
    SelectionTooLong { len: usize, max: usize },
    SelectionOutOfBounds { end: usize, len: usize },
    /// A required input was blank.
    EmptyInput(&'static str),
}

impl Display for RejectReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingQuoteOrSuggestion => {
                write!(f, "issue has no quote or suggestion to build a fix from")
            }
            Self::NoLongerMatches => write!(f, "original text no longer matches the chapter"),
            Self::InvalidTransition { from, action } => {
                write!(f, "cannot {action} an issue that is {from}")
            }
            Self::UnknownIssue => write!(f, "issue is not part of the current check"),
            Self::AlreadyStreaming => write!(f, "a continuation is already in progress"),
            Self::Superseded => write!(f, "a newer consistency check replaced this one"),
            Self::EmptySelection => write!(f, "selection is empty"),
            Self::SelectionTooLong { len, max } => {
                write!(f, "selection is {len} characters, limit is {max}")
            }
            Self::SelectionOutOfBounds { end, len } => {
                write!(f, "selection ends at {end} but the chapter has {len} characters")
            }
            Self::EmptyInput(field) => write!(f, "{field} must not be empty"),
        }
    }
}

impl std::error::Error for RejectReason {}

/// Errors returned from session operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("rejected: {0}")]
    Rejected(RejectReason),
    /// The session actor has shut down.
    #[error("session is closed")]
    Closed,
}

impl From<RejectReason> for SessionError {
    fn from(reason: RejectReason) -> Self {
        Self::Rejected(reason)
    }
}

impl SessionError {
    pub fn rejection(&self) -> Option<&RejectReason> {
        match self {
            Self::Rejected(reason) => Some(reason),
            _ => None,
        }
    }
}
