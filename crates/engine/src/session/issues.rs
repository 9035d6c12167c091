// Detected issues and their per-issue fix lifecycle.
//
//   pending ──begin_fix──▶ fixing ──fix_generated──▶ preview ──mark_fixed──▶ fixed
//      ▲                     │                          │
//      └─────fix_failed──────┘◀────────begin_fix────────┘
//   pending | preview ──ignore──▶ ignored
//
// A detection call replaces the whole batch. Ids carry the batch they were
// minted for, so late results addressed to an old batch are discarded.

use std::fmt::{Display, Formatter};

use serde::Serialize;
use uuid::Uuid;

use inkstone_common::protocol::api::FixRequest;
use inkstone_common::types::{ConsistencyIssue, FixProposal};

use crate::error::RejectReason;

/// Stable identifier of one issue within a detection batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct IssueId {
    pub batch: Uuid,
    pub index: usize,
}

impl Display for IssueId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.index + 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FixState {
    Pending,
    Fixing,
    Preview { proposal: FixProposal },
    Fixed,
    Ignored,
}

impl FixState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fixing => "fixing",
            Self::Preview { .. } => "preview",
            Self::Fixed => "fixed",
            Self::Ignored => "ignored",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Fixed | Self::Ignored)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueEntry {
    pub id: IssueId,
    pub issue: ConsistencyIssue,
    #[serde(flatten)]
    pub state: FixState,
}

/// The current detection batch.
#[derive(Debug, Clone, Default)]
pub struct IssueBoard {
    batch: Option<Uuid>,
    entries: Vec<IssueEntry>,
}

impl IssueBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the batch. Every issue starts `pending`.
    pub fn replace(&mut self, issues: Vec<ConsistencyIssue>) -> Uuid {
        let batch = Uuid::new_v4();
        self.entries = issues
            .into_iter()
            .enumerate()
            .map(|(index, issue)| IssueEntry {
                id: IssueId { batch, index },
                issue,
                state: FixState::Pending,
            })
            .collect();
        self.batch = Some(batch);
        batch
    }

    pub fn entries(&self) -> &[IssueEntry] {
        &self.entries
    }

    pub fn get(&self, id: IssueId) -> Option<&IssueEntry> {
        if self.batch != Some(id.batch) {
            return None;
        }
        self.entries.get(id.index)
    }

    fn entry_mut(&mut self, id: IssueId) -> Result<&mut IssueEntry, RejectReason> {
        if self.batch != Some(id.batch) {
            return Err(RejectReason::UnknownIssue);
        }
        self.entries.get_mut(id.index).ok_or(RejectReason::UnknownIssue)
    }

    /// `pending | preview → fixing`. Returns the request to send for generation.
    pub fn begin_fix(&mut self, id: IssueId) -> Result<FixRequest, RejectReason> {
        let entry = self.entry_mut(id)?;
        match entry.state {
            FixState::Pending | FixState::Preview { .. } => {}
            ref other => {
                return Err(RejectReason::InvalidTransition { from: other.name(), action: "fix" })
            }
        }
        let (quote, suggestion) =
            entry.issue.fix_inputs().ok_or(RejectReason::MissingQuoteOrSuggestion)?;
        let request = FixRequest {
            quote: quote.to_string(),
            description: entry.issue.description.clone(),
            suggestion: suggestion.to_string(),
        };
        entry.state = FixState::Fixing;
        Ok(request)
    }

    /// `fixing → preview`. Returns false when the id is stale or the issue is
    /// no longer waiting on a proposal.
    pub fn fix_generated(&mut self, id: IssueId, proposal: FixProposal) -> bool {
        match self.entry_mut(id) {
            Ok(entry) if entry.state == FixState::Fixing => {
                entry.state = FixState::Preview { proposal };
                true
            }
            _ => false,
        }
    }

    /// `fixing → pending`.
    pub fn fix_failed(&mut self, id: IssueId) -> bool {
        match self.entry_mut(id) {
            Ok(entry) if entry.state == FixState::Fixing => {
                entry.state = FixState::Pending;
                true
            }
            _ => false,
        }
    }

    /// The proposal an issue in `preview` carries.
    pub fn proposal(&self, id: IssueId) -> Result<&FixProposal, RejectReason> {
        let entry = self.get(id).ok_or(RejectReason::UnknownIssue)?;
        match &entry.state {
            FixState::Preview { proposal } => Ok(proposal),
            other => Err(RejectReason::InvalidTransition { from: other.name(), action: "apply" }),
        }
    }

    /// `preview → fixed`.
    pub fn mark_fixed(&mut self, id: IssueId) -> Result<(), RejectReason> {
        let entry = self.entry_mut(id)?;
        match entry.state {
            FixState::Preview { .. } => {
                entry.state = FixState::Fixed;
                Ok(())
            }
            ref other => Err(RejectReason::InvalidTransition { from: other.name(), action: "apply" }),
        }
    }

    /// `pending | preview → ignored`. Discards any proposal.
    pub fn ignore(&mut self, id: IssueId) -> Result<(), RejectReason> {
        let entry = self.entry_mut(id)?;
        match entry.state {
            FixState::Pending | FixState::Preview { .. } => {
                entry.state = FixState::Ignored;
                Ok(())
            }
            ref other => {
                Err(RejectReason::InvalidTransition { from: other.name(), action: "ignore" })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkstone_common::types::IssueKind;

    fn issue(quote: Option<&str>, suggestion: Option<&str>) -> ConsistencyIssue {
        ConsistencyIssue {
            kind: IssueKind::Setting,
            description: "The sky colour contradicts chapter 2".into(),
            quote: quote.map(Into::into),
            suggestion: suggestion.map(Into::into),
        }
    }

    fn proposal() -> FixProposal {
        FixProposal { original: "sky is red".into(), fixed: "sky is blue".into() }
    }

    fn board_with(issues: Vec<ConsistencyIssue>) -> (IssueBoard, Uuid) {
        let mut board = IssueBoard::new();
        let batch = board.replace(issues);
        (board, batch)
    }

    #[test]
    fn detection_starts_every_issue_pending() {
        let (board, batch) = board_with(vec![issue(Some("q"), Some("s")), issue(None, None)]);
        assert_eq!(board.entries().len(), 2);
        assert!(board.entries().iter().all(|e| e.state == FixState::Pending));
        assert_eq!(board.entries()[1].id, IssueId { batch, index: 1 });
    }

    #[test]
    fn issue_without_quote_cannot_start_fixing() {
        let (mut board, batch) = board_with(vec![issue(None, Some("make it blue"))]);
        let id = IssueId { batch, index: 0 };
        assert_eq!(board.begin_fix(id), Err(RejectReason::MissingQuoteOrSuggestion));
        assert_eq!(board.get(id).unwrap().state, FixState::Pending);
    }

    #[test]
    fn blank_suggestion_is_rejected() {
        let (mut board, batch) = board_with(vec![issue(Some("sky is red"), Some(""))]);
        let id = IssueId { batch, index: 0 };
        assert_eq!(board.begin_fix(id), Err(RejectReason::MissingQuoteOrSuggestion));
    }

    #[test]
    fn full_lifecycle_to_fixed() {
        let (mut board, batch) = board_with(vec![issue(Some("sky is red"), Some("blue"))]);
        let id = IssueId { batch, index: 0 };

        let request = board.begin_fix(id).unwrap();
        assert_eq!(request.quote, "sky is red");
        assert_eq!(request.suggestion, "blue");
        assert_eq!(board.get(id).unwrap().state, FixState::Fixing);

        assert!(board.fix_generated(id, proposal()));
        assert_eq!(board.proposal(id).unwrap(), &proposal());

        board.mark_fixed(id).unwrap();
        assert!(board.get(id).unwrap().state.is_terminal());
        assert_eq!(
            board.ignore(id),
            Err(RejectReason::InvalidTransition { from: "fixed", action: "ignore" })
        );
    }

    #[test]
    fn failed_generation_returns_to_pending() {
        let (mut board, batch) = board_with(vec![issue(Some("q"), Some("s"))]);
        let id = IssueId { batch, index: 0 };
        board.begin_fix(id).unwrap();
        assert!(board.fix_failed(id));
        assert_eq!(board.get(id).unwrap().state, FixState::Pending);
    }

    #[test]
    fn regenerate_replaces_proposal() {
        let (mut board, batch) = board_with(vec![issue(Some("q"), Some("s"))]);
        let id = IssueId { batch, index: 0 };
        board.begin_fix(id).unwrap();
        board.fix_generated(id, proposal());

        board.begin_fix(id).unwrap();
        assert_eq!(board.get(id).unwrap().state, FixState::Fixing);
        let second = FixProposal { original: "q".into(), fixed: "r".into() };
        assert!(board.fix_generated(id, second.clone()));
        assert_eq!(board.proposal(id).unwrap(), &second);
    }

    #[test]
    fn fixing_cannot_be_ignored_or_restarted() {
        let (mut board, batch) = board_with(vec![issue(Some("q"), Some("s"))]);
        let id = IssueId { batch, index: 0 };
        board.begin_fix(id).unwrap();
        assert_eq!(
            board.ignore(id),
            Err(RejectReason::InvalidTransition { from: "fixing", action: "ignore" })
        );
        assert!(matches!(
            board.begin_fix(id),
            Err(RejectReason::InvalidTransition { from: "fixing", .. })
        ));
    }

    #[test]
    fn ignore_discards_preview() {
        let (mut board, batch) = board_with(vec![issue(Some("q"), Some("s"))]);
        let id = IssueId { batch, index: 0 };
        board.begin_fix(id).unwrap();
        board.fix_generated(id, proposal());
        board.ignore(id).unwrap();
        assert_eq!(board.get(id).unwrap().state, FixState::Ignored);
        assert!(board.proposal(id).is_err());
    }

    #[test]
    fn apply_requires_preview() {
        let (mut board, batch) = board_with(vec![issue(Some("q"), Some("s"))]);
        let id = IssueId { batch, index: 0 };
        assert_eq!(
            board.mark_fixed(id),
            Err(RejectReason::InvalidTransition { from: "pending", action: "apply" })
        );
    }

    #[test]
    fn results_for_replaced_batch_are_dropped() {
        let (mut board, old_batch) = board_with(vec![issue(Some("q"), Some("s"))]);
        let old = IssueId { batch: old_batch, index: 0 };
        board.begin_fix(old).unwrap();

        let new_batch = board.replace(vec![issue(Some("q"), Some("s"))]);
        assert!(!board.fix_generated(old, proposal()));
        assert_eq!(board.begin_fix(old), Err(RejectReason::UnknownIssue));
        assert_eq!(board.get(IssueId { batch: new_batch, index: 0 }).unwrap().state, FixState::Pending);
    }

    #[test]
    fn out_of_range_index_is_unknown() {
        let (mut board, batch) = board_with(vec![]);
        assert_eq!(board.ignore(IssueId { batch, index: 3 }), Err(RejectReason::UnknownIssue));
    }

    #[test]
    fn issue_id_displays_one_based() {
        let id = IssueId { batch: Uuid::nil(), index: 0 };
        assert_eq!(id.to_string(), "#1");
    }
}
