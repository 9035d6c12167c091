// `inkstone fix`: detect issues and apply generated fixes.
//
// Each fixable issue goes through generate, then apply. One issue failing
// does not stop the rest. The first applied fix is preceded by an
// automatic snapshot.

use clap::Args;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

use inkstone_common::types::{ChapterId, FixProposal};
use inkstone_engine::session::{IssueEntry, SessionHandle, SessionNotice};
use inkstone_engine::{Backend, SessionError};

use crate::context::AppContext;
use crate::exit_code::UsageError;
use crate::output;

#[derive(Debug, Args)]
pub struct FixArgs {
    /// Chapter ID.
    #[arg(long)]
    chapter: ChapterId,

    /// Only fix this issue (1-based, as listed by `inkstone check`).
    #[arg(long)]
    issue: Option<usize>,

    /// Generate fixes without applying them.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FixStatus {
    Fixed { original: String, fixed: String },
    Proposed { original: String, fixed: String },
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueOutcome {
    pub issue: usize,
    pub description: String,
    #[serde(flatten)]
    pub status: FixStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixResult {
    pub chapter_id: ChapterId,
    pub dry_run: bool,
    pub outcomes: Vec<IssueOutcome>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

pub async fn run(args: FixArgs, ctx: &AppContext) -> anyhow::Result<()> {
    let session = ctx.open(args.chapter).await?;
    let mut notices = session.notices();
    let outcome = fix_all(&session, args.issue, args.dry_run).await;
    session.close().await;
    let outcomes = outcome?;

    let warnings = collect_warnings(&mut notices);
    let result = FixResult { chapter_id: args.chapter, dry_run: args.dry_run, outcomes, warnings };
    output::print_output(ctx.format, &result, format_human)?;
    Ok(())
}

async fn fix_all<B: Backend>(
    session: &SessionHandle<B>,
    only: Option<usize>,
    dry_run: bool,
) -> anyhow::Result<Vec<IssueOutcome>> {
    let entries = select_issues(session.detect_issues().await?, only)?;

    let mut outcomes = Vec::with_capacity(entries.len());
    for entry in entries {
        let status = fix_one(session, &entry, dry_run).await?;
        outcomes.push(IssueOutcome {
            issue: entry.id.index + 1,
            description: entry.issue.description.clone(),
            status,
        });
    }
    Ok(outcomes)
}

/// Drain buffered notices into warnings. Notices lost to lag are skipped.
fn collect_warnings(notices: &mut broadcast::Receiver<SessionNotice>) -> Vec<String> {
    let mut warnings = Vec::new();
    loop {
        match notices.try_recv() {
            Ok(SessionNotice::AutoSnapshotFailed { message }) => {
                warnings.push(format!("automatic snapshot failed: {message}"));
            }
            Ok(SessionNotice::SaveFailed { message }) => {
                warnings.push(format!("save failed: {message}"));
            }
            Ok(_) | Err(TryRecvError::Lagged(_)) => {}
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
    warnings
}

fn select_issues(entries: Vec<IssueEntry>, only: Option<usize>) -> Result<Vec<IssueEntry>, UsageError> {
    let Some(number) = only else {
        return Ok(entries);
    };
    let count = entries.len();
    entries
        .into_iter()
        .find(|entry| entry.id.index + 1 == number)
        .map(|entry| vec![entry])
        .ok_or_else(|| UsageError(format!("--issue {number} out of range ({count} issue(s) found)")))
}

/// Per-issue errors become a `Failed` status; only a closed session aborts.
async fn fix_one<B: Backend>(
    session: &SessionHandle<B>,
    entry: &IssueEntry,
    dry_run: bool,
) -> Result<FixStatus, SessionError> {
    if entry.issue.fix_inputs().is_none() {
        return Ok(FixStatus::Skipped { reason: "missing quote or suggestion".into() });
    }

    let FixProposal { original, fixed } = match session.generate_fix(entry.id).await {
        Ok(proposal) => proposal,
        Err(SessionError::Closed) => return Err(SessionError::Closed),
        Err(error) => return Ok(FixStatus::Failed { error: error.to_string() }),
    };
    if dry_run {
        return Ok(FixStatus::Proposed { original, fixed });
    }

    match session.apply_fix(entry.id).await {
        Ok(()) => Ok(FixStatus::Fixed { original, fixed }),
        Err(SessionError::Closed) => Err(SessionError::Closed),
        Err(error) => Ok(FixStatus::Failed { error: error.to_string() }),
    }
}

fn format_human(result: &FixResult) -> String {
    if result.outcomes.is_empty() {
        return format!("Chapter {}: no issues found", result.chapter_id);
    }
    let mut lines = Vec::new();
    for outcome in &result.outcomes {
        let line = match &outcome.status {
            FixStatus::Fixed { original, fixed } | FixStatus::Proposed { original, fixed } => {
                let verb = if result.dry_run { "proposed" } else { "fixed" };
                format!(
                    "#{} {verb}: {}\n    - {}\n    + {}",
                    outcome.issue,
                    outcome.description,
                    output::truncate_chars(original, 80),
                    output::truncate_chars(fixed, 80)
                )
            }
            FixStatus::Skipped { reason } => {
                format!("#{} skipped: {} ({reason})", outcome.issue, outcome.description)
            }
            FixStatus::Failed { error } => {
                format!("#{} failed: {} ({error})", outcome.issue, outcome.description)
            }
        };
        lines.push(line);
    }
    for warning in &result.warnings {
        lines.push(format!("warning: {warning}"));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;
    use inkstone_common::types::{ConsistencyIssue, IssueKind};
    use inkstone_engine::session::{FixState, IssueId};
    use uuid::Uuid;

    fn entry(index: usize) -> IssueEntry {
        IssueEntry {
            id: IssueId { batch: Uuid::nil(), index },
            issue: ConsistencyIssue {
                kind: IssueKind::Character,
                description: format!("issue {index}"),
                quote: Some("quote".into()),
                suggestion: Some("suggestion".into()),
            },
            state: FixState::Pending,
        }
    }

    fn sample_result() -> FixResult {
        FixResult {
            chapter_id: 7,
            dry_run: false,
            outcomes: vec![
                IssueOutcome {
                    issue: 1,
                    description: "Lin Dong's eyes are black, not blue".into(),
                    status: FixStatus::Fixed {
                        original: "蓝色的眼睛".into(),
                        fixed: "漆黑的眼睛".into(),
                    },
                },
                IssueOutcome {
                    issue: 2,
                    description: "Timeline skips a day".into(),
                    status: FixStatus::Skipped { reason: "missing quote or suggestion".into() },
                },
                IssueOutcome {
                    issue: 3,
                    description: "Wrong sect name".into(),
                    status: FixStatus::Failed {
                        error: "rejected: original text no longer matches the chapter".into(),
                    },
                },
            ],
            warnings: Vec::new(),
        }
    }

    #[test]
    fn select_issues_defaults_to_all() {
        let selected = select_issues(vec![entry(0), entry(1)], None).unwrap();
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn select_issues_uses_one_based_numbers() {
        let selected = select_issues(vec![entry(0), entry(1)], Some(2)).unwrap();
        assert_eq!(selected, vec![entry(1)]);
    }

    #[test]
    fn select_issues_rejects_out_of_range() {
        let error = select_issues(vec![entry(0)], Some(3)).expect_err("issue 3 should not exist");
        assert!(error.to_string().contains("--issue 3 out of range"));
    }

    #[test]
    fn warnings_survive_a_lagged_receiver() {
        let (tx, mut rx) = broadcast::channel(2);
        for _ in 0..3 {
            tx.send(SessionNotice::RolledBack { snapshot_id: 1 }).unwrap();
        }
        tx.send(SessionNotice::SaveFailed { message: "connection reset".into() }).unwrap();
        drop(tx);

        assert_eq!(collect_warnings(&mut rx), vec!["save failed: connection reset".to_string()]);
    }

    #[test]
    fn human_format_shows_each_outcome() {
        let output = format_human(&sample_result());
        assert!(output.contains("#1 fixed: Lin Dong's eyes are black, not blue"));
        assert!(output.contains("- 蓝色的眼睛"));
        assert!(output.contains("+ 漆黑的眼睛"));
        assert!(output.contains("#2 skipped"));
        assert!(output.contains("#3 failed"));
    }

    #[test]
    fn human_format_shows_warnings() {
        let result = FixResult {
            warnings: vec!["automatic snapshot failed: disk full".into()],
            ..sample_result()
        };
        assert!(format_human(&result).ends_with("warning: automatic snapshot failed: disk full"));
    }

    #[test]
    fn json_format_tags_status() {
        let mut buf = Vec::new();
        output::write_output(&mut buf, OutputFormat::Json, &sample_result(), format_human)
            .expect("json output should serialize");

        let parsed: FixResult =
            serde_json::from_slice(&buf).expect("json output should deserialize");
        assert_eq!(parsed.outcomes.len(), 3);
        assert!(matches!(parsed.outcomes[1].status, FixStatus::Skipped { .. }));

        let raw: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(raw["outcomes"][0]["status"], "fixed");
        assert!(raw.get("warnings").is_none());
    }
}
