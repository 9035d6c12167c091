// `inkstone check`: run a consistency check on a chapter.

use clap::Args;
use serde::Serialize;

use inkstone_common::types::ChapterId;
use inkstone_engine::session::IssueEntry;

use crate::context::AppContext;
use crate::output;

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Chapter ID.
    #[arg(long)]
    chapter: ChapterId,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub chapter_id: ChapterId,
    pub issues: Vec<IssueEntry>,
}

pub async fn run(args: CheckArgs, ctx: &AppContext) -> anyhow::Result<()> {
    let session = ctx.open(args.chapter).await?;
    let issues = session.detect_issues().await;
    session.close().await;

    let result = CheckResult { chapter_id: args.chapter, issues: issues? };
    output::print_output(ctx.format, &result, format_human)?;
    Ok(())
}

fn format_human(result: &CheckResult) -> String {
    if result.issues.is_empty() {
        return format!("Chapter {}: no issues found", result.chapter_id);
    }
    let mut lines = vec![format!("Chapter {}: {} issue(s)", result.chapter_id, result.issues.len())];
    for entry in &result.issues {
        lines.push(describe_issue(entry));
    }
    lines.join("\n")
}

fn describe_issue(entry: &IssueEntry) -> String {
    let mut text =
        format!("{} [{}] {}", entry.id, entry.issue.kind.as_str(), entry.issue.description);
    if let Some(quote) = entry.issue.quote.as_deref().filter(|q| !q.is_empty()) {
        text.push_str(&format!("\n    quote: {}", output::truncate_chars(quote, 80)));
    }
    if let Some(suggestion) = entry.issue.suggestion.as_deref().filter(|s| !s.is_empty()) {
        text.push_str(&format!("\n    suggestion: {}", output::truncate_chars(suggestion, 80)));
    }
    text
}
