// `inkstone rewrite`: rewrite a character range of a chapter.

use clap::Args;
use serde::{Deserialize, Serialize};

use inkstone_common::types::ChapterId;

use crate::context::AppContext;
use crate::exit_code::UsageError;
use crate::output;

#[derive(Debug, Args)]
pub struct RewriteArgs {
    /// Chapter ID.
    #[arg(long)]
    chapter: ChapterId,

    /// First character of the selection (inclusive).
    #[arg(long)]
    start: usize,

    /// End of the selection (exclusive, in characters).
    #[arg(long)]
    end: usize,

    /// How to rewrite the selection.
    #[arg(long)]
    instruction: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteResult {
    pub chapter_id: ChapterId,
    pub start: usize,
    pub end: usize,
    pub rewritten: String,
    pub char_count: usize,
}

pub async fn run(args: RewriteArgs, ctx: &AppContext) -> anyhow::Result<()> {
    check_range(args.start, args.end)?;

    let session = ctx.open(args.chapter).await?;
    let outcome = session.rewrite_selection(args.start..args.end, args.instruction).await;
    let char_count = session.view().char_count;
    session.close().await;

    let result = RewriteResult {
        chapter_id: args.chapter,
        start: args.start,
        end: args.end,
        rewritten: outcome?,
        char_count,
    };
    output::print_output(ctx.format, &result, format_human)?;
    Ok(())
}

fn check_range(start: usize, end: usize) -> Result<(), UsageError> {
    if end <= start {
        return Err(UsageError(format!("--end ({end}) must be greater than --start ({start})")));
    }
    Ok(())
}

fn format_human(result: &RewriteResult) -> String {
    format!(
        "Rewrote characters {}..{} of chapter {} ({} chars now):\n{}",
        result.start, result.end, result.chapter_id, result.char_count, result.rewritten
    )
}
