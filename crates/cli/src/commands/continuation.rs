// `inkstone continue`: stream a continuation onto the end of a chapter.
//
// Human output echoes the generated text as it arrives. Ctrl-C stops the
// stream; whatever arrived so far is kept and saved.

use std::io::Write;

use anyhow::Context;
use clap::Args;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;

use inkstone_common::text::char_count;
use inkstone_common::types::ChapterId;
use inkstone_engine::session::SessionNotice;
use inkstone_engine::SessionError;

use crate::context::AppContext;
use crate::exit_code::TaskFailed;
use crate::output;

#[derive(Debug, Args)]
pub struct ContinueArgs {
    /// Chapter ID.
    #[arg(long)]
    chapter: ChapterId,

    /// Guidance for the continuation. Defaults to the configured instruction.
    #[arg(long)]
    instruction: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinueResult {
    pub chapter_id: ChapterId,
    pub appended_chars: usize,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub char_count: usize,
}

pub async fn run(args: ContinueArgs, ctx: &AppContext) -> anyhow::Result<()> {
    let session = ctx.open(args.chapter).await?;
    let mut notices = session.notices();
    let mut view = session.subscribe();
    let echo = ctx.format.is_human();
    let mut printed = char_count(session.chapter().body());

    let instruction = args.instruction.filter(|text| !text.trim().is_empty());
    session.start_continuation(instruction).await.context("failed to start continuation")?;

    let mut view_open = true;
    let mut interrupted = false;
    let (appended_chars, error) = loop {
        tokio::select! {
            notice = notices.recv() => match notice {
                Ok(SessionNotice::GenerationCompleted { appended_chars }) => break (appended_chars, None),
                Ok(SessionNotice::GenerationStopped { appended_chars, error }) => break (appended_chars, error),
                Ok(SessionNotice::SaveFailed { message }) => {
                    output::print_warning(ctx.format, "SAVE_FAILED", &message);
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return Err(SessionError::Closed.into()),
            },
            changed = view.changed(), if echo && view_open => {
                if changed.is_err() {
                    view_open = false;
                    continue;
                }
                let text = view.borrow_and_update().text.clone();
                printed = echo_tail(&text, printed)?;
            }
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                session.cancel_stream().await?;
            }
        }
    };

    if echo {
        echo_tail(&session.text(), printed)?;
    }
    let result = ContinueResult {
        chapter_id: args.chapter,
        appended_chars,
        completed: error.is_none() && !interrupted,
        error: error.clone(),
        char_count: session.view().char_count,
    };
    session.close().await;

    output::print_output(ctx.format, &result, format_human)?;
    match error {
        Some(message) => Err(TaskFailed { message }.into()),
        None => Ok(()),
    }
}

/// Print the part of `text` past the first `printed` characters and return
/// the new count.
fn echo_tail(text: &str, printed: usize) -> std::io::Result<usize> {
    let tail = unseen_tail(text, printed);
    if !tail.is_empty() {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(tail.as_bytes())?;
        stdout.flush()?;
    }
    Ok(printed + char_count(tail))
}

fn unseen_tail(text: &str, printed: usize) -> &str {
    match text.char_indices().nth(printed) {
        Some((offset, _)) => &text[offset..],
        None => "",
    }
}

fn format_human(result: &ContinueResult) -> String {
    let status = match (&result.error, result.completed) {
        (Some(error), _) => format!("failed: {error}"),
        (None, true) => "completed".to_string(),
        (None, false) => "stopped".to_string(),
    };
    format!(
        "\n\n[{status}] appended {} chars to chapter {} ({} total)",
        result.appended_chars, result.chapter_id, result.char_count
    )
}
