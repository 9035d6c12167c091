// `inkstone bible`: generate a project's world bible and follow its progress.

use clap::Args;
use serde::{Deserialize, Serialize};

use inkstone_common::types::{BibleInputs, ProjectId};
use inkstone_engine::bible::BibleFlow;
use inkstone_engine::progress::{ProgressEvent, TaskOutcome};

use crate::context::AppContext;
use crate::exit_code::TaskFailed;
use crate::output;

#[derive(Debug, Args)]
pub struct BibleArgs {
    /// Project ID.
    #[arg(long)]
    project: ProjectId,

    /// Who the protagonist is.
    #[arg(long)]
    protagonist: String,

    /// The protagonist's special advantage.
    #[arg(long)]
    cheat: String,

    /// How power and cultivation work in this world.
    #[arg(long)]
    power_system: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BibleResult {
    pub project_id: ProjectId,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn run(args: BibleArgs, ctx: &AppContext) -> anyhow::Result<()> {
    let inputs = BibleInputs {
        protagonist: args.protagonist,
        cheat: args.cheat,
        power_system: args.power_system,
    };
    let mut flow = BibleFlow::new(ctx.backend()?, args.project, inputs);

    let human = ctx.format.is_human();
    let mut line = ProgressLine::default();
    let outcome = flow
        .run(|event| {
            if human && line.observe(event) {
                eprintln!("{}", line.render());
            }
        })
        .await?;

    let result = BibleResult {
        project_id: args.project,
        completed: outcome.is_success(),
        error: match &outcome {
            TaskOutcome::Failed { message } => Some(message.clone()),
            TaskOutcome::Completed => None,
        },
    };
    output::print_output(ctx.format, &result, format_human)?;
    match outcome {
        TaskOutcome::Completed => Ok(()),
        TaskOutcome::Failed { message } => Err(TaskFailed { message }.into()),
    }
}

/// Latest progress and message, rendered as one status line.
#[derive(Debug, Default)]
struct ProgressLine {
    progress: u8,
    message: String,
}

impl ProgressLine {
    /// Returns whether the line changed.
    fn observe(&mut self, event: &ProgressEvent) -> bool {
        match event {
            ProgressEvent::Advanced { progress } => self.progress = *progress,
            ProgressEvent::Message { message } => self.message = message.clone(),
            ProgressEvent::Finished { .. } => return false,
        }
        true
    }

    fn render(&self) -> String {
        format!("[{:>3}%] {}", self.progress, self.message)
    }
}

fn format_human(result: &BibleResult) -> String {
    match &result.error {
        None => format!("World bible for project {} generated", result.project_id),
        Some(error) => format!("World bible generation for project {} failed: {error}", result.project_id),
    }
}
