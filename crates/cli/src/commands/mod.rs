// CLI subcommand dispatch.

use clap::Subcommand;

use crate::context::AppContext;

pub mod bible;
pub mod check;
pub mod config;
pub mod continuation;
pub mod fix;
pub mod rewrite;
pub mod show;
pub mod snapshot;

#[derive(Subcommand)]
pub enum Command {
    /// Print a chapter
    Show(show::ShowArgs),
    /// Stream an AI continuation onto the end of a chapter
    #[command(name = "continue")]
    Continue(continuation::ContinueArgs),
    /// Rewrite a character range of a chapter
    Rewrite(rewrite::RewriteArgs),
    /// Check a chapter against the project's setting and outline
    Check(check::CheckArgs),
    /// Detect issues and apply generated fixes
    Fix(fix::FixArgs),
    /// Create, list, inspect, restore or delete snapshots
    Snapshot(snapshot::SnapshotArgs),
    /// Generate a project's world bible
    Bible(bible::BibleArgs),
    /// Show or update the local config file
    Config(config::ConfigArgs),
}

pub async fn run(cmd: Command, ctx: &AppContext) -> anyhow::Result<()> {
    match cmd {
        Command::Show(args) => show::run(args, ctx).await,
        Command::Continue(args) => continuation::run(args, ctx).await,
        Command::Rewrite(args) => rewrite::run(args, ctx).await,
        Command::Check(args) => check::run(args, ctx).await,
        Command::Fix(args) => fix::run(args, ctx).await,
        Command::Snapshot(args) => snapshot::run(args, ctx).await,
        Command::Bible(args) => bible::run(args, ctx).await,
        Command::Config(args) => config::run(args, ctx),
    }
}
