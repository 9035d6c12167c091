// inkstone CLI entry point.

use std::path::PathBuf;
use std::process;

use clap::Parser;

mod commands;
mod context;
mod exit_code;
mod output;

use context::AppContext;
use exit_code::ExitCode;
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "inkstone", about = "AI-assisted revision for novel chapters")]
struct Cli {
    /// Config file (defaults to ~/.inkstone/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Force JSON output.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: commands::Command,
}

#[tokio::main]
async fn main() -> process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let format = OutputFormat::detect(cli.json);

    let result = match AppContext::load(cli.config.as_deref(), format) {
        Ok(ctx) => commands::run(cli.command, &ctx).await,
        Err(error) => Err(error),
    };

    match result {
        Ok(()) => ExitCode::Success.into(),
        Err(error) => {
            output::print_anyhow_error(format, &error);
            ExitCode::from_error(&error).into()
        }
    }
}
