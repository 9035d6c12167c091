// `inkstone config`: show or update the local config file.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Subcommand};
use serde::{Deserialize, Serialize};
use tracing::debug;

use inkstone_engine::config::{EditorConfig, GlobalConfig};
use inkstone_engine::HttpBackend;

use crate::context::AppContext;
use crate::exit_code::UsageError;
use crate::output;

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the effective config
    Show,
    /// Update values and write the config file
    Set(SetArgs),
}

#[derive(Debug, Default, Args)]
pub struct SetArgs {
    /// Document service base URL.
    #[arg(long)]
    api_url: Option<String>,

    /// Bearer token for the document service.
    #[arg(long, conflicts_with = "clear_token")]
    token: Option<String>,

    /// Remove the stored token.
    #[arg(long)]
    clear_token: bool,

    #[arg(long)]
    request_timeout_secs: Option<u64>,

    #[arg(long)]
    autosave_ms: Option<u64>,

    #[arg(long)]
    context_chars: Option<usize>,

    #[arg(long)]
    continue_instruction: Option<String>,

    #[arg(long)]
    rewrite_max_chars: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub saved: bool,
    pub api_url: String,
    /// Masked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    pub request_timeout_secs: u64,
    pub editor: EditorConfig,
}

impl ConfigResult {
    fn new(path: Option<PathBuf>, saved: bool, config: &GlobalConfig) -> Self {
        Self {
            path,
            saved,
            api_url: config.api_url.clone(),
            auth_token: config.auth_token.as_deref().map(mask_token),
            request_timeout_secs: config.request_timeout_secs,
            editor: config.editor.clone(),
        }
    }
}

pub fn run(args: ConfigArgs, ctx: &AppContext) -> anyhow::Result<()> {
    let result = match args.action {
        ConfigAction::Show => ConfigResult::new(ctx.config_path.clone(), false, &ctx.config),
        ConfigAction::Set(set) => {
            let path = ctx
                .config_path
                .as_deref()
                .ok_or_else(|| UsageError("could not determine home directory, pass --config".into()))?;
            let updated = update_file(path, set)?;
            ConfigResult::new(Some(path.to_path_buf()), true, &updated)
        }
    };
    output::print_output(ctx.format, &result, format_human)?;
    Ok(())
}

/// Apply `set` to the file at `path` (or to defaults when it doesn't exist
/// yet) and write it back owner-only.
fn update_file(path: &Path, set: SetArgs) -> anyhow::Result<GlobalConfig> {
    let current = if path.exists() {
        GlobalConfig::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?
    } else {
        GlobalConfig::default()
    };
    let updated = set.apply(current)?;
    updated
        .save_to(path)
        .with_context(|| format!("failed to write config to {}", path.display()))?;
    debug!(path = %path.display(), "config saved");
    Ok(updated)
}

impl SetArgs {
    fn apply(self, mut config: GlobalConfig) -> Result<GlobalConfig, UsageError> {
        let mut changed = false;

        if let Some(api_url) = self.api_url {
            config.api_url = api_url;
            if HttpBackend::from_config(&config).is_err() {
                return Err(UsageError(format!("invalid --api-url `{}`", config.api_url)));
            }
            changed = true;
        }
        if let Some(token) = self.token {
            if token.trim().is_empty() {
                return Err(UsageError("--token must not be empty, use --clear-token".into()));
            }
            config.auth_token = Some(token);
            changed = true;
        }
        if self.clear_token {
            config.auth_token = None;
            changed = true;
        }
        if let Some(secs) = self.request_timeout_secs {
            config.request_timeout_secs = secs;
            changed = true;
        }

        let editor = &mut config.editor;
        if let Some(ms) = self.autosave_ms {
            editor.autosave_ms = ms;
            changed = true;
        }
        if let Some(chars) = self.context_chars {
            editor.context_chars = chars;
            changed = true;
        }
        if let Some(instruction) = self.continue_instruction {
            editor.continue_instruction = instruction;
            changed = true;
        }
        if let Some(max) = self.rewrite_max_chars {
            editor.rewrite_max_chars = max;
            changed = true;
        }

        if !changed {
            return Err(UsageError("nothing to set, see `inkstone config set --help`".into()));
        }
        Ok(config)
    }
}

fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "****".into();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{tail}")
}

fn format_human(result: &ConfigResult) -> String {
    let mut lines = Vec::new();
    match (&result.path, result.saved) {
        (Some(path), true) => lines.push(format!("Saved {}", path.display())),
        (Some(path), false) => lines.push(format!("# {}", path.display())),
        (None, _) => {}
    }
    lines.push(format!("api_url = {}", result.api_url));
    lines.push(format!("auth_token = {}", result.auth_token.as_deref().unwrap_or("(not set)")));
    lines.push(format!("request_timeout_secs = {}", result.request_timeout_secs));
    lines.push(format!("editor.autosave_ms = {}", result.editor.autosave_ms));
    lines.push(format!("editor.context_chars = {}", result.editor.context_chars));
    lines.push(format!("editor.continue_instruction = {}", result.editor.continue_instruction));
    lines.push(format!("editor.rewrite_max_chars = {}", result.editor.rewrite_max_chars));
    lines.join("\n")
}
