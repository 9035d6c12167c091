// Local configuration for the editing engine.
//
// Global config: `~/.inkstone/config.toml`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use inkstone_common::protocol::api::DEFAULT_API_URL;

/// Environment variable overriding the configured auth token.
pub const TOKEN_ENV_VAR: &str = "INKSTONE_TOKEN";

const DEFAULT_AUTOSAVE_MS: u64 = 3_000;
const MIN_AUTOSAVE_MS: u64 = 500;
const MAX_AUTOSAVE_MS: u64 = 60_000;
const DEFAULT_CONTEXT_CHARS: usize = 2_000;
const DEFAULT_REWRITE_MAX_CHARS: usize = 500;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_CONTINUE_INSTRUCTION: &str = "Advance the plot.";

/// Root directory for Inkstone global state: `~/.inkstone/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".inkstone"))
}

/// Path to the global config file: `~/.inkstone/config.toml`.
pub fn global_config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("config.toml"))
}

// ── Global config ──────────────────────────────────────────────────

/// Global configuration at `~/.inkstone/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GlobalConfig {
    /// Document service base URL (e.g. `http://localhost:8000/api/v1`).
    pub api_url: String,
    /// Bearer token for the document service. `INKSTONE_TOKEN` wins when set.
    pub auth_token: Option<String>,
    /// Per-request timeout for the HTTP client, in seconds.
    pub request_timeout_secs: u64,
    /// Editing session behaviour.
    pub editor: EditorConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            auth_token: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            editor: EditorConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Load from `~/.inkstone/config.toml`. Returns defaults if the file
    /// doesn't exist or can't be parsed.
    pub fn load() -> Self {
        global_config_path().and_then(|p| Self::load_from(&p).ok()).unwrap_or_default()
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save to a specific path, owner-only (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
            ensure_owner_only(parent, 0o700).map_err(ConfigError::Io)?;
        }
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, contents)
            .and_then(|_| ensure_owner_only(path, 0o600))
            .map_err(ConfigError::Io)
    }

    /// The auth token to use, preferring the environment over the file.
    pub fn resolved_token(&self) -> Option<String> {
        std::env::var(TOKEN_ENV_VAR)
            .ok()
            .filter(|token| !token.trim().is_empty())
            .or_else(|| self.auth_token.clone())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Editing session configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EditorConfig {
    /// Quiescence window before a debounced save fires, in milliseconds.
    pub autosave_ms: u64,
    /// Trailing characters of the chapter sent as continuation context.
    pub context_chars: usize,
    /// Instruction sent with streamed continuations.
    pub continue_instruction: String,
    /// Longest selection accepted for a rewrite.
    pub rewrite_max_chars: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            autosave_ms: DEFAULT_AUTOSAVE_MS,
            context_chars: DEFAULT_CONTEXT_CHARS,
            continue_instruction: DEFAULT_CONTINUE_INSTRUCTION.to_string(),
            rewrite_max_chars: DEFAULT_REWRITE_MAX_CHARS,
        }
    }
}

impl EditorConfig {
    /// Autosave window, clamped to [500ms, 60s].
    pub fn autosave_window(&self) -> Duration {
        Duration::from_millis(self.autosave_ms.clamp(MIN_AUTOSAVE_MS, MAX_AUTOSAVE_MS))
    }
}

fn ensure_owner_only(path: &Path, mode: u32) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let current = std::fs::metadata(path)?.permissions().mode() & 0o777;
        if current != mode {
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
        }
    }

    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }

    Ok(())
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Parse(e) => write!(f, "config parse error: {e}"),
            Self::Serialize(e) => write!(f, "config serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}
