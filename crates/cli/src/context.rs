// Shared command context: resolved config, output format, service client.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing::debug;

use inkstone_common::types::ChapterId;
use inkstone_engine::config::{global_config_path, GlobalConfig};
use inkstone_engine::session::{open_session, SessionHandle};
use inkstone_engine::HttpBackend;

use crate::output::OutputFormat;

pub struct AppContext {
    pub config: GlobalConfig,
    /// Where `inkstone config set` writes. `None` when no home directory.
    pub config_path: Option<PathBuf>,
    pub format: OutputFormat,
}

impl AppContext {
    /// An explicit config path must load; the default location falls back
    /// to defaults.
    pub fn load(config_path: Option<&Path>, format: OutputFormat) -> anyhow::Result<Self> {
        let config = match config_path {
            Some(path) => GlobalConfig::load_from(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => GlobalConfig::load(),
        };
        let config_path = config_path.map(Path::to_path_buf).or_else(global_config_path);
        Ok(Self { config, config_path, format })
    }

    pub fn backend(&self) -> anyhow::Result<Arc<HttpBackend>> {
        let backend = HttpBackend::from_config(&self.config)
            .with_context(|| format!("invalid api_url `{}`", self.config.api_url))?;
        Ok(Arc::new(backend))
    }

    pub async fn open(&self, chapter_id: ChapterId) -> anyhow::Result<SessionHandle<HttpBackend>> {
        debug!(chapter_id, api_url = %self.config.api_url, "opening chapter session");
        open_session(self.backend()?, chapter_id, self.config.editor.clone())
            .await
            .with_context(|| format!("failed to open chapter {chapter_id}"))
    }
}
