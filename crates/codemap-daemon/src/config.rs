use codemap_core::{CodeMapConfig, ProjectId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration of one watch session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    pub project_id: ProjectId,

    /// Project root being watched
    pub project_root: PathBuf,

    /// Generator output directory; writes below it are never relevant
    pub output_dir: PathBuf,

    /// Generated artifact; external edits to it trigger regeneration
    pub artifact_path: PathBuf,

    /// Quiet period after the last relevant event (milliseconds)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Floor between two regenerations (milliseconds)
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,

    /// Whether relevant events lead to regeneration
    #[serde(default = "default_auto_update")]
    pub auto_update: bool,
}

fn default_debounce_ms() -> u64 {
    1500
}

fn default_min_interval_ms() -> u64 {
    5000
}

fn default_auto_update() -> bool {
    true
}

impl WatchConfig {
    pub fn for_project(project_id: ProjectId, project_root: PathBuf, config: &CodeMapConfig) -> Self {
        Self {
            output_dir: config.output.output_dir(&project_root),
            artifact_path: config.output.artifact_path(&project_root),
            project_id,
            project_root,
            debounce_ms: config.daemon.debounce_ms,
            min_interval_ms: config.daemon.min_interval_ms,
            auto_update: config.daemon.auto_update,
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}
