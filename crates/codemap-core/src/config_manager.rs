use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration for CodeMap
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CodeMapConfig {
    /// Where and how the generated artifact is written
    #[serde(default)]
    pub output: OutputConfig,

    /// Fingerprint store and snapshot cache locations
    #[serde(default)]
    pub cache: CacheConfig,

    /// Watch daemon behaviour
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// External description provider
    #[serde(default)]
    pub description: DescriptionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output directory, relative to the project root
    #[serde(default = "default_output_directory")]
    pub directory: PathBuf,

    /// File name of the generated markdown artifact
    #[serde(default = "default_artifact")]
    pub artifact: String,

    /// Maximum directory depth rendered in the tree
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Upper bound on files included in the function inventory
    #[serde(default = "default_max_inventory_files")]
    pub max_inventory_files: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
            artifact: default_artifact(),
            max_depth: default_max_depth(),
            max_inventory_files: default_max_inventory_files(),
        }
    }
}

impl OutputConfig {
    pub fn output_dir(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.directory)
    }

    pub fn artifact_path(&self, project_root: &Path) -> PathBuf {
        self.output_dir(project_root).join(&self.artifact)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding one fingerprint table per project (`{id}.json`)
    #[serde(default = "default_cache_directory")]
    pub directory: PathBuf,

    /// Snapshot file name, stored in the project's output directory
    #[serde(default = "default_snapshot_file")]
    pub snapshot_file: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: default_cache_directory(),
            snapshot_file: default_snapshot_file(),
        }
    }
}

/// Daemon configuration for automatic file watching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Quiet period after the last relevant event before regenerating (ms)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Minimum time between two regenerations of the same project (ms)
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,

    /// Whether newly added projects regenerate automatically
    #[serde(default = "default_auto_update")]
    pub auto_update: bool,

    /// Persisted list of registered projects
    #[serde(default = "default_projects_file")]
    pub projects_file: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            min_interval_ms: default_min_interval_ms(),
            auto_update: default_auto_update(),
            projects_file: default_projects_file(),
        }
    }
}

/// Description provider configuration (OpenAI-compatible endpoint)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptionConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_description_url")]
    pub base_url: String,

    #[serde(default = "default_description_model")]
    pub model: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_description_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_description_retries")]
    pub max_retries: u32,

    /// Prompts are truncated to this many characters
    #[serde(default = "default_description_max_chars")]
    pub max_chars: usize,
}

impl Default for DescriptionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_description_url(),
            model: default_description_model(),
            api_key: None,
            timeout_secs: default_description_timeout(),
            max_retries: default_description_retries(),
            max_chars: default_description_max_chars(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn codemap_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".codemap")
}

// Default value functions
fn default_output_directory() -> PathBuf {
    PathBuf::from(".codemap")
}
fn default_artifact() -> String {
    "project-structure.md".to_string()
}
fn default_max_depth() -> usize {
    6
}
fn default_max_inventory_files() -> usize {
    500
}
fn default_cache_directory() -> PathBuf {
    codemap_home().join("cache")
}
fn default_snapshot_file() -> String {
    "incremental-cache.json".to_string()
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
fn default_projects_file() -> PathBuf {
    codemap_home().join("projects.json")
}
fn default_description_url() -> String {
    "http://localhost:11434/v1".to_string()
}
fn default_description_model() -> String {
    "qwen2.5-coder:7b".to_string()
}
fn default_description_timeout() -> u64 {
    30
}
fn default_description_retries() -> u32 {
    1
}
fn default_description_max_chars() -> usize {
    4000
}
fn default_log_level() -> String {
    "info".to_string()
}

/// Configuration manager
pub struct ConfigManager {
    config: CodeMapConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with the following precedence:
    /// 1. Environment variables (.env file)
    /// 2. Config file (.codemap.toml)
    /// 3. Sensible defaults
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_dotenv();

        let (config, config_path) = Self::load_config_file()?;
        Self::finish(config, config_path)
    }

    /// Load an explicit config file, still honouring environment overrides.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        Self::load_dotenv();

        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let config = Self::read_toml_file(path)?;
        Self::finish(config, Some(path.to_path_buf()))
    }

    fn finish(config: CodeMapConfig, config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = Self::apply_env_overrides(config);
        Self::validate_config(&config)?;

        match &config_path {
            Some(path) => info!("Config file: {}", path.display()),
            None => info!("Config file: NONE (using defaults)"),
        }
        info!(
            "Debounce {}ms, minimum interval {}ms, descriptions {}",
            config.daemon.debounce_ms,
            config.daemon.min_interval_ms,
            if config.description.enabled {
                "enabled"
            } else {
                "disabled"
            }
        );

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Load .env file if it exists
    fn load_dotenv() {
        if Path::new(".env").exists() {
            if let Err(e) = dotenv::from_filename(".env") {
                warn!("Failed to load .env file: {}", e);
            }
            return;
        }

        if let Some(home) = dirs::home_dir() {
            let home_env = home.join(".codemap.env");
            if home_env.exists() {
                if let Err(e) = dotenv::from_path(&home_env) {
                    warn!("Failed to load .codemap.env: {}", e);
                }
            }
        }
    }

    fn load_config_file() -> Result<(CodeMapConfig, Option<PathBuf>), ConfigError> {
        let local_config = Path::new(".codemap.toml");
        if local_config.exists() {
            let config = Self::read_toml_file(local_config)?;
            return Ok((config, Some(local_config.to_path_buf())));
        }

        let user_config = codemap_home().join("config.toml");
        if user_config.exists() {
            let config = Self::read_toml_file(&user_config)?;
            return Ok((config, Some(user_config)));
        }

        Ok((CodeMapConfig::default(), None))
    }

    fn read_toml_file(path: &Path) -> Result<CodeMapConfig, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    fn apply_env_overrides(mut config: CodeMapConfig) -> CodeMapConfig {
        if let Ok(ms) = std::env::var("CODEMAP_DEBOUNCE_MS") {
            if let Ok(ms) = ms.parse() {
                config.daemon.debounce_ms = ms;
            }
        }
        if let Ok(ms) = std::env::var("CODEMAP_MIN_INTERVAL_MS") {
            if let Ok(ms) = ms.parse() {
                config.daemon.min_interval_ms = ms;
            }
        }
        if let Ok(auto) = std::env::var("CODEMAP_AUTO_UPDATE") {
            config.daemon.auto_update = auto.to_lowercase() == "true" || auto == "1";
        }
        if let Ok(dir) = std::env::var("CODEMAP_CACHE_DIR") {
            config.cache.directory = PathBuf::from(dir);
        }

        // Description provider
        if let Ok(url) = std::env::var("CODEMAP_DESCRIPTION_URL") {
            config.description.base_url = url;
            config.description.enabled = true;
        }
        if let Ok(model) = std::env::var("CODEMAP_DESCRIPTION_MODEL") {
            config.description.model = model;
        }
        if let Ok(key) = std::env::var("CODEMAP_DESCRIPTION_API_KEY") {
            config.description.api_key = Some(key);
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            config.logging.level = level;
        }

        config
    }

    pub fn validate_config(config: &CodeMapConfig) -> Result<(), ConfigError> {
        if config.daemon.debounce_ms == 0 {
            return Err(ConfigError::ValidationError(
                "daemon.debounce_ms must be greater than zero".to_string(),
            ));
        }
        if config.output.max_depth == 0 {
            return Err(ConfigError::ValidationError(
                "output.max_depth must be at least 1".to_string(),
            ));
        }
        if config.output.artifact.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "output.artifact must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn config(&self) -> &CodeMapConfig {
        &self.config
    }

    pub fn into_config(self) -> CodeMapConfig {
        self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}
