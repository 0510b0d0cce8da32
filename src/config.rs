/// Configuration system for history-replay
///
/// Supports loading from multiple sources with priority:
/// CLI args > Environment variables > Config file > Defaults
use crate::error::{ConfigError, ReplayError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Files and folders left out of the walk
    #[serde(default)]
    pub exclusions: ExclusionConfig,

    /// Retry policy for transient source conflicts
    #[serde(default)]
    pub retry: RetryConfig,

    /// Commit message normalization
    #[serde(default)]
    pub comments: CommentConfig,

    /// Review tracker lookups
    #[serde(default)]
    pub review: ReviewConfig,

    /// Registration store location
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Engine behaviour
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Exclusion lists, re-read on every run
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ExclusionConfig {
    /// File name suffixes to skip (e.g. ".bak")
    #[serde(default)]
    pub files: Vec<String>,

    /// Folder names to skip, matched exactly
    #[serde(default)]
    pub folders: Vec<String>,
}

/// Bounded exponential backoff for per-revision fetches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

/// Commit message normalization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentConfig {
    /// Upper bound on id rewrites applied to a single message
    #[serde(default = "default_max_rewrites")]
    pub max_rewrites: usize,

    /// CSV file mapping requirement codes to sequence numbers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirement_table: Option<PathBuf>,

    /// Offset added to every requirement sequence number
    #[serde(default = "default_requirement_base")]
    pub requirement_base: u32,
}

/// Review tracker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Fetch review descriptions over HTTP
    #[serde(default)]
    pub enabled: bool,

    /// REST endpoint; the review id is appended
    #[serde(default = "default_review_api_url")]
    pub api_url: String,

    /// Hosts recognized in review links
    #[serde(default = "default_review_hosts")]
    pub hosts: Vec<String>,

    /// Domain substituted for the hosts in emitted links
    #[serde(default = "default_canonical_domain")]
    pub canonical_domain: String,

    #[serde(default = "default_review_timeout")]
    pub timeout_secs: u64,
}

/// Registration store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_registry_path")]
    pub path: PathBuf,

    /// How long to wait for another run on the same branch
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// Log every discovered commit
    #[serde(default)]
    pub verbose: bool,
}

fn default_max_attempts() -> u32 {
    8
}

fn default_initial_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    5_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_rewrites() -> usize {
    64
}

fn default_requirement_base() -> u32 {
    30_000
}

fn default_review_api_url() -> String {
    "http://192.168.101.27/api/review-requests/".to_string()
}

fn default_review_hosts() -> Vec<String> {
    vec!["192.168.101.27".to_string(), "10.0.5.169".to_string()]
}

fn default_canonical_domain() -> String {
    "reviewboard.db.org".to_string()
}

fn default_review_timeout() -> u64 {
    15
}

fn default_registry_path() -> PathBuf {
    crate::paths::PlatformPaths::default_registry_path()
}

fn default_lock_timeout() -> u64 {
    30
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for CommentConfig {
    fn default() -> Self {
        Self {
            max_rewrites: default_max_rewrites(),
            requirement_table: None,
            requirement_base: default_requirement_base(),
        }
    }
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: default_review_api_url(),
            hosts: default_review_hosts(),
            canonical_domain: default_canonical_domain(),
            timeout_secs: default_review_timeout(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: default_registry_path(),
            lock_timeout_secs: default_lock_timeout(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> Result<Self, ReplayError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFailed(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseFailed(format!("Invalid TOML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default location or create default
    pub fn load_or_default() -> Result<Self, ReplayError> {
        let config_path = crate::paths::PlatformPaths::default_config_path();

        if config_path.exists() {
            tracing::info!("Loading config from: {}", config_path.display());
            Self::from_file(&config_path)
        } else {
            tracing::info!("No config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), ReplayError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::SaveFailed(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = self.to_toml()?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved config to: {}", path.display());
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, ReplayError> {
        toml::to_string_pretty(self).map_err(|e| {
            ConfigError::SaveFailed(format!("Failed to serialize config: {}", e)).into()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ReplayError> {
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "must be greater than 0"));
        }

        if self.retry.multiplier < 1.0 {
            return Err(invalid(
                "retry.multiplier",
                format!("must be at least 1.0, got {}", self.retry.multiplier),
            ));
        }

        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            return Err(invalid(
                "retry.max_delay_ms",
                "must not be smaller than retry.initial_delay_ms",
            ));
        }

        if self.comments.max_rewrites == 0 {
            return Err(invalid("comments.max_rewrites", "must be greater than 0"));
        }

        if self.review.enabled && self.review.canonical_domain.trim().is_empty() {
            return Err(invalid(
                "review.canonical_domain",
                "must not be empty when review lookups are enabled",
            ));
        }

        if self.exclusions.files.iter().any(|s| s.is_empty()) {
            return Err(invalid("exclusions.files", "entries must not be empty"));
        }

        if self.exclusions.folders.iter().any(|s| s.is_empty()) {
            return Err(invalid("exclusions.folders", "entries must not be empty"));
        }

        Ok(())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(files) = std::env::var("HISTORY_REPLAY_EXCLUDE_FILES") {
            self.exclusions.files = split_list(&files);
        }

        if let Ok(folders) = std::env::var("HISTORY_REPLAY_EXCLUDE_FOLDERS") {
            self.exclusions.folders = split_list(&folders);
        }

        if let Ok(path) = std::env::var("HISTORY_REPLAY_REGISTRY") {
            self.registry.path = PathBuf::from(path);
        }

        if let Ok(attempts) = std::env::var("HISTORY_REPLAY_MAX_ATTEMPTS")
            && let Ok(attempts) = attempts.parse()
        {
            self.retry.max_attempts = attempts;
        }

        if let Ok(url) = std::env::var("HISTORY_REPLAY_REVIEW_URL") {
            self.review.api_url = url;
        }

        if let Ok(table) = std::env::var("HISTORY_REPLAY_REQUIREMENT_TABLE") {
            self.comments.requirement_table = Some(PathBuf::from(table));
        }
    }

    /// Create a new Config with defaults and environment overrides
    pub fn new() -> Result<Self, ReplayError> {
        let mut config = Self::load_or_default()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> ReplayError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.into(),
    }
    .into()
}

/// Comma separated list, blanks dropped
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
