//! Configuration settings for rollcall.
//!
//! Settings are loaded from `~/.rollcall/config.yaml`. Every field has a
//! default, so a partial file (or no file at all) is valid.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cli::args::OutputFormat;
use crate::config::Paths;
use crate::error::RollcallError;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// General settings.
    pub general: GeneralConfig,
    /// Sync queue behaviour.
    pub queue: QueueConfig,
    /// Remote spreadsheet service.
    pub remote: RemoteConfig,
    /// Progress tracking.
    pub progress: ProgressConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Default output format.
    #[serde(default = "default_output_format")]
    pub default_output: OutputFormat,
    /// Log filter used when `RUST_LOG` is unset (e.g. `info`, `debug`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Sync queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Attempts before an operation is marked failed.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Maximum number of records held in the queue.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
    /// Records queued longer ago than this are dropped on load.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Persist the snapshot after this many executed records during a drain.
    #[serde(default = "default_persist_every")]
    pub persist_every: usize,
    /// Merge a new operation into a queued one with the same type and data type.
    #[serde(default = "default_true")]
    pub merge_duplicates: bool,
    /// Key the snapshot is stored under.
    #[serde(default = "default_storage_key")]
    pub storage_key: String,
}

/// Remote service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Web app endpoint of the spreadsheet service.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Bearer token sent with every request.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Progress tracker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Number of samples kept for rolling averages.
    #[serde(default = "default_window")]
    pub window: usize,
}

// Default value functions for serde
const fn default_output_format() -> OutputFormat {
    OutputFormat::Pretty
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_max_queue_size() -> usize {
    1000
}

const fn default_retention_days() -> u32 {
    7
}

const fn default_persist_every() -> usize {
    10
}

const fn default_true() -> bool {
    true
}

fn default_storage_key() -> String {
    "sync_queue".to_string()
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_window() -> usize {
    50
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_output: default_output_format(),
            log_level: default_log_level(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            max_queue_size: default_max_queue_size(),
            retention_days: default_retention_days(),
            persist_every: default_persist_every(),
            merge_duplicates: default_true(),
            storage_key: default_storage_key(),
        }
    }
}

impl QueueConfig {
    /// Retention window as a chrono duration.
    #[must_use]
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RemoteConfig {
    /// Request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The configured endpoint, or a config error naming the missing key.
    ///
    /// # Errors
    ///
    /// Returns `RollcallError::Config` if no endpoint is set.
    pub fn require_endpoint(&self) -> Result<&str, RollcallError> {
        self.endpoint
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| {
                RollcallError::Config(
                    "remote.endpoint is not set; add it to config.yaml".to_string(),
                )
            })
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
        }
    }
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self, RollcallError> {
        let paths = Paths::new()?;
        Self::load_from_path(&paths.config_file)
    }

    /// Load configuration from a specific path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load_from_path(path: &std::path::Path) -> Result<Self, RollcallError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            RollcallError::Config(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        serde_yaml::from_str(&contents).map_err(|e| {
            RollcallError::Config(format!(
                "Failed to parse config file {}: {e}",
                path.display()
            ))
        })
    }

    /// Save configuration to a specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn save_to_path(&self, path: &std::path::Path) -> Result<(), RollcallError> {
        let contents = serde_yaml::to_string(self)
            .map_err(|e| RollcallError::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, contents).map_err(|e| {
            RollcallError::Config(format!(
                "Failed to write config file {}: {e}",
                path.display()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.general.default_output, OutputFormat::Pretty);
        assert_eq!(config.queue.max_retries, 3);
        assert_eq!(config.queue.max_queue_size, 1000);
        assert_eq!(config.queue.retention_days, 7);
        assert_eq!(config.queue.persist_every, 10);
        assert!(config.queue.merge_duplicates);
        assert_eq!(config.queue.storage_key, "sync_queue");
        assert!(config.remote.endpoint.is_none());
        assert_eq!(config.progress.window, 50);
    }

    #[test]
    fn test_load_missing_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let config = Config::load_from_path(&config_path).unwrap();

        assert_eq!(config.queue.max_retries, 3);
    }

    #[test]
    fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut config = Config::default();
        config.queue.max_retries = 5;
        config.remote.endpoint = Some("https://example.test/exec".to_string());

        config.save_to_path(&config_path).unwrap();

        let loaded = Config::load_from_path(&config_path).unwrap();

        assert_eq!(loaded.queue.max_retries, 5);
        assert_eq!(
            loaded.remote.require_endpoint().unwrap(),
            "https://example.test/exec"
        );
    }

    #[test]
    fn test_partial_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let partial_yaml = r#"
queue:
  max_queue_size: 250
"#;
        std::fs::write(&config_path, partial_yaml).unwrap();

        let config = Config::load_from_path(&config_path).unwrap();

        assert_eq!(config.queue.max_queue_size, 250);
        assert_eq!(config.queue.max_retries, 3);
        assert_eq!(config.general.default_output, OutputFormat::Pretty);
    }

    #[test]
    fn test_invalid_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(&config_path, "queue: [not, a, map]").unwrap();

        let err = Config::load_from_path(&config_path).unwrap_err();
        assert!(matches!(err, RollcallError::Config(_)));
    }

    #[test]
    fn test_missing_endpoint() {
        let config = RemoteConfig::default();
        assert!(matches!(
            config.require_endpoint(),
            Err(RollcallError::Config(_))
        ));
    }
}
