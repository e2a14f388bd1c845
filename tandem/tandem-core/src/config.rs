//! Configuration for Tandem endpoints and the `tandem` binary.
//!
//! Configuration lives at `~/.tandem/config.toml` unless `TANDEM_CONFIG_PATH`
//! points elsewhere. Selected values can be overridden from the environment.
//!
//! ```toml
//! [general]
//! log_level = "info"
//!
//! [endpoint]
//! root = "/home/user/Sync"
//!
//! [watch]
//! buffer_capacity = 1000
//! event_channel_capacity = 64
//! ignore_patterns = ["*.part"]
//! ```

use crate::error::{Result, TandemError};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const ENV_CONFIG_PATH: &str = "TANDEM_CONFIG_PATH";
pub const ENV_LOG_LEVEL: &str = "TANDEM_LOG_LEVEL";
pub const ENV_ROOT: &str = "TANDEM_ROOT";
pub const ENV_BUFFER_CAPACITY: &str = "TANDEM_BUFFER_CAPACITY";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TandemConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub watch: WatchConfig,
}

/// General settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error
    pub log_level: String,
}

/// Local endpoint settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Root directory exposed by the endpoint
    #[serde(default)]
    pub root: Option<PathBuf>,
}

/// Watch pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Initial segment capacity of the growable notification buffer
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    /// Capacity of each session's event channel
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
    /// Extra gitignore-style patterns, on top of the built-in ignore list
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
}

fn default_buffer_capacity() -> usize {
    1000
}

fn default_event_channel_capacity() -> usize {
    64
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
            event_channel_capacity: default_event_channel_capacity(),
            ignore_patterns: Vec::new(),
        }
    }
}

impl TandemConfig {
    /// Load from the default location, falling back to defaults when no file
    /// exists. Environment overrides are applied in both cases.
    pub async fn load_or_default() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            Self::load_from_path(&path).await?
        } else {
            debug!("No configuration at {}, using defaults", path.display());
            Self::default()
        };
        config.merge_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file.
    pub async fn load_from_path(path: &Path) -> Result<Self> {
        debug!("Loading configuration from: {}", path.display());
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            TandemError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::import_toml(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save to `path` atomically (temp file, then rename).
    pub async fn save_to_path(&self, path: &Path) -> Result<()> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    TandemError::config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = self.export_toml()?;
        let temp_path = path.with_extension("toml.tmp");

        tokio::fs::write(&temp_path, content)
            .await
            .map_err(|e| TandemError::config(format!("Failed to write config file: {}", e)))?;
        tokio::fs::rename(&temp_path, path)
            .await
            .map_err(|e| TandemError::config(format!("Failed to rename config file: {}", e)))?;

        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !VALID_LOG_LEVELS.contains(&self.general.log_level.as_str()) {
            return Err(TandemError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.general.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        if self.watch.buffer_capacity == 0 {
            return Err(TandemError::config("buffer_capacity must be greater than 0"));
        }

        if self.watch.event_channel_capacity == 0 {
            return Err(TandemError::config(
                "event_channel_capacity must be greater than 0",
            ));
        }

        if let Some(pattern) = self.watch.ignore_patterns.iter().find(|p| p.trim().is_empty()) {
            return Err(TandemError::config(format!(
                "Ignore patterns must not be blank: {:?}",
                pattern
            )));
        }

        Ok(())
    }

    /// Apply `TANDEM_*` environment overrides.
    pub fn merge_env_vars(&mut self) -> Result<()> {
        if let Ok(log_level) = std::env::var(ENV_LOG_LEVEL) {
            debug!("Overriding log_level from environment: {}", log_level);
            self.general.log_level = log_level;
        }

        if let Ok(root) = std::env::var(ENV_ROOT) {
            debug!("Overriding endpoint root from environment: {}", root);
            self.endpoint.root = Some(PathBuf::from(root));
        }

        if let Ok(capacity) = std::env::var(ENV_BUFFER_CAPACITY) {
            let capacity = capacity.parse::<usize>().map_err(|e| {
                TandemError::config(format!("Invalid buffer capacity in environment: {}", e))
            })?;
            self.watch.buffer_capacity = capacity;
        }

        Ok(())
    }

    pub fn export_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| TandemError::config(format!("Failed to serialize config: {}", e)))
    }

    pub fn import_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| TandemError::config(format!("Failed to parse config: {}", e)))
    }

    /// Base directory (`~/.tandem/`), or the parent of `TANDEM_CONFIG_PATH`.
    pub fn base_dir() -> Result<PathBuf> {
        if let Ok(config_path) = std::env::var(ENV_CONFIG_PATH) {
            if let Some(parent) = PathBuf::from(config_path).parent() {
                return Ok(parent.to_path_buf());
            }
        }

        let base_dirs = BaseDirs::new()
            .ok_or_else(|| TandemError::config("Could not determine home directory"))?;
        Ok(base_dirs.home_dir().join(".tandem"))
    }

    /// Configuration file path (`~/.tandem/config.toml`).
    pub fn config_path() -> Result<PathBuf> {
        if let Ok(config_path) = std::env::var(ENV_CONFIG_PATH) {
            return Ok(PathBuf::from(config_path));
        }
        Ok(Self::base_dir()?.join("config.toml"))
    }
}
