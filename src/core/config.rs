//! TOML configuration for the messaging layer
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration. The binary layers CLI overrides on top.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::error_handling::ContextualError;

/// Configuration loading and validation failures
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Error reading configuration file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Error parsing configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

impl ContextualError for ConfigError {
    fn is_user_actionable(&self) -> bool {
        true
    }

    fn user_message(&self) -> Option<&str> {
        match self {
            ConfigError::Invalid { message } => Some(message),
            ConfigError::Read { .. } => Some("configuration file could not be read"),
            ConfigError::Parse(_) => Some("configuration file is not valid TOML"),
        }
    }
}

/// Logging section of the configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            file: None,
        }
    }
}

/// Messaging layer configuration
///
/// ```toml
/// partition_count = 31
/// lease_duration_ms = 10000
/// lease_renew_interval_ms = 2000
///
/// [logging]
/// level = "debug"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Number of partitions in each backing cache
    pub partition_count: u32,
    /// Lease granted to a subscription on subscribe and on every renewal
    pub lease_duration_ms: u64,
    /// How often an active subscriber extends its lease
    pub lease_renew_interval_ms: u64,
    /// How often the lease coordinator looks for expired leases
    pub lease_sweep_interval_ms: u64,
    pub logging: LoggingConfig,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            partition_count: 31,
            lease_duration_ms: 10_000,
            lease_renew_interval_ms: 2_000,
            lease_sweep_interval_ms: 1_000,
            logging: LoggingConfig::default(),
        }
    }
}

impl MessagingConfig {
    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: MessagingConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Default configuration file location, if a config directory exists
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("gridmq").join("gridmq.toml"))
    }

    /// Load the given file, or the default file when present, or defaults
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.partition_count == 0 {
            return Err(ConfigError::Invalid {
                message: "partition_count must be greater than 0".to_string(),
            });
        }
        if self.lease_duration_ms == 0 {
            return Err(ConfigError::Invalid {
                message: "lease_duration_ms must be greater than 0".to_string(),
            });
        }
        if self.lease_renew_interval_ms == 0
            || self.lease_renew_interval_ms >= self.lease_duration_ms
        {
            return Err(ConfigError::Invalid {
                message: format!(
                    "lease_renew_interval_ms ({}) must be non-zero and shorter than lease_duration_ms ({})",
                    self.lease_renew_interval_ms, self.lease_duration_ms
                ),
            });
        }
        if self.lease_sweep_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                message: "lease_sweep_interval_ms must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    pub fn lease_duration(&self) -> Duration {
        Duration::from_millis(self.lease_duration_ms)
    }

    pub fn lease_renew_interval(&self) -> Duration {
        Duration::from_millis(self.lease_renew_interval_ms)
    }

    pub fn lease_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.lease_sweep_interval_ms)
    }
}
