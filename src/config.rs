//! Engine configuration
//!
//! Defaults applied when a request leaves an option unset. Every field has
//! a default, so a config file only needs the keys it overrides.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::{ReadConcern, ReadPreference};

/// Configuration load/validation failure
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Logging settings for the binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `QUERYGATE_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Defaults for paging requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Page size when a request has no `limit`
    pub default_limit: i64,
    pub default_read_preference: ReadPreference,
    pub default_read_concern: ReadConcern,
    /// Whether `totalPages`/`totalDocuments` are computed by default
    pub calculate_pages: bool,
    pub allow_disk_use: bool,
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            default_read_preference: ReadPreference::SecondaryPreferred,
            default_read_concern: ReadConcern::Majority,
            calculate_pages: true,
            allow_disk_use: false,
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Loads and validates a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let config: EngineConfig =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_limit < 1 {
            return Err(ConfigError::Invalid(format!(
                "default_limit must be positive, got {}",
                self.default_limit
            )));
        }
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::Invalid("logging.level must not be empty".into()));
        }
        Ok(())
    }
}
