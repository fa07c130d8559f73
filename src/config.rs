//! Service configuration.
//!
//! Loaded from a TOML file, then overridden from `ROLLUP_*` environment
//! variables. Every section is optional; a missing section takes its
//! defaults. A `[policy]` section that is present must name both fields.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::counting::{GranularitySet, Policy};
use crate::store::SimulatedStoreConfig;

/// Environment variable overriding `policy.consistency`
pub const ENV_CONSISTENCY: &str = "ROLLUP_CONSISTENCY";
/// Environment variable overriding `policy.write_synchronicity`
pub const ENV_WRITE_SYNCHRONICITY: &str = "ROLLUP_WRITE_SYNCHRONICITY";
/// Environment variable overriding `logging.level`
pub const ENV_LOG: &str = "ROLLUP_LOG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration for the `rollup-counters` service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Default policy handed to every counter
    #[serde(default)]
    pub policy: Policy,

    /// Granularities every event is rolled up into
    #[serde(default)]
    pub granularities: GranularitySet,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which store backs the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    /// In-memory store wrapped in seeded fault injection
    Simulated,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Only read when `backend = "simulated"`
    #[serde(default)]
    pub simulation: SimulatedStoreConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. `info` or `rollup_counters=debug`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit one JSON object per line instead of human-readable text
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            json: false,
        }
    }
}

impl ServiceConfig {
    /// Load, apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file without overrides or validation.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Apply `ROLLUP_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (used by tests).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_CONSISTENCY) {
            self.policy.consistency = raw
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("{}: {}", ENV_CONSISTENCY, e)))?;
        }
        if let Some(raw) = lookup(ENV_WRITE_SYNCHRONICITY) {
            self.policy.write_synchronicity = raw.parse().map_err(|e| {
                ConfigError::Invalid(format!("{}: {}", ENV_WRITE_SYNCHRONICITY, e))
            })?;
        }
        if let Some(level) = lookup(ENV_LOG) {
            self.logging.level = level;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "logging.level must not be empty".to_string(),
            ));
        }
        if self.store.backend == StoreBackend::Simulated {
            self.store
                .simulation
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("store.simulation: {}", e)))?;
        }
        Ok(())
    }
}
