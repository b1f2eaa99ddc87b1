//! Replay configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::MAX_REPLAY_ATTEMPTS;

/// Controls how a session is rebuilt from a snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct ReplayConfig {
    /// Upper bound on full replay attempts before the last error is returned
    pub max_attempts: u32,
    /// Pause between two failed attempts
    pub retry_backoff: Duration,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            max_attempts: MAX_REPLAY_ATTEMPTS,
            retry_backoff: Duration::ZERO,
        }
    }
}

impl ReplayConfig {
    /// Create a configuration with the given attempt bound and no backoff.
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::config("max_attempts must be at least 1"));
        }
        Ok(())
    }

    /// Parse from TOML text. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: ReplayConfigFile =
            toml::from_str(content).map_err(|e| Error::config(format!("invalid TOML: {}", e)))?;
        let config = file.to_config();
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

/// Configuration file format for serialization.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfigFile {
    /// Upper bound on replay attempts
    pub max_attempts: u32,
    /// Backoff between attempts (milliseconds)
    pub retry_backoff_ms: u64,
}

impl Default for ReplayConfigFile {
    fn default() -> Self {
        Self::from_config(&ReplayConfig::default())
    }
}

impl ReplayConfigFile {
    /// Convert to runtime configuration.
    pub fn to_config(&self) -> ReplayConfig {
        ReplayConfig {
            max_attempts: self.max_attempts,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    /// Create from runtime configuration.
    pub fn from_config(config: &ReplayConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            retry_backoff_ms: config.retry_backoff.as_millis() as u64,
        }
    }
}
