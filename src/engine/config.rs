//! Built-in engine configuration.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::crypto::CipherSuite;
use crate::error::{Error, Result};

/// Largest encoded ALPN protocol list. Keeps the ClientHello inside a
/// single plaintext record.
pub const MAX_ALPN_LIST_LEN: usize = 8 * 1024;

/// Configuration for a [`RecordEngine`](super::RecordEngine).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Cipher suites in preference order. Clients offer them in this order;
    /// servers pick the first one the client offered.
    #[serde(default = "default_cipher_suites")]
    pub cipher_suites: Vec<CipherSuite>,

    /// Server name sent by clients (empty: none)
    #[serde(default)]
    pub server_name: String,

    /// Application protocols, in preference order
    #[serde(default)]
    pub alpn: Vec<String>,
}

fn default_cipher_suites() -> Vec<CipherSuite> {
    CipherSuite::ALL.to_vec()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cipher_suites: default_cipher_suites(),
            server_name: String::new(),
            alpn: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Create a configuration restricted to a single suite.
    pub fn with_cipher_suite(suite: CipherSuite) -> Self {
        Self {
            cipher_suites: vec![suite],
            ..Self::default()
        }
    }

    /// Set the server name.
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    /// Set the application protocols.
    pub fn alpn<I, P>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.alpn = protocols.into_iter().map(Into::into).collect();
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.cipher_suites.is_empty() {
            return Err(Error::config("cipher_suites cannot be empty"));
        }
        let unique: HashSet<_> = self.cipher_suites.iter().collect();
        if unique.len() != self.cipher_suites.len() {
            return Err(Error::config("cipher_suites contains duplicates"));
        }
        if self.server_name.len() > u8::MAX as usize {
            return Err(Error::config("server_name longer than 255 bytes"));
        }
        if self.alpn.iter().any(|p| p.is_empty() || p.len() > u8::MAX as usize) {
            return Err(Error::config("ALPN protocol names must be 1-255 bytes"));
        }
        let alpn_len: usize = self.alpn.iter().map(|p| 1 + p.len()).sum();
        if alpn_len > MAX_ALPN_LIST_LEN {
            return Err(Error::config(format!(
                "ALPN list of {} bytes exceeds {}",
                alpn_len, MAX_ALPN_LIST_LEN
            )));
        }
        Ok(())
    }

    /// Parse from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::config(format!("invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}
