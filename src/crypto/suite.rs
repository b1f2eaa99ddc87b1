//! Cipher suite identifiers understood by the built-in engine.

use serde::{Deserialize, Serialize};

/// Record protection suites, identified by their TLS 1.3 code points.
///
/// Every suite uses X25519 for key agreement and HKDF-SHA256 for the key
/// schedule; they differ only in the record AEAD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
#[repr(u16)]
pub enum CipherSuite {
    /// AES-128-GCM
    Aes128Gcm = 0x1301,
    /// AES-256-GCM
    Aes256Gcm = 0x1302,
    /// ChaCha20-Poly1305, preferred by default
    ChaCha20Poly1305 = 0x1303,
}

impl CipherSuite {
    /// All supported suites in default preference order.
    pub const ALL: [CipherSuite; 3] = [
        CipherSuite::ChaCha20Poly1305,
        CipherSuite::Aes128Gcm,
        CipherSuite::Aes256Gcm,
    ];

    /// Convert from wire format (u16).
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x1301 => Some(Self::Aes128Gcm),
            0x1302 => Some(Self::Aes256Gcm),
            0x1303 => Some(Self::ChaCha20Poly1305),
            _ => None,
        }
    }

    /// Convert to wire format (u16).
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    /// Length of the record key in bytes.
    pub fn key_len(self) -> usize {
        match self {
            Self::Aes128Gcm => 16,
            Self::Aes256Gcm | Self::ChaCha20Poly1305 => 32,
        }
    }

    /// Record AEAD name, for logs.
    ///
    /// The registered TLS name of 0x1302 ends in SHA384, but the key
    /// schedule here is HKDF-SHA256 for every suite, so only the AEAD is
    /// named.
    pub fn name(self) -> &'static str {
        match self {
            Self::Aes128Gcm => "AES_128_GCM",
            Self::Aes256Gcm => "AES_256_GCM",
            Self::ChaCha20Poly1305 => "CHACHA20_POLY1305",
        }
    }
}

impl From<CipherSuite> for u16 {
    fn from(suite: CipherSuite) -> Self {
        suite.to_u16()
    }
}

impl TryFrom<u16> for CipherSuite {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::from_u16(value).ok_or_else(|| format!("unsupported cipher suite {:#06x}", value))
    }
}
