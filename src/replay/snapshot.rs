//! Handshake snapshots.

use std::fmt;
use std::path::Path;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::engine::SequenceState;
use crate::error::{Error, Result};
use crate::SEQUENCE_WIDTH;

/// Everything needed to rebuild an established session on the same
/// connection.
///
/// A snapshot is an immutable value: it captures the recorded handshake
/// bytes, the sequence counters and the negotiated cipher suite at the
/// moment it was taken, and never changes afterwards. Byte buffers are
/// reference-counted, so cloning is cheap.
///
/// The snapshot holds enough to decrypt the session. Persisting it (see
/// [`Snapshot::to_toml`]) writes that material in the clear.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(with = "base64_bytes")]
    transport_bytes: Bytes,
    #[serde(with = "base64_bytes")]
    random_bytes: Bytes,
    #[serde(with = "hex_counter")]
    in_sequence: [u8; SEQUENCE_WIDTH],
    #[serde(with = "hex_counter")]
    out_sequence: [u8; SEQUENCE_WIDTH],
    cipher_suite: u16,
}

impl Snapshot {
    /// Assemble a snapshot.
    pub fn new(
        transport_bytes: Bytes,
        random_bytes: Bytes,
        sequence: SequenceState,
        cipher_suite: u16,
    ) -> Self {
        Self {
            transport_bytes,
            random_bytes,
            in_sequence: sequence.inbound,
            out_sequence: sequence.outbound,
            cipher_suite,
        }
    }

    /// Bytes the engine read from the transport during the handshake.
    pub fn transport_bytes(&self) -> &Bytes {
        &self.transport_bytes
    }

    /// Bytes the engine drew from its randomness source during the
    /// handshake, probe reads excluded.
    pub fn random_bytes(&self) -> &Bytes {
        &self.random_bytes
    }

    /// Inbound record sequence counter.
    pub fn in_sequence(&self) -> [u8; SEQUENCE_WIDTH] {
        self.in_sequence
    }

    /// Outbound record sequence counter.
    pub fn out_sequence(&self) -> [u8; SEQUENCE_WIDTH] {
        self.out_sequence
    }

    /// Both counters.
    pub fn sequence(&self) -> SequenceState {
        SequenceState {
            inbound: self.in_sequence,
            outbound: self.out_sequence,
        }
    }

    /// Negotiated cipher suite identifier.
    pub fn cipher_suite(&self) -> u16 {
        self.cipher_suite
    }

    /// Serialize to TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::invalid(format!("snapshot encoding failed: {}", e)))
    }

    /// Parse from TOML.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::invalid(format!("invalid snapshot: {}", e)))
    }

    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_toml(&std::fs::read_to_string(path)?)
    }

    /// Write to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("transport_bytes", &format_args!("{} bytes", self.transport_bytes.len()))
            .field("random_bytes", &format_args!("{} bytes", self.random_bytes.len()))
            .field("in_sequence", &u64::from_be_bytes(self.in_sequence))
            .field("out_sequence", &u64::from_be_bytes(self.out_sequence))
            .field("cipher_suite", &format_args!("{:#06x}", self.cipher_suite))
            .finish()
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

mod hex_counter {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::SEQUENCE_WIDTH;

    pub fn serialize<S: Serializer>(
        counter: &[u8; SEQUENCE_WIDTH],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(counter))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<[u8; SEQUENCE_WIDTH], D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let mut counter = [0u8; SEQUENCE_WIDTH];
        hex::decode_to_slice(encoded, &mut counter).map_err(serde::de::Error::custom)?;
        Ok(counter)
    }
}
