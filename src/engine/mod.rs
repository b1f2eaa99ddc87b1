//! The TLS engine contract and the built-in engine.
//!
//! A session drives any engine that implements [`TlsEngine`]. Besides the
//! ordinary handshake/read/write surface, forking needs three things from
//! the engine that TLS libraries rarely expose:
//!
//! - the byte stream and the randomness source are handed in at
//!   construction, so the session can interpose its recording/replaying
//!   proxies;
//! - per-direction record sequence counters can be exported and imported
//!   ([`SequenceState`]);
//! - the negotiated cipher suite can be read.
//!
//! Engines describe what they support through [`EngineCapabilities`], which
//! sessions check before touching the transport.

use std::io::{Read, Write};

use rand_core::{CryptoRng, RngCore};

use crate::error::{Error, Result};
use crate::SEQUENCE_WIDTH;

mod config;
mod handshake;
mod record;

pub use config::EngineConfig;
pub use handshake::{ClientHello, ContentType, HandshakeType, ServerHello};
pub use record::RecordEngine;

/// Layout version of [`SequenceState`] this crate understands.
pub const SEQUENCE_LAYOUT_VERSION: u16 = 1;

/// Which side of the handshake an engine plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Sends the first flight
    Client,
    /// Answers the client's first flight
    Server,
}

/// Record sequence counters of both directions, big-endian.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SequenceState {
    /// Next sequence number expected on incoming records
    pub inbound: [u8; SEQUENCE_WIDTH],
    /// Next sequence number used on outgoing records
    pub outbound: [u8; SEQUENCE_WIDTH],
}

impl SequenceState {
    /// Build from numeric counters.
    pub fn from_counters(inbound: u64, outbound: u64) -> Self {
        Self {
            inbound: inbound.to_be_bytes(),
            outbound: outbound.to_be_bytes(),
        }
    }

    /// Inbound counter as a number.
    pub fn inbound_counter(&self) -> u64 {
        u64::from_be_bytes(self.inbound)
    }

    /// Outbound counter as a number.
    pub fn outbound_counter(&self) -> u64 {
        u64::from_be_bytes(self.outbound)
    }
}

/// What an engine offers for forking.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineCapabilities {
    /// Version of the sequence-state mapping the engine implements
    pub sequence_layout_version: u16,
    /// Width of each sequence counter in bytes
    pub counter_width: usize,
    /// Engine can report its sequence counters
    pub exports_sequence: bool,
    /// Engine can overwrite its sequence counters
    pub imports_sequence: bool,
}

impl EngineCapabilities {
    /// Fail fast if a session cannot be recorded (or, when `resuming`,
    /// replayed) on top of this engine.
    pub fn check(&self, resuming: bool) -> Result<()> {
        if self.sequence_layout_version != SEQUENCE_LAYOUT_VERSION {
            return Err(Error::Incompatible(format!(
                "sequence layout version {} (supported: {})",
                self.sequence_layout_version, SEQUENCE_LAYOUT_VERSION
            )));
        }
        if self.counter_width != SEQUENCE_WIDTH {
            return Err(Error::Incompatible(format!(
                "{}-byte sequence counters (expected {})",
                self.counter_width, SEQUENCE_WIDTH
            )));
        }
        if !self.exports_sequence {
            return Err(Error::Incompatible("engine cannot export sequence state".into()));
        }
        if resuming && !self.imports_sequence {
            return Err(Error::Incompatible("engine cannot import sequence state".into()));
        }
        Ok(())
    }
}

/// A TLS engine that a session can record and replay.
///
/// `S` is the byte stream and `R` the randomness source the engine must use
/// for *all* of its I/O and *all* of the randomness it consumes.
pub trait TlsEngine<S, R>: Sized
where
    S: Read + Write,
    R: RngCore + CryptoRng,
{
    /// Engine configuration (suites, names, ...)
    type Config;

    /// Describe the engine's sequence-state support.
    fn capabilities() -> EngineCapabilities;

    /// Construct an engine over `stream`, drawing randomness from `entropy`.
    ///
    /// Construction performs no I/O.
    fn new(role: Role, stream: S, entropy: R, config: &Self::Config) -> Self;

    /// Run the handshake to completion. Blocking.
    fn handshake(&mut self) -> Result<()>;

    /// Whether the handshake has completed.
    fn is_handshake_complete(&self) -> bool;

    /// Read decrypted application data. `Ok(0)` means the peer closed.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Encrypt and send application data.
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Tell the peer no more data will be sent.
    fn close_notify(&mut self) -> Result<()>;

    /// Negotiated cipher suite, once known.
    fn cipher_suite(&self) -> Option<u16>;

    /// Export the current sequence counters.
    fn sequence(&self) -> Result<SequenceState>;

    /// Overwrite the sequence counters.
    fn set_sequence(&mut self, state: SequenceState) -> Result<()>;

    /// Mutable access to the byte stream.
    fn stream_mut(&mut self) -> &mut S;

    /// Mutable access to the randomness source.
    fn entropy_mut(&mut self) -> &mut R;

    /// Tear the engine down, returning its stream and randomness source.
    fn into_parts(self) -> (S, R);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps() -> EngineCapabilities {
        EngineCapabilities {
            sequence_layout_version: SEQUENCE_LAYOUT_VERSION,
            counter_width: 8,
            exports_sequence: true,
            imports_sequence: true,
        }
    }

    #[test]
    fn test_sequence_state_is_big_endian() {
        let state = SequenceState::from_counters(1, 0x0102);
        assert_eq!(state.inbound, [0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(state.outbound, [0, 0, 0, 0, 0, 0, 1, 2]);
        assert_eq!(state.inbound_counter(), 1);
        assert_eq!(state.outbound_counter(), 0x0102);
    }

    #[test]
    fn test_capability_check() {
        assert!(caps().check(true).is_ok());

        let narrow = EngineCapabilities {
            counter_width: 4,
            ..caps()
        };
        assert!(matches!(narrow.check(false), Err(Error::Incompatible(_))));

        let future = EngineCapabilities {
            sequence_layout_version: 2,
            ..caps()
        };
        assert!(future.check(false).is_err());

        let export_only = EngineCapabilities {
            imports_sequence: false,
            ..caps()
        };
        assert!(export_only.check(false).is_ok());
        assert!(export_only.check(true).is_err());
    }
}
