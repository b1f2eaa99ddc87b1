//! # tlsfork
//!
//! Fork an established secure-channel session onto a new session object
//! without a new handshake on the wire.
//!
//! A fresh session records every byte its engine reads from the transport
//! and every byte it draws from its randomness source during the
//! handshake. A [`Snapshot`] pairs those recordings with the negotiated
//! cipher suite and the current record sequence counters. Building a
//! session from a snapshot replays the handshake locally against the
//! recordings (writes are dropped, since the peer already saw them), then
//! restores the counters so that subsequent records continue the original
//! numbering.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │           Session (fresh / established / failed)        │
//! ├─────────────────────────────────────────────────────────┤
//! │   ReplayStream (transport)   │   ReplayRng (randomness) │
//! ├─────────────────────────────────────────────────────────┤
//! │   TlsEngine (RecordEngine built in: X25519 + AEAD)     │
//! ├─────────────────────────────────────────────────────────┤
//! │   Transport (TcpStream, &TcpStream, PipeEnd, ...)      │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::net::TcpStream;
//! use tlsfork::{EngineConfig, RecordSession};
//!
//! # fn main() -> tlsfork::Result<()> {
//! let stream = TcpStream::connect("127.0.0.1:4433")?;
//! let config = EngineConfig::default();
//!
//! let mut session = RecordSession::client(&stream, &config, None)?;
//! session.handshake()?;
//! session.write(b"Hello")?;
//!
//! let snapshot = session.snapshot()?;
//! let mut forked = RecordSession::client(&stream, &config, Some(&snapshot))?;
//! forked.write(b"Hello")?;
//! # Ok(())
//! # }
//! ```
//!
//! Sessions are synchronous and take no locks; drive each from one thread
//! at a time.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod replay;
pub mod transport;

pub use config::ReplayConfig;
pub use engine::{EngineConfig, RecordEngine, Role, SequenceState, TlsEngine};
pub use error::{Error, Result};
pub use replay::{RecordSession, Session, SessionState, Snapshot};
pub use transport::Transport;

/// Default bound on handshake replay attempts
pub const MAX_REPLAY_ATTEMPTS: u32 = 20;

/// Width of each record sequence counter in bytes
pub const SEQUENCE_WIDTH: usize = 8;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(ReplayConfig::default().max_attempts, MAX_REPLAY_ATTEMPTS);
        assert_eq!(SequenceState::default().inbound.len(), SEQUENCE_WIDTH);
    }
}
