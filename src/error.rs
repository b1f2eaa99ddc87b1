//! Error types for forkable sessions.

use std::io;

use thiserror::Error;

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while establishing, forking or using a session.
#[derive(Error, Debug)]
pub enum Error {
    /// Cryptographic operation failed
    #[error("cryptographic error: {0}")]
    Crypto(String),

    /// Handshake protocol error
    #[error("handshake error: {0}")]
    Handshake(String),

    /// Invalid record or handshake message
    #[error("invalid message format: {0}")]
    InvalidMessage(String),

    /// Transport I/O error
    #[error("network error: {0}")]
    Network(#[from] io::Error),

    /// Operation requires an established session
    #[error("session not ready: {0}")]
    NotReady(&'static str),

    /// The session handshake failed earlier and the session is unusable
    #[error("session handshake failed")]
    Failed,

    /// The session has been closed
    #[error("session closed")]
    Closed,

    /// The engine does not offer the sequence-state access forking needs
    #[error("incompatible engine: {0}")]
    Incompatible(String),

    /// Replayed handshake negotiated a different cipher suite
    #[error("cipher suite mismatch: snapshot has {expected:#06x}, replay negotiated {actual:#06x}")]
    CipherSuiteMismatch {
        /// Suite recorded in the snapshot
        expected: u16,
        /// Suite the replay negotiated (0 if none)
        actual: u16,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Buffer overflow/underflow
    #[error("buffer error: expected {expected} bytes, got {actual}")]
    Buffer {
        /// Expected size
        expected: usize,
        /// Actual size
        actual: usize,
    },
}

impl Error {
    /// Create a new cryptographic error
    pub fn crypto(msg: impl Into<String>) -> Self {
        Error::Crypto(msg.into())
    }

    /// Create a new handshake error
    pub fn handshake(msg: impl Into<String>) -> Self {
        Error::Handshake(msg.into())
    }

    /// Create a new message format error
    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidMessage(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Check whether a fresh replay attempt may cure this error.
    ///
    /// A replay that diverges from the recording shows up as a handshake,
    /// decryption or parse failure. Transport and compatibility errors will
    /// not go away by rebuilding the engine.
    pub fn is_replay_desync(&self) -> bool {
        matches!(
            self,
            Error::Handshake(_)
                | Error::Crypto(_)
                | Error::InvalidMessage(_)
                | Error::Buffer { .. }
                | Error::CipherSuiteMismatch { .. }
        )
    }

    /// Check if this error is a precondition violation by the caller
    pub fn is_precondition(&self) -> bool {
        matches!(self, Error::NotReady(_) | Error::Failed | Error::Closed)
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Network(e) => e,
            Error::NotReady(_) => io::Error::new(io::ErrorKind::NotConnected, err),
            Error::Closed => io::Error::new(io::ErrorKind::BrokenPipe, err),
            Error::InvalidMessage(_) | Error::Crypto(_) | Error::Buffer { .. } => {
                io::Error::new(io::ErrorKind::InvalidData, err)
            }
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}
