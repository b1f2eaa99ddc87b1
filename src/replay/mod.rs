//! Handshake recording and replay.
//!
//! - [`ReplayStream`] and [`ReplayRng`] sit between the engine and its
//!   transport and randomness source, capturing what it consumes during a
//!   fresh handshake or feeding the capture back during a replay.
//! - [`Snapshot`] is the frozen capture plus sequence counters.
//! - [`Session`] orchestrates both and is the public entry point.

mod entropy;
mod session;
mod snapshot;
mod stream;

pub use entropy::ReplayRng;
pub use session::{RecordSession, Session, SessionState};
pub use snapshot::Snapshot;
pub use stream::ReplayStream;
