//! Randomness helpers.
//!
//! Real TLS engines sometimes draw a single throwaway byte from their
//! randomness source during key derivation, so that callers cannot rely on
//! the source being consumed deterministically. The built-in engine does
//! the same; the session's randomness proxy recognises these reads by their
//! length and keeps them out of recordings.

use rand::Rng;
use rand_core::RngCore;

/// Length of a probe read.
pub const PROBE_LEN: usize = 1;

/// Whether a read of `len` bytes is a probe read.
pub fn is_probe(len: usize) -> bool {
    len == PROBE_LEN
}

/// Draw a single byte from `rng` roughly half of the time.
///
/// The coin is flipped with the thread-local generator, never with `rng`
/// itself.
pub fn maybe_read_byte<R: RngCore + ?Sized>(rng: &mut R) -> bool {
    if rand::thread_rng().gen::<bool>() {
        let mut probe = [0u8; PROBE_LEN];
        rng.fill_bytes(&mut probe);
        true
    } else {
        false
    }
}
