//! Recording/replaying randomness proxy.

use std::convert::Infallible;

use bytes::{Buf, Bytes, BytesMut};
use rand_core::{impls, CryptoRng, RngCore};
use tracing::debug;

use crate::crypto::random::is_probe;

enum Mode {
    Recording(BytesMut),
    Replaying { replay: Bytes, live: usize },
    Disarmed,
}

/// A randomness source that records or replays what the engine draws.
///
/// Probe reads (a single byte, see [`crate::crypto::random`]) always go to
/// the live source and are neither recorded nor served from a recording,
/// so their occasional presence does not shift the replayed stream.
pub struct ReplayRng<R> {
    inner: R,
    mode: Mode,
}

impl<R> ReplayRng<R> {
    /// Start recording draws from `inner`.
    pub fn recording(inner: R) -> Self {
        Self {
            inner,
            mode: Mode::Recording(BytesMut::new()),
        }
    }

    /// Serve draws from `recorded`, then from `inner`.
    pub fn replaying(inner: R, recorded: Bytes) -> Self {
        Self {
            inner,
            mode: Mode::Replaying {
                replay: recorded,
                live: 0,
            },
        }
    }

    /// Whether the proxy is still recording or replaying.
    pub fn is_armed(&self) -> bool {
        !matches!(self.mode, Mode::Disarmed)
    }

    /// Bytes captured so far (recording) or still queued (replaying).
    pub fn buffered(&self) -> usize {
        match &self.mode {
            Mode::Recording(buf) => buf.len(),
            Mode::Replaying { replay, .. } => replay.len(),
            Mode::Disarmed => 0,
        }
    }

    /// Switch to pass-through.
    ///
    /// Returns the captured bytes when recording, or the recorded bytes
    /// that were never consumed when replaying.
    pub fn disarm(&mut self) -> Bytes {
        match std::mem::replace(&mut self.mode, Mode::Disarmed) {
            Mode::Recording(buf) => buf.freeze(),
            Mode::Replaying { replay, live } => {
                debug!(live, unconsumed = replay.len(), "randomness replay disarmed");
                replay
            }
            Mode::Disarmed => Bytes::new(),
        }
    }

    /// Unwrap the inner source.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: RngCore> RngCore for ReplayRng<R> {
    fn next_u32(&mut self) -> u32 {
        impls::next_u32_via_fill(self)
    }

    fn next_u64(&mut self) -> u64 {
        impls::next_u64_via_fill(self)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        let filled = self.draw(dest, |rng, buf| {
            rng.fill_bytes(buf);
            Ok::<(), Infallible>(())
        });
        match filled {
            Ok(()) => {}
            Err(never) => match never {},
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.draw(dest, |rng, buf| rng.try_fill_bytes(buf))
    }
}

impl<R: RngCore> ReplayRng<R> {
    /// Serve `dest`, using `fill` for every byte that comes from the live
    /// source. Nothing is recorded if `fill` fails.
    fn draw<E>(
        &mut self,
        dest: &mut [u8],
        mut fill: impl FnMut(&mut R, &mut [u8]) -> Result<(), E>,
    ) -> Result<(), E> {
        if is_probe(dest.len()) {
            return fill(&mut self.inner, dest);
        }
        match &mut self.mode {
            Mode::Recording(capture) => {
                fill(&mut self.inner, dest)?;
                capture.extend_from_slice(dest);
            }
            Mode::Replaying { replay, live } => {
                let n = dest.len().min(replay.len());
                dest[..n].copy_from_slice(&replay[..n]);
                replay.advance(n);
                if n < dest.len() {
                    *live += dest.len() - n;
                    fill(&mut self.inner, &mut dest[n..])?;
                }
            }
            Mode::Disarmed => fill(&mut self.inner, dest)?,
        }
        Ok(())
    }
}

impl<R: CryptoRng> CryptoRng for ReplayRng<R> {}
