//! Recording/replaying byte-stream proxy.

use std::io::{self, Read, Write};

use bytes::{Buf, Bytes, BytesMut};
use tracing::debug;

enum Mode {
    /// Reads pass through and are appended to the capture.
    Recording(BytesMut),
    /// Reads drain the recorded bytes first, writes are swallowed.
    Replaying { replay: Bytes, suppressed: u64 },
    /// Transparent.
    Disarmed,
}

/// A transport wrapper that records or replays what the engine reads.
///
/// While recording, every byte read from the inner stream is captured.
/// While replaying, reads are served from the captured bytes until they are
/// exhausted and then fall through to the inner stream; writes are
/// reported as successful without reaching the inner stream, since the
/// peer already received them during the recorded handshake. Once
/// disarmed, the proxy is transparent.
pub struct ReplayStream<T> {
    inner: T,
    mode: Mode,
}

impl<T> ReplayStream<T> {
    /// Start recording reads from `inner`.
    pub fn recording(inner: T) -> Self {
        Self {
            inner,
            mode: Mode::Recording(BytesMut::new()),
        }
    }

    /// Replay `recorded` in place of reads from `inner`.
    pub fn replaying(inner: T, recorded: Bytes) -> Self {
        Self {
            inner,
            mode: Mode::Replaying {
                replay: recorded,
                suppressed: 0,
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

    /// Bytes written and dropped while replaying.
    pub fn suppressed(&self) -> u64 {
        match &self.mode {
            Mode::Replaying { suppressed, .. } => *suppressed,
            _ => 0,
        }
    }

    /// Switch to pass-through.
    ///
    /// Returns the captured bytes when recording, or the recorded bytes
    /// that were never consumed when replaying.
    pub fn disarm(&mut self) -> Bytes {
        match std::mem::replace(&mut self.mode, Mode::Disarmed) {
            Mode::Recording(buf) => buf.freeze(),
            Mode::Replaying { replay, suppressed } => {
                debug!(suppressed, unconsumed = replay.len(), "transport replay disarmed");
                replay
            }
            Mode::Disarmed => Bytes::new(),
        }
    }

    /// Get a reference to the inner stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Get a mutable reference to the inner stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Unwrap the inner stream, discarding any capture.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read> Read for ReplayStream<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.mode {
            Mode::Recording(capture) => {
                let n = self.inner.read(buf)?;
                capture.extend_from_slice(&buf[..n]);
                Ok(n)
            }
            Mode::Replaying { replay, .. } if !replay.is_empty() => {
                let n = buf.len().min(replay.len());
                buf[..n].copy_from_slice(&replay[..n]);
                replay.advance(n);
                Ok(n)
            }
            _ => self.inner.read(buf),
        }
    }
}

impl<T: Write> Write for ReplayStream<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.mode {
            Mode::Replaying { suppressed, .. } => {
                *suppressed += buf.len() as u64;
                Ok(buf.len())
            }
            _ => self.inner.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.mode {
            Mode::Replaying { .. } => Ok(()),
            _ => self.inner.flush(),
        }
    }
}
