//! In-memory duplex transport.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::transport::Transport;

#[derive(Default)]
struct ChannelState {
    buf: VecDeque<u8>,
    closed: bool,
}

/// One direction of a pipe.
#[derive(Default)]
struct Channel {
    state: Mutex<ChannelState>,
    readable: Condvar,
    written: AtomicU64,
}

impl Channel {
    fn close(&self) {
        self.state.lock().closed = true;
        self.readable.notify_all();
    }
}

/// One end of an in-memory duplex byte stream.
///
/// Clones refer to the same end, which lets two sessions share a pipe the
/// way they would share a socket.
#[derive(Clone)]
pub struct PipeEnd {
    incoming: Arc<Channel>,
    outgoing: Arc<Channel>,
    read_timeout: Option<Duration>,
}

/// Create a connected pair of pipe ends.
pub fn pipe() -> (PipeEnd, PipeEnd) {
    let a_to_b = Arc::new(Channel::default());
    let b_to_a = Arc::new(Channel::default());
    (
        PipeEnd {
            incoming: Arc::clone(&b_to_a),
            outgoing: Arc::clone(&a_to_b),
            read_timeout: None,
        },
        PipeEnd {
            incoming: a_to_b,
            outgoing: b_to_a,
            read_timeout: None,
        },
    )
}

impl PipeEnd {
    /// Bound how long a read blocks waiting for data. `None` waits forever.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.read_timeout = timeout;
    }

    /// Total bytes written through this end (across all clones).
    pub fn bytes_written(&self) -> u64 {
        self.outgoing.written.load(Ordering::Relaxed)
    }

    /// Bytes written by the peer and not yet read.
    pub fn pending(&self) -> usize {
        self.incoming.state.lock().buf.len()
    }
}

impl Read for PipeEnd {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut state = self.incoming.state.lock();
        while state.buf.is_empty() && !state.closed {
            match self.read_timeout {
                Some(timeout) => {
                    if self.incoming.readable.wait_for(&mut state, timeout).timed_out()
                        && state.buf.is_empty()
                    {
                        return Err(io::Error::new(io::ErrorKind::TimedOut, "pipe read timed out"));
                    }
                }
                None => self.incoming.readable.wait(&mut state),
            }
        }

        let n = buf.len().min(state.buf.len());
        for (dst, src) in buf.iter_mut().zip(state.buf.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }
}

impl Write for PipeEnd {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.outgoing.state.lock();
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"));
        }
        state.buf.extend(buf);
        drop(state);
        self.outgoing.written.fetch_add(buf.len() as u64, Ordering::Relaxed);
        self.outgoing.readable.notify_all();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for PipeEnd {
    fn close(&mut self) -> io::Result<()> {
        self.incoming.close();
        self.outgoing.close();
        Ok(())
    }
}
