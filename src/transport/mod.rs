//! Byte-stream transports.
//!
//! A session runs over anything that offers blocking `Read`/`Write` and can
//! be released. Because a forked session continues on the *same*
//! connection as the session it was forked from, transports are usually
//! shared: pass `&TcpStream` (which is `Read + Write`) or a clone of a
//! [`PipeEnd`] to each session.
//!
//! Timeouts and cancellation belong to the transport (socket read/write
//! timeouts, [`PipeEnd::set_read_timeout`]); sessions add none of their own.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};

mod pipe;

pub use pipe::{pipe, PipeEnd};

/// A blocking byte stream that a session can release.
pub trait Transport: Read + Write {
    /// Release the underlying connection.
    fn close(&mut self) -> io::Result<()>;
}

impl Transport for TcpStream {
    fn close(&mut self) -> io::Result<()> {
        self.shutdown(Shutdown::Both)
    }
}

impl Transport for &TcpStream {
    fn close(&mut self) -> io::Result<()> {
        self.shutdown(Shutdown::Both)
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_shared_tcp_stream_close() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (mut server, _) = listener.accept().unwrap();

        let mut shared = &client;
        shared.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        Transport::close(&mut shared).unwrap();
        assert_eq!(server.read(&mut buf).unwrap(), 0);
    }
}
