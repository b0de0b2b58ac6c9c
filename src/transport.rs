//! The byte-stream transport underneath a connection.
//!
//! The core consumes a narrow contract: a reliable bidirectional octet
//! stream with addresses and per-direction timeouts. `TcpStream`
//! satisfies it directly; [`pipe`] provides an in-memory duplex pair
//! for loopback tests and embedding.

use std::collections::VecDeque;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpStream};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// A reliable bidirectional octet stream.
///
/// Methods take `&self` so both record-layer directions can share one
/// transport; implementations must be safe for one concurrent reader
/// plus one concurrent writer. Reads and writes may be short. A fired
/// timeout surfaces as the implementation's `io::Error`, unchanged.
pub trait Transport: Send + Sync {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;
    fn write(&self, buf: &[u8]) -> io::Result<usize>;
    /// Close both directions. Buffered peer data stays readable.
    fn close(&self) -> io::Result<()>;
    fn local_addr(&self) -> io::Result<SocketAddr>;
    fn peer_addr(&self) -> io::Result<SocketAddr>;
    /// Set both direction timeouts.
    fn set_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.set_read_timeout(timeout)?;
        self.set_write_timeout(timeout)
    }
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;
    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;
}

impl Transport for TcpStream {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut stream = self;
        io::Read::read(&mut stream, buf)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let mut stream = self;
        io::Write::write(&mut stream, buf)
    }

    fn close(&self) -> io::Result<()> {
        match self.shutdown(std::net::Shutdown::Both) {
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::local_addr(self)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::peer_addr(self)
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_write_timeout(self, timeout)
    }
}

// ---- In-memory duplex pipe ----

struct PipeBuf {
    data: VecDeque<u8>,
    closed: bool,
}

struct PipeShared {
    buf: Mutex<PipeBuf>,
    cond: Condvar,
}

impl PipeShared {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            buf: Mutex::new(PipeBuf {
                data: VecDeque::new(),
                closed: false,
            }),
            cond: Condvar::new(),
        })
    }

    fn close(&self) {
        if let Ok(mut buf) = self.buf.lock() {
            buf.closed = true;
        }
        self.cond.notify_all();
    }
}

/// One end of an in-memory duplex byte stream.
///
/// Writes never block (the buffer is unbounded); reads block until
/// data arrives, the peer closes, or the read timeout fires. Dropping
/// an end closes the stream in both directions.
pub struct Pipe {
    incoming: Arc<PipeShared>,
    outgoing: Arc<PipeShared>,
    read_timeout: Mutex<Option<Duration>>,
}

/// Create a connected pair of in-memory transports.
pub fn pipe() -> (Pipe, Pipe) {
    let a_to_b = PipeShared::new();
    let b_to_a = PipeShared::new();
    (
        Pipe {
            incoming: b_to_a.clone(),
            outgoing: a_to_b.clone(),
            read_timeout: Mutex::new(None),
        },
        Pipe {
            incoming: a_to_b,
            outgoing: b_to_a,
            read_timeout: Mutex::new(None),
        },
    )
}

const PIPE_ADDR: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);

fn poisoned() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "pipe lock poisoned")
}

impl Transport for Pipe {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let timeout = *self.read_timeout.lock().map_err(|_| poisoned())?;
        let mut state = self.incoming.buf.lock().map_err(|_| poisoned())?;
        loop {
            if !state.data.is_empty() {
                let n = buf.len().min(state.data.len());
                for slot in buf[..n].iter_mut() {
                    *slot = state.data.pop_front().unwrap_or_default();
                }
                return Ok(n);
            }
            if state.closed {
                return Ok(0);
            }
            state = match timeout {
                None => self.incoming.cond.wait(state).map_err(|_| poisoned())?,
                Some(d) => {
                    let (guard, result) = self
                        .incoming
                        .cond
                        .wait_timeout(state, d)
                        .map_err(|_| poisoned())?;
                    if result.timed_out() && guard.data.is_empty() && !guard.closed {
                        return Err(io::Error::new(io::ErrorKind::TimedOut, "read timeout"));
                    }
                    guard
                }
            };
        }
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.outgoing.buf.lock().map_err(|_| poisoned())?;
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"));
        }
        state.data.extend(buf.iter().copied());
        drop(state);
        self.outgoing.cond.notify_all();
        Ok(buf.len())
    }

    fn close(&self) -> io::Result<()> {
        self.incoming.close();
        self.outgoing.close();
        Ok(())
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(PIPE_ADDR)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        Ok(PIPE_ADDR)
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        *self.read_timeout.lock().map_err(|_| poisoned())? = timeout;
        Ok(())
    }

    fn set_write_timeout(&self, _timeout: Option<Duration>) -> io::Result<()> {
        // Writes never block on an unbounded buffer.
        Ok(())
    }
}

impl Drop for Pipe {
    fn drop(&mut self) {
        self.incoming.close();
        self.outgoing.close();
    }
}

#[cfg(test)]
impl Pipe {
    /// Test instrumentation: steal everything buffered for this end.
    pub(crate) fn drain(&self) -> Vec<u8> {
        let mut state = self.incoming.buf.lock().unwrap();
        state.data.drain(..).collect()
    }

    /// Test instrumentation: plant bytes as if the peer had sent them.
    pub(crate) fn inject(&self, bytes: &[u8]) {
        let mut state = self.incoming.buf.lock().unwrap();
        state.data.extend(bytes.iter().copied());
        drop(state);
        self.incoming.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn bytes_flow_both_ways() {
        let (a, b) = pipe();
        assert_eq!(a.write(b"hello").unwrap(), 5);
        let mut buf = [0u8; 16];
        assert_eq!(b.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"hello");

        b.write(b"yo").unwrap();
        assert_eq!(a.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"yo");
    }

    #[test]
    fn short_reads_respect_buffer() {
        let (a, b) = pipe();
        a.write(b"abcdef").unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(b.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(b.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
    }

    #[test]
    fn close_drains_then_eof() {
        let (a, b) = pipe();
        a.write(b"tail").unwrap();
        a.close().unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(b.read(&mut buf).unwrap(), 4);
        assert_eq!(b.read(&mut buf).unwrap(), 0);
        assert!(b.write(b"x").is_err());
    }

    #[test]
    fn drop_closes() {
        let (a, b) = pipe();
        drop(a);
        let mut buf = [0u8; 4];
        assert_eq!(b.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn read_blocks_until_write() {
        let (a, b) = pipe();
        let handle = thread::spawn(move || {
            let mut buf = [0u8; 8];
            let n = b.read(&mut buf).unwrap();
            buf[..n].to_vec()
        });
        thread::sleep(Duration::from_millis(20));
        a.write(b"wake").unwrap();
        assert_eq!(handle.join().unwrap(), b"wake");
    }

    #[test]
    fn read_timeout_fires() {
        let (_a, b) = pipe();
        b.set_read_timeout(Some(Duration::from_millis(30))).unwrap();
        let mut buf = [0u8; 4];
        let err = b.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn addresses_are_loopback() {
        let (a, _b) = pipe();
        assert!(a.local_addr().unwrap().ip().is_loopback());
        assert!(a.peer_addr().unwrap().ip().is_loopback());
    }
}
