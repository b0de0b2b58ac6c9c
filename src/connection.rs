//! The connection façade: a byte-stream API gated on handshake
//! completion.
//!
//! Locking mirrors the three-lock design of the protocol: one lock per
//! record-layer direction (held for a whole `read` or `write`, and for
//! that half of the handshake) and one for the handshake state (held
//! for the entire handshake and for close_notify emission). The
//! handshake acquires inbound before outbound; readers and writers
//! take only their own direction, so the ordering is deadlock-free.

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::debug;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::tls::alert::{Alert, AlertDescription, AlertLevel};
use crate::tls::key_schedule::CryptoContext;
use crate::tls::record::{ContentType, RecordLayer, MAX_FRAGMENT_LEN};
use crate::tls::{client, server};
use crate::transport::Transport;

/// Which side of the handshake this connection drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

struct HandshakeState {
    complete: bool,
    error: Option<Error>,
    context: Option<CryptoContext>,
}

/// Inbound direction state: what `read` sees after decryption.
enum StreamState {
    Open,
    /// Peer sent close_notify; reads return EOF.
    Eof,
    /// Sticky failure; every later read returns the same error.
    Failed(Error),
}

struct InboundHalf<T: Transport> {
    records: RecordLayer<T>,
    buffer: Vec<u8>,
    state: StreamState,
}

struct OutboundHalf<T: Transport> {
    records: RecordLayer<T>,
    /// A failed write poisons the direction; state on the wire is
    /// indeterminate.
    error: Option<Error>,
}

/// A TLS connection over some byte-stream transport.
///
/// `read`, `write`, and `close` may be called from different threads;
/// the first I/O call (or an explicit [`Connection::handshake`]) runs
/// the handshake. The handshake is one-shot: success never reruns it,
/// and failure is stored and re-raised by every subsequent operation.
pub struct Connection<T: Transport> {
    transport: Arc<T>,
    role: Role,
    config: Arc<Config>,
    handshake: Mutex<HandshakeState>,
    inbound: Mutex<InboundHalf<T>>,
    outbound: Mutex<OutboundHalf<T>>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| Error::Internal("poisoned lock"))
}

impl<T: Transport> Connection<T> {
    /// Wrap a transport as the client side of a connection.
    pub fn client(transport: T, config: Config) -> Self {
        Self::new(transport, config, Role::Client)
    }

    /// Wrap a transport as the server side of a connection.
    pub fn server(transport: T, config: Config) -> Self {
        Self::new(transport, config, Role::Server)
    }

    fn new(transport: T, config: Config, role: Role) -> Self {
        let transport = Arc::new(transport);
        Self {
            role,
            config: Arc::new(config),
            handshake: Mutex::new(HandshakeState {
                complete: false,
                error: None,
                context: None,
            }),
            inbound: Mutex::new(InboundHalf {
                records: RecordLayer::new(transport.clone()),
                buffer: Vec::new(),
                state: StreamState::Open,
            }),
            outbound: Mutex::new(OutboundHalf {
                records: RecordLayer::new(transport.clone()),
                error: None,
            }),
            transport,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Run the handshake if it has not run yet. Idempotent: a
    /// completed handshake returns `Ok`, a failed one returns the
    /// stored error forever.
    pub fn handshake(&self) -> Result<()> {
        let mut hs = lock(&self.handshake)?;
        if let Some(e) = &hs.error {
            return Err(e.clone());
        }
        if hs.complete {
            return Ok(());
        }

        debug!("starting {:?} handshake", self.role);
        let mut inbound = lock(&self.inbound)?;
        let mut outbound = lock(&self.outbound)?;
        let result = match self.role {
            Role::Client => {
                client::client_handshake(&self.config, &mut inbound.records, &mut outbound.records)
            }
            Role::Server => {
                server::server_handshake(&self.config, &mut inbound.records, &mut outbound.records)
            }
        };
        match result {
            Ok(context) => {
                hs.complete = true;
                hs.context = Some(context);
                debug!("{:?} handshake complete", self.role);
                Ok(())
            }
            Err(error) => {
                debug!("{:?} handshake failed: {error}", self.role);
                // Best-effort alert; a failure to emit is suppressed.
                if let Some(description) = error.alert() {
                    let alert = Alert::fatal(description);
                    let _ = outbound.records.write_record(ContentType::Alert, &alert.encode());
                }
                hs.error = Some(error.clone());
                Err(error)
            }
        }
    }

    /// Read application data, running the handshake first if needed.
    /// Returns `Ok(0)` on orderly shutdown (peer close_notify) and at
    /// most `buf.len()` bytes otherwise.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.handshake()?;
        let mut inbound = lock(&self.inbound)?;
        loop {
            if !inbound.buffer.is_empty() {
                let n = buf.len().min(inbound.buffer.len());
                buf[..n].copy_from_slice(&inbound.buffer[..n]);
                inbound.buffer.drain(..n);
                return Ok(n);
            }
            match &inbound.state {
                StreamState::Eof => return Ok(0),
                StreamState::Failed(e) => return Err(e.clone()),
                StreamState::Open => {}
            }
            if buf.is_empty() {
                return Ok(0);
            }

            let record = match inbound.records.read_record() {
                Ok(record) => record,
                Err(e) => {
                    inbound.state = StreamState::Failed(e.clone());
                    return Err(e);
                }
            };
            match record.content_type {
                ContentType::ApplicationData => {
                    // A zero-length record is legal and yields nothing.
                    inbound.buffer.extend_from_slice(&record.fragment);
                }
                ContentType::Alert => match Self::disposition(&record.fragment) {
                    AlertDisposition::Eof => inbound.state = StreamState::Eof,
                    AlertDisposition::Dropped => {}
                    AlertDisposition::Fatal(e) => {
                        inbound.state = StreamState::Failed(e.clone());
                        return Err(e);
                    }
                },
                ContentType::Handshake => {
                    let e = Error::UnexpectedMessage("post-handshake handshake message");
                    inbound.state = StreamState::Failed(e.clone());
                    return Err(e);
                }
                ContentType::ChangeCipherSpec => {}
            }
        }
    }

    fn disposition(fragment: &[u8]) -> AlertDisposition {
        match Alert::decode(fragment) {
            Err(e) => AlertDisposition::Fatal(e),
            Ok(alert) => {
                if alert.description == AlertDescription::CloseNotify {
                    AlertDisposition::Eof
                } else if alert.level == AlertLevel::Warning {
                    // Peer warnings other than close_notify are dropped.
                    AlertDisposition::Dropped
                } else {
                    AlertDisposition::Fatal(Error::PeerAlert(alert.description))
                }
            }
        }
    }

    /// Write application data, running the handshake first if needed.
    /// The payload is fragmented into records of at most 2^14 bytes;
    /// the direction lock is held for the whole call, so concurrent
    /// writes never interleave fragments.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        self.handshake()?;
        let mut outbound = lock(&self.outbound)?;
        if let Some(e) = &outbound.error {
            return Err(e.clone());
        }
        let mut sent = 0;
        for chunk in buf.chunks(MAX_FRAGMENT_LEN) {
            if let Err(e) = outbound
                .records
                .write_record(ContentType::ApplicationData, chunk)
            {
                outbound.error = Some(e.clone());
                return Err(e);
            }
            sent += chunk.len();
        }
        Ok(sent)
    }

    /// Send close_notify (best effort) and close the transport.
    pub fn close(&self) -> Result<()> {
        {
            let _hs = lock(&self.handshake)?;
            if let Ok(mut outbound) = self.outbound.lock() {
                let alert = Alert::close_notify();
                let _ = outbound
                    .records
                    .write_record(ContentType::Alert, &alert.encode());
            }
        }
        self.transport.close().map_err(Error::from)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.transport.local_addr().map_err(Error::from)
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        self.transport.peer_addr().map_err(Error::from)
    }

    /// Set both direction timeouts on the transport.
    pub fn set_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.transport.set_timeout(timeout).map_err(Error::from)
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.transport.set_read_timeout(timeout).map_err(Error::from)
    }

    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.transport
            .set_write_timeout(timeout)
            .map_err(Error::from)
    }

    #[cfg(test)]
    pub(crate) fn context<R>(&self, f: impl FnOnce(Option<&CryptoContext>) -> R) -> R {
        let hs = self.handshake.lock().unwrap();
        f(hs.context.as_ref())
    }
}

enum AlertDisposition {
    Eof,
    Dropped,
    Fatal(Error),
}

impl<T: Transport> io::Read for &Connection<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Connection::read(*self, buf).map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

impl<T: Transport> io::Write for &Connection<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Connection::write(*self, buf).map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerCredential;
    use crate::crypto::sign::SigningKey;
    use crate::crypto::{HashAlgorithm, SignatureAlgorithm, SignatureAndHash};
    use crate::transport::{pipe, Pipe};
    use std::thread;

    fn credential() -> ServerCredential {
        ServerCredential::self_signed(
            "example.com",
            SignatureAndHash::new(HashAlgorithm::Sha256, SignatureAlgorithm::Ecdsa),
            SigningKey::generate(SignatureAlgorithm::Ecdsa).unwrap(),
        )
        .unwrap()
    }

    fn connected_pair() -> (Arc<Connection<Pipe>>, Arc<Connection<Pipe>>) {
        let (ct, st) = pipe();
        let client = Arc::new(Connection::client(ct, Config::client("example.com")));
        let server = Arc::new(Connection::server(st, Config::server(credential())));
        (client, server)
    }

    /// Drive both handshakes to completion on two threads.
    fn handshake_both(client: &Arc<Connection<Pipe>>, server: &Arc<Connection<Pipe>>) {
        let s = server.clone();
        let handle = thread::spawn(move || s.handshake());
        client.handshake().unwrap();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn handshake_is_idempotent() {
        let (client, server) = connected_pair();
        handshake_both(&client, &server);
        client.handshake().unwrap();
        server.handshake().unwrap();
    }

    #[test]
    fn application_keys_match_across_roles() {
        let (client, server) = connected_pair();
        handshake_both(&client, &server);

        let client_keys = client.context(|ctx| {
            let keys = ctx.unwrap().application_keys.as_ref().unwrap();
            (keys.client_write_key.clone(), keys.server_write_key.clone())
        });
        let server_keys = server.context(|ctx| {
            let keys = ctx.unwrap().application_keys.as_ref().unwrap();
            (keys.client_write_key.clone(), keys.server_write_key.clone())
        });
        assert_eq!(client_keys, server_keys);
        assert_ne!(client_keys.0, client_keys.1);
    }

    #[test]
    fn ping_pong() {
        let (client, server) = connected_pair();
        let s = server.clone();
        let handle = thread::spawn(move || {
            let mut buf = [0u8; 16];
            let n = s.read(&mut buf).unwrap();
            assert_eq!(&buf[..n], b"ping");
            s.write(b"pong").unwrap();
        });

        client.write(b"ping").unwrap();
        let mut buf = [0u8; 16];
        let n = client.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"pong");
        handle.join().unwrap();
    }

    #[test]
    fn read_returns_at_most_buf_len() {
        let (client, server) = connected_pair();
        let s = server.clone();
        let handle = thread::spawn(move || {
            s.write(b"abcdefgh").unwrap();
        });

        let mut buf = [0u8; 3];
        assert_eq!(client.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"abc");
        assert_eq!(client.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"def");
        assert_eq!(client.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"gh");
        handle.join().unwrap();
    }

    #[test]
    fn close_notify_reads_as_eof() {
        let (client, server) = connected_pair();
        handshake_both(&client, &server);

        client.close().unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(server.read(&mut buf).unwrap(), 0);
        // EOF is sticky.
        assert_eq!(server.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn large_transfer_fragments() {
        let (client, server) = connected_pair();
        let payload = vec![0x5A; 3 * MAX_FRAGMENT_LEN + 1234];
        let expected = payload.clone();
        let s = server.clone();
        let handle = thread::spawn(move || {
            let mut got = Vec::new();
            let mut buf = [0u8; 4096];
            while got.len() < expected.len() {
                let n = s.read(&mut buf).unwrap();
                assert!(n > 0);
                got.extend_from_slice(&buf[..n]);
            }
            assert_eq!(got, expected);
        });

        assert_eq!(client.write(&payload).unwrap(), payload.len());
        handle.join().unwrap();
    }

    #[test]
    fn handshake_failure_is_sticky() {
        let (ct, st) = pipe();
        let mut client_config = Config::client("example.com");
        client_config.groups = vec![crate::crypto::NamedGroup::P384];
        let mut server_config = Config::server(credential());
        server_config.groups = vec![crate::crypto::NamedGroup::P256];

        let client = Arc::new(Connection::client(ct, client_config));
        let server = Arc::new(Connection::server(st, server_config));

        let s = server.clone();
        let handle = thread::spawn(move || s.handshake());
        let first = client.handshake().unwrap_err();
        let server_err = handle.join().unwrap().unwrap_err();
        assert_eq!(
            server_err,
            Error::HandshakeFailure("no common key share group")
        );

        // Every subsequent operation re-raises the stored error.
        let mut buf = [0u8; 4];
        assert_eq!(client.read(&mut buf).unwrap_err(), first);
        assert_eq!(client.write(b"x").unwrap_err(), first);
        assert_eq!(
            server.write(b"x").unwrap_err(),
            Error::HandshakeFailure("no common key share group")
        );
    }

    #[test]
    fn client_sees_servers_alert() {
        let (ct, st) = pipe();
        let mut server_config = Config::server(credential());
        server_config.cipher_suites = vec![];
        let client = Arc::new(Connection::client(ct, Config::client("example.com")));
        let server = Arc::new(Connection::server(st, server_config));

        let s = server.clone();
        let handle = thread::spawn(move || s.handshake());
        let client_err = client.handshake().unwrap_err();
        let _ = handle.join().unwrap();
        assert_eq!(
            client_err,
            Error::PeerAlert(AlertDescription::HandshakeFailure)
        );
    }

    #[test]
    fn empty_read_buffer_returns_zero() {
        let (client, server) = connected_pair();
        handshake_both(&client, &server);
        let mut empty = [0u8; 0];
        assert_eq!(client.read(&mut empty).unwrap(), 0);
        drop(server);
    }

    #[test]
    fn addresses_forward_to_transport() {
        let (client, _server) = connected_pair();
        assert!(client.local_addr().unwrap().ip().is_loopback());
        assert!(client.peer_addr().unwrap().ip().is_loopback());
    }

    #[test]
    fn io_traits_compose() {
        use std::io::{Read, Write};
        let (client, server) = connected_pair();
        let s = server.clone();
        let handle = thread::spawn(move || {
            let mut buf = [0u8; 4];
            (&*s).read_exact(&mut buf).unwrap();
            assert_eq!(&buf, b"ping");
            (&*s).write_all(b"pong").unwrap();
        });

        (&*client).write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        (&*client).read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"pong");
        handle.join().unwrap();
    }
}
