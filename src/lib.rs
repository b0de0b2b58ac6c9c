//! Draft-era TLS 1.3 secure transport.
//!
//! The core of this crate is the handshake state machine and the
//! record/handshake framing that feeds it: protocol messages and their
//! wire codecs, the HKDF key schedule with transcript hashing, and a
//! record layer whose encryption parameters change mid-stream at each
//! rekey. [`Connection`] wraps it all behind a byte-stream API gated
//! on handshake completion.
//!
//! ```no_run
//! use std::net::TcpStream;
//! use draftls::{Config, Connection};
//!
//! # fn main() -> draftls::Result<()> {
//! let stream = TcpStream::connect("example.com:4433").map_err(draftls::Error::from)?;
//! let conn = Connection::client(stream, Config::client("example.com"));
//! conn.write(b"ping")?;
//! let mut buf = [0u8; 128];
//! let n = conn.read(&mut buf)?;
//! # let _ = n;
//! # Ok(())
//! # }
//! ```
//!
//! Out of scope by design: session resumption, 0-RTT, PSKs,
//! renegotiation, TLS ≤ 1.2, and client certificates. The transport
//! underneath, the PKI trust decision, and configuration loading are
//! collaborators behind narrow seams ([`Transport`], the auth
//! callback, [`Config`]).

#![forbid(unsafe_code)]

pub mod config;
pub mod connection;
pub mod crypto;
pub mod error;
pub mod tls;
pub mod transport;

pub use config::{AuthCallback, Config, ServerCredential};
pub use connection::{Connection, Role};
pub use crypto::sign::SigningKey;
pub use crypto::{
    CipherSuite, HashAlgorithm, NamedGroup, SignatureAlgorithm, SignatureAndHash,
};
pub use error::{Error, Result};
pub use transport::{pipe, Pipe, Transport};
