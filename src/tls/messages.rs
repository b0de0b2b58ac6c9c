//! Handshake message bodies and their wire codecs.
//!
//! Handshake message format: type(1) ‖ length(3) ‖ body. A parsed
//! [`HandshakeMessage`] keeps the raw body bytes so the transcript can
//! hash exactly what travelled on the wire; `encoded()` reproduces the
//! original serialisation byte for byte.

use crate::crypto::CipherSuite;
use crate::error::{Error, Result};
use crate::tls::codec::{put_u16, put_u24, put_u8, put_vec16, put_vec24, put_vec8, Reader};
use crate::tls::extensions::ExtensionSet;

/// Legacy protocol version written into Hello bodies.
pub const LEGACY_VERSION: u16 = 0x0303;

/// Handshake message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandshakeType {
    ClientHello = 1,
    ServerHello = 2,
    EncryptedExtensions = 8,
    Certificate = 11,
    CertificateVerify = 15,
    Finished = 20,
}

impl HandshakeType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::ClientHello),
            2 => Some(Self::ServerHello),
            8 => Some(Self::EncryptedExtensions),
            11 => Some(Self::Certificate),
            15 => Some(Self::CertificateVerify),
            20 => Some(Self::Finished),
            _ => None,
        }
    }
}

/// A handshake body that knows its message type and codec.
pub trait HandshakeBody: Sized {
    const MSG_TYPE: HandshakeType;
    fn encode(&self) -> Result<Vec<u8>>;
    fn decode(body: &[u8]) -> Result<Self>;
}

/// One whole handshake message: type plus raw body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeMessage {
    pub msg_type: HandshakeType,
    pub body: Vec<u8>,
}

impl HandshakeMessage {
    /// Serialise a body into a message.
    pub fn from_body<B: HandshakeBody>(body: &B) -> Result<Self> {
        let body = body.encode()?;
        if body.len() >= 1 << 24 {
            return Err(Error::Internal("handshake body too large"));
        }
        Ok(Self {
            msg_type: B::MSG_TYPE,
            body,
        })
    }

    /// The exact wire form: type ‖ len24 ‖ body. This is what the
    /// transcript hashes.
    pub fn encoded(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.body.len());
        put_u8(&mut out, self.msg_type as u8);
        // length was bounds-checked at construction
        let _ = put_u24(&mut out, self.body.len());
        out.extend_from_slice(&self.body);
        out
    }

    /// Parse the body, asserting the message type.
    pub fn parse<B: HandshakeBody>(&self) -> Result<B> {
        if self.msg_type != B::MSG_TYPE {
            return Err(Error::UnexpectedMessage("handshake message type"));
        }
        B::decode(&self.body)
    }
}

// ---- ClientHello ----

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHelloBody {
    pub random: [u8; 32],
    pub legacy_session_id: Vec<u8>,
    pub cipher_suites: Vec<CipherSuite>,
    pub extensions: ExtensionSet,
}

impl HandshakeBody for ClientHelloBody {
    const MSG_TYPE: HandshakeType = HandshakeType::ClientHello;

    fn encode(&self) -> Result<Vec<u8>> {
        if self.legacy_session_id.len() > 32 {
            return Err(Error::Internal("session id too long"));
        }
        let mut out = Vec::new();
        put_u16(&mut out, LEGACY_VERSION);
        out.extend_from_slice(&self.random);
        put_vec8(&mut out, &self.legacy_session_id)?;
        let mut suites = Vec::with_capacity(self.cipher_suites.len() * 2);
        for suite in &self.cipher_suites {
            put_u16(&mut suites, suite.to_u16());
        }
        put_vec16(&mut out, &suites)?;
        // compression_methods = [null]
        put_u8(&mut out, 1);
        put_u8(&mut out, 0);
        self.extensions.encode_to(&mut out)?;
        Ok(out)
    }

    fn decode(body: &[u8]) -> Result<Self> {
        let mut r = Reader::new(body);
        let _version = r.u16("client hello version")?;
        let random: [u8; 32] = r
            .take(32, "client hello random")?
            .try_into()
            .map_err(|_| Error::Decode("client hello random"))?;
        let session_id = r.vec8("client hello session id")?;
        if session_id.len() > 32 {
            return Err(Error::Decode("client hello session id"));
        }
        let suites_raw = r.vec16("client hello cipher suites")?;
        if suites_raw.len() % 2 != 0 {
            return Err(Error::Decode("client hello cipher suites"));
        }
        // Unknown code points are skipped, not rejected.
        let cipher_suites = suites_raw
            .chunks_exact(2)
            .filter_map(|c| CipherSuite::from_u16(u16::from_be_bytes([c[0], c[1]])))
            .collect();
        let compression = r.vec8("client hello compression methods")?;
        if compression.is_empty() {
            return Err(Error::Decode("client hello compression methods"));
        }
        let extensions = ExtensionSet::decode(&mut r)?;
        r.expect_end("client hello")?;
        Ok(Self {
            random,
            legacy_session_id: session_id.to_vec(),
            cipher_suites,
            extensions,
        })
    }
}

// ---- ServerHello ----

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHelloBody {
    pub random: [u8; 32],
    pub legacy_session_id: Vec<u8>,
    pub cipher_suite: CipherSuite,
    pub extensions: ExtensionSet,
}

impl HandshakeBody for ServerHelloBody {
    const MSG_TYPE: HandshakeType = HandshakeType::ServerHello;

    fn encode(&self) -> Result<Vec<u8>> {
        if self.legacy_session_id.len() > 32 {
            return Err(Error::Internal("session id too long"));
        }
        let mut out = Vec::new();
        put_u16(&mut out, LEGACY_VERSION);
        out.extend_from_slice(&self.random);
        put_vec8(&mut out, &self.legacy_session_id)?;
        put_u16(&mut out, self.cipher_suite.to_u16());
        put_u8(&mut out, 0); // compression_method = null
        self.extensions.encode_to(&mut out)?;
        Ok(out)
    }

    fn decode(body: &[u8]) -> Result<Self> {
        let mut r = Reader::new(body);
        let _version = r.u16("server hello version")?;
        let random: [u8; 32] = r
            .take(32, "server hello random")?
            .try_into()
            .map_err(|_| Error::Decode("server hello random"))?;
        let session_id = r.vec8("server hello session id")?;
        if session_id.len() > 32 {
            return Err(Error::Decode("server hello session id"));
        }
        let suite = r.u16("server hello cipher suite")?;
        let cipher_suite =
            CipherSuite::from_u16(suite).ok_or(Error::Decode("server hello cipher suite"))?;
        let _compression = r.u8("server hello compression method")?;
        let extensions = ExtensionSet::decode(&mut r)?;
        r.expect_end("server hello")?;
        Ok(Self {
            random,
            legacy_session_id: session_id.to_vec(),
            cipher_suite,
            extensions,
        })
    }
}

// ---- EncryptedExtensions ----

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncryptedExtensionsBody {
    pub extensions: ExtensionSet,
}

impl HandshakeBody for EncryptedExtensionsBody {
    const MSG_TYPE: HandshakeType = HandshakeType::EncryptedExtensions;

    fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.extensions.encode_to(&mut out)?;
        Ok(out)
    }

    fn decode(body: &[u8]) -> Result<Self> {
        let mut r = Reader::new(body);
        let extensions = ExtensionSet::decode(&mut r)?;
        r.expect_end("encrypted extensions")?;
        Ok(Self { extensions })
    }
}

// ---- Certificate ----

/// One entry in the certificate_list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateEntry {
    /// DER-encoded certificate.
    pub cert_data: Vec<u8>,
    /// Per-certificate extensions, carried opaquely.
    pub extensions: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateBody {
    pub context: Vec<u8>,
    pub certificate_list: Vec<CertificateEntry>,
}

impl CertificateBody {
    /// The leaf certificate, if any.
    pub fn leaf(&self) -> Option<&[u8]> {
        self.certificate_list.first().map(|e| e.cert_data.as_slice())
    }

    /// The chain as owned DER blobs, leaf first.
    pub fn chain(&self) -> Vec<Vec<u8>> {
        self.certificate_list
            .iter()
            .map(|e| e.cert_data.clone())
            .collect()
    }
}

impl HandshakeBody for CertificateBody {
    const MSG_TYPE: HandshakeType = HandshakeType::Certificate;

    fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        put_vec8(&mut out, &self.context)?;
        let mut list = Vec::new();
        for entry in &self.certificate_list {
            put_vec24(&mut list, &entry.cert_data)?;
            put_vec16(&mut list, &entry.extensions)?;
        }
        put_vec24(&mut out, &list)?;
        Ok(out)
    }

    fn decode(body: &[u8]) -> Result<Self> {
        let mut r = Reader::new(body);
        let context = r.vec8("certificate context")?.to_vec();
        let list = r.vec24("certificate list")?;
        r.expect_end("certificate")?;
        let mut lr = Reader::new(list);
        let mut certificate_list = Vec::new();
        while !lr.is_empty() {
            let cert_data = lr.vec24("certificate entry")?.to_vec();
            let extensions = lr.vec16("certificate entry extensions")?.to_vec();
            certificate_list.push(CertificateEntry {
                cert_data,
                extensions,
            });
        }
        Ok(Self {
            context,
            certificate_list,
        })
    }
}

// ---- CertificateVerify ----

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateVerifyBody {
    pub algorithm: crate::crypto::SignatureAndHash,
    pub signature: Vec<u8>,
}

impl HandshakeBody for CertificateVerifyBody {
    const MSG_TYPE: HandshakeType = HandshakeType::CertificateVerify;

    fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        put_u8(&mut out, self.algorithm.hash.to_u8());
        put_u8(&mut out, self.algorithm.signature.to_u8());
        put_vec16(&mut out, &self.signature)?;
        Ok(out)
    }

    fn decode(body: &[u8]) -> Result<Self> {
        use crate::crypto::{HashAlgorithm, SignatureAlgorithm, SignatureAndHash};
        let mut r = Reader::new(body);
        let hash = HashAlgorithm::from_u8(r.u8("certificate verify hash")?)
            .ok_or(Error::Decode("certificate verify hash"))?;
        let signature_alg = SignatureAlgorithm::from_u8(r.u8("certificate verify signature")?)
            .ok_or(Error::Decode("certificate verify signature"))?;
        let signature = r.vec16("certificate verify signature")?.to_vec();
        r.expect_end("certificate verify")?;
        Ok(Self {
            algorithm: SignatureAndHash {
                hash,
                signature: signature_alg,
            },
            signature,
        })
    }
}

// ---- Finished ----

/// Opaque verify_data of hash length. Length validation happens in the
/// driver, which knows the negotiated hash.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinishedBody {
    pub verify_data: Vec<u8>,
}

impl HandshakeBody for FinishedBody {
    const MSG_TYPE: HandshakeType = HandshakeType::Finished;

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(self.verify_data.clone())
    }

    fn decode(body: &[u8]) -> Result<Self> {
        if body.is_empty() {
            return Err(Error::Decode("finished"));
        }
        Ok(Self {
            verify_data: body.to_vec(),
        })
    }
}
