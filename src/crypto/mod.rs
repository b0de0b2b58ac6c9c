//! Algorithm identifiers and suite parameters.
//!
//! The negotiable sets are closed: four ECDHE cipher suites, three NIST
//! groups, and RSA/ECDSA signatures paired with SHA-256/384/512. Each
//! cipher suite binds an AEAD key length, an IV length, and the hash
//! that drives the key schedule and transcript.

pub mod aead;
pub mod cert;
pub mod ecdh;
pub mod hkdf;
pub mod sign;

use crate::error::Error;

/// AEAD authentication tag length (AES-GCM).
pub const TAG_LEN: usize = 16;

/// Per-record IV length for every supported suite.
pub const IV_LEN: usize = 12;

/// Cipher suites this implementation negotiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherSuite {
    EcdheEcdsaAes128GcmSha256,
    EcdheRsaAes128GcmSha256,
    EcdheEcdsaAes256GcmSha384,
    EcdheRsaAes256GcmSha384,
}

impl CipherSuite {
    pub fn to_u16(self) -> u16 {
        match self {
            Self::EcdheEcdsaAes128GcmSha256 => 0xc02b,
            Self::EcdheRsaAes128GcmSha256 => 0xc02f,
            Self::EcdheEcdsaAes256GcmSha384 => 0xc02c,
            Self::EcdheRsaAes256GcmSha384 => 0xc030,
        }
    }

    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0xc02b => Some(Self::EcdheEcdsaAes128GcmSha256),
            0xc02f => Some(Self::EcdheRsaAes128GcmSha256),
            0xc02c => Some(Self::EcdheEcdsaAes256GcmSha384),
            0xc030 => Some(Self::EcdheRsaAes256GcmSha384),
            _ => None,
        }
    }

    /// The fixed parameters this suite binds.
    pub fn params(self) -> SuiteParams {
        match self {
            Self::EcdheEcdsaAes128GcmSha256 => SuiteParams {
                suite: self,
                hash: HashAlgorithm::Sha256,
                key_len: 16,
                iv_len: IV_LEN,
                signature: SignatureAlgorithm::Ecdsa,
            },
            Self::EcdheRsaAes128GcmSha256 => SuiteParams {
                suite: self,
                hash: HashAlgorithm::Sha256,
                key_len: 16,
                iv_len: IV_LEN,
                signature: SignatureAlgorithm::Rsa,
            },
            Self::EcdheEcdsaAes256GcmSha384 => SuiteParams {
                suite: self,
                hash: HashAlgorithm::Sha384,
                key_len: 32,
                iv_len: IV_LEN,
                signature: SignatureAlgorithm::Ecdsa,
            },
            Self::EcdheRsaAes256GcmSha384 => SuiteParams {
                suite: self,
                hash: HashAlgorithm::Sha384,
                key_len: 32,
                iv_len: IV_LEN,
                signature: SignatureAlgorithm::Rsa,
            },
        }
    }
}

/// Parameters bound by a negotiated cipher suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuiteParams {
    pub suite: CipherSuite,
    pub hash: HashAlgorithm,
    pub key_len: usize,
    pub iv_len: usize,
    /// Signature family the suite's certificate is expected to carry.
    pub signature: SignatureAlgorithm,
}

impl SuiteParams {
    /// Length of one directional key block: two keys plus two IVs.
    pub fn key_block_len(&self) -> usize {
        2 * self.key_len + 2 * self.iv_len
    }
}

/// Elliptic-curve groups offered for key agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedGroup {
    P256,
    P384,
    P521,
}

impl NamedGroup {
    pub fn to_u16(self) -> u16 {
        match self {
            Self::P256 => 23,
            Self::P384 => 24,
            Self::P521 => 25,
        }
    }

    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            23 => Some(Self::P256),
            24 => Some(Self::P384),
            25 => Some(Self::P521),
            _ => None,
        }
    }

    /// Length of an uncompressed SEC1 point on this curve.
    pub fn point_len(self) -> usize {
        match self {
            Self::P256 => 65,
            Self::P384 => 97,
            Self::P521 => 133,
        }
    }
}

/// Hash algorithms: SHA-256/384 drive suites, SHA-512 appears only in
/// signature pairings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Sha256 => 4,
            Self::Sha384 => 5,
            Self::Sha512 => 6,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            4 => Some(Self::Sha256),
            5 => Some(Self::Sha384),
            6 => Some(Self::Sha512),
            _ => None,
        }
    }

    pub fn digest_len(self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }
}

/// Signature families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    Rsa,
    Ecdsa,
}

impl SignatureAlgorithm {
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Rsa => 1,
            Self::Ecdsa => 3,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Rsa),
            3 => Some(Self::Ecdsa),
            _ => None,
        }
    }
}

/// A (hash, signature) pairing as carried in SignatureAlgorithms and
/// CertificateVerify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureAndHash {
    pub hash: HashAlgorithm,
    pub signature: SignatureAlgorithm,
}

impl SignatureAndHash {
    pub fn new(hash: HashAlgorithm, signature: SignatureAlgorithm) -> Self {
        Self { hash, signature }
    }
}

/// Key material with a redacted `Debug` and zeroize-on-drop semantics.
#[derive(Clone, PartialEq, Eq, zeroize::Zeroize, zeroize::ZeroizeOnDrop)]
pub struct Secret(Vec<u8>);

impl Secret {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret({} bytes)", self.0.len())
    }
}

/// Validate that a key's length matches the suite's AEAD key length.
pub fn check_key_len(suite: CipherSuite, key: &[u8]) -> Result<(), Error> {
    if key.len() != suite.params().key_len {
        return Err(Error::Internal("AEAD key length does not match suite"));
    }
    Ok(())
}
