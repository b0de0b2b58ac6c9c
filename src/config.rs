//! Connection configuration.
//!
//! One `Config` serves both roles: clients use the name, algorithm
//! preference lists, and auth callback; servers additionally need a
//! [`ServerCredential`]. Order inside each list expresses preference.

use std::fmt;
use std::sync::Arc;

use crate::crypto::cert;
use crate::crypto::sign::SigningKey;
use crate::crypto::{
    CipherSuite, HashAlgorithm, NamedGroup, SignatureAlgorithm, SignatureAndHash,
};
use crate::error::Result;

/// Verdict on a peer certificate chain (leaf first, DER encoded). A
/// rejection message aborts the handshake with `BadCertificate`.
pub type AuthCallback =
    Arc<dyn Fn(&[Vec<u8>]) -> std::result::Result<(), String> + Send + Sync>;

/// Server credential: a certificate chain and the key that proves
/// possession of the leaf.
#[derive(Clone)]
pub struct ServerCredential {
    /// DER certificates, leaf first.
    pub certificate_chain: Vec<Vec<u8>>,
    pub private_key: SigningKey,
    /// Algorithm pair declared in CertificateVerify.
    pub algorithm: SignatureAndHash,
}

impl ServerCredential {
    /// Build a credential around a freshly minted self-signed-shaped
    /// certificate for `name`. The protocol proves key possession via
    /// CertificateVerify, so the certificate's own signature is a
    /// placeholder.
    pub fn self_signed(
        name: &str,
        algorithm: SignatureAndHash,
        private_key: SigningKey,
    ) -> Result<Self> {
        let spki = private_key.public_key_der()?;
        let certificate = cert::build_certificate(&spki, name)?;
        Ok(Self {
            certificate_chain: vec![certificate],
            private_key,
            algorithm,
        })
    }
}

impl fmt::Debug for ServerCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerCredential")
            .field("certificates", &self.certificate_chain.len())
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

/// Settings for a TLS client or server.
#[derive(Clone)]
pub struct Config {
    /// SNI value for clients; logical identity for servers.
    pub server_name: String,
    /// Cipher suites offered/accepted, most preferred first.
    pub cipher_suites: Vec<CipherSuite>,
    /// Key agreement groups offered/accepted, most preferred first.
    pub groups: Vec<NamedGroup>,
    /// Signature algorithm pairs advertised to the peer.
    pub signature_algorithms: Vec<SignatureAndHash>,
    /// Client-side chain check, invoked after signature verification.
    pub auth_callback: Option<AuthCallback>,
    /// Server credential; required for the server role.
    pub credential: Option<ServerCredential>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_name: String::new(),
            cipher_suites: vec![
                CipherSuite::EcdheEcdsaAes128GcmSha256,
                CipherSuite::EcdheRsaAes128GcmSha256,
                CipherSuite::EcdheEcdsaAes256GcmSha384,
                CipherSuite::EcdheRsaAes256GcmSha384,
            ],
            groups: vec![NamedGroup::P256, NamedGroup::P384, NamedGroup::P521],
            signature_algorithms: vec![
                SignatureAndHash::new(HashAlgorithm::Sha256, SignatureAlgorithm::Rsa),
                SignatureAndHash::new(HashAlgorithm::Sha256, SignatureAlgorithm::Ecdsa),
                SignatureAndHash::new(HashAlgorithm::Sha384, SignatureAlgorithm::Rsa),
                SignatureAndHash::new(HashAlgorithm::Sha384, SignatureAlgorithm::Ecdsa),
                SignatureAndHash::new(HashAlgorithm::Sha512, SignatureAlgorithm::Rsa),
                SignatureAndHash::new(HashAlgorithm::Sha512, SignatureAlgorithm::Ecdsa),
            ],
            auth_callback: None,
            credential: None,
        }
    }
}

impl Config {
    /// Client configuration for `server_name` with default algorithm
    /// lists.
    pub fn client(server_name: &str) -> Self {
        Self {
            server_name: server_name.to_owned(),
            ..Self::default()
        }
    }

    /// Server configuration around a credential.
    pub fn server(credential: ServerCredential) -> Self {
        Self {
            credential: Some(credential),
            ..Self::default()
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("server_name", &self.server_name)
            .field("cipher_suites", &self.cipher_suites)
            .field("groups", &self.groups)
            .field("signature_algorithms", &self.signature_algorithms)
            .field("auth_callback", &self.auth_callback.is_some())
            .field("credential", &self.credential)
            .finish()
    }
}
