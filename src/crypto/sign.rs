//! CertificateVerify signing and verification.
//!
//! The signature input is the transcript digest computed with the hash
//! declared in the message's SignatureAndHash pair. RSA signatures use
//! PKCS#1 v1.5 over that digest; ECDSA signatures are DER-encoded and
//! computed over the same prehash.

use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand_core::OsRng;
use rsa::pkcs8::EncodePublicKey;
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};

use crate::crypto::{HashAlgorithm, SignatureAlgorithm, SignatureAndHash};
use crate::error::{Error, Result};

/// A server's signing key.
#[derive(Clone)]
pub enum SigningKey {
    Rsa(RsaPrivateKey),
    EcdsaP256(p256::ecdsa::SigningKey),
    EcdsaP384(p384::ecdsa::SigningKey),
}

/// A peer's public key, extracted from its leaf certificate.
#[derive(Debug, Clone)]
pub enum PublicKey {
    Rsa(RsaPublicKey),
    EcdsaP256(p256::ecdsa::VerifyingKey),
    EcdsaP384(p384::ecdsa::VerifyingKey),
}

fn pkcs1v15(hash: HashAlgorithm) -> Pkcs1v15Sign {
    match hash {
        HashAlgorithm::Sha256 => Pkcs1v15Sign::new::<sha2::Sha256>(),
        HashAlgorithm::Sha384 => Pkcs1v15Sign::new::<sha2::Sha384>(),
        HashAlgorithm::Sha512 => Pkcs1v15Sign::new::<sha2::Sha512>(),
    }
}

impl SigningKey {
    /// Generate a fresh key for the given signature family. RSA keys
    /// are 2048-bit; ECDSA keys are P-256.
    pub fn generate(algorithm: SignatureAlgorithm) -> Result<Self> {
        match algorithm {
            SignatureAlgorithm::Rsa => Ok(Self::Rsa(
                RsaPrivateKey::new(&mut OsRng, 2048)
                    .map_err(|_| Error::Internal("RSA key generation failed"))?,
            )),
            SignatureAlgorithm::Ecdsa => {
                Ok(Self::EcdsaP256(p256::ecdsa::SigningKey::random(&mut OsRng)))
            }
        }
    }

    /// The signature family this key belongs to.
    pub fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            Self::Rsa(_) => SignatureAlgorithm::Rsa,
            Self::EcdsaP256(_) | Self::EcdsaP384(_) => SignatureAlgorithm::Ecdsa,
        }
    }

    /// Sign a transcript digest under the declared algorithm pair.
    pub fn sign(&self, algorithm: SignatureAndHash, digest: &[u8]) -> Result<Vec<u8>> {
        if algorithm.signature != self.algorithm() {
            return Err(Error::Config("signing key does not match declared algorithm"));
        }
        match self {
            Self::Rsa(key) => key
                .sign(pkcs1v15(algorithm.hash), digest)
                .map_err(|_| Error::Internal("RSA signing failed")),
            Self::EcdsaP256(key) => {
                let sig: p256::ecdsa::Signature = key
                    .sign_prehash(digest)
                    .map_err(|_| Error::Internal("ECDSA signing failed"))?;
                Ok(sig.to_der().as_bytes().to_vec())
            }
            Self::EcdsaP384(key) => {
                let sig: p384::ecdsa::Signature = key
                    .sign_prehash(digest)
                    .map_err(|_| Error::Internal("ECDSA signing failed"))?;
                Ok(sig.to_der().as_bytes().to_vec())
            }
        }
    }

    /// DER SubjectPublicKeyInfo for this key's public half.
    pub fn public_key_der(&self) -> Result<Vec<u8>> {
        let doc = match self {
            Self::Rsa(key) => RsaPublicKey::from(key)
                .to_public_key_der()
                .map_err(|_| Error::Internal("RSA SPKI encoding failed"))?,
            Self::EcdsaP256(key) => {
                let point = key.verifying_key().to_encoded_point(false);
                let pk = p256::PublicKey::from_sec1_bytes(point.as_bytes())
                    .map_err(|_| Error::Internal("P-256 public key invalid"))?;
                pk.to_public_key_der()
                    .map_err(|_| Error::Internal("P-256 SPKI encoding failed"))?
            }
            Self::EcdsaP384(key) => {
                let point = key.verifying_key().to_encoded_point(false);
                let pk = p384::PublicKey::from_sec1_bytes(point.as_bytes())
                    .map_err(|_| Error::Internal("P-384 public key invalid"))?;
                pk.to_public_key_der()
                    .map_err(|_| Error::Internal("P-384 SPKI encoding failed"))?
            }
        };
        Ok(doc.as_bytes().to_vec())
    }
}

impl PublicKey {
    /// The signature family this key verifies.
    pub fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            Self::Rsa(_) => SignatureAlgorithm::Rsa,
            Self::EcdsaP256(_) | Self::EcdsaP384(_) => SignatureAlgorithm::Ecdsa,
        }
    }

    /// Verify a signature over a transcript digest. Any failure,
    /// including an algorithm/key family mismatch, is `DecryptError`.
    pub fn verify(
        &self,
        algorithm: SignatureAndHash,
        digest: &[u8],
        signature: &[u8],
    ) -> Result<()> {
        if algorithm.signature != self.algorithm() {
            return Err(Error::DecryptError);
        }
        match self {
            Self::Rsa(key) => key
                .verify(pkcs1v15(algorithm.hash), digest, signature)
                .map_err(|_| Error::DecryptError),
            Self::EcdsaP256(key) => {
                let sig = p256::ecdsa::Signature::from_der(signature)
                    .map_err(|_| Error::DecryptError)?;
                key.verify_prehash(digest, &sig)
                    .map_err(|_| Error::DecryptError)
            }
            Self::EcdsaP384(key) => {
                let sig = p384::ecdsa::Signature::from_der(signature)
                    .map_err(|_| Error::DecryptError)?;
                key.verify_prehash(digest, &sig)
                    .map_err(|_| Error::DecryptError)
            }
        }
    }
}
