//! Ephemeral ECDH key shares over the NIST curves.
//!
//! A client generates one [`EphemeralKey`] per offered group and keeps
//! them until the server's selection arrives; the unmatched ones are
//! wiped when dropped (the underlying ephemeral secrets zeroize
//! themselves). Public values travel as uncompressed SEC1 points.

use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand_core::OsRng;

use crate::crypto::{NamedGroup, Secret};
use crate::error::{Error, Result};

/// Largest uncompressed point we exchange (P-521).
pub const MAX_KEY_EXCHANGE_LEN: usize = 133;

/// Uncompressed SEC1 point bytes for a key share.
pub type KeyExchange = heapless::Vec<u8, MAX_KEY_EXCHANGE_LEN>;

/// An ephemeral private key for one named group.
pub enum EphemeralKey {
    P256(p256::ecdh::EphemeralSecret),
    P384(p384::ecdh::EphemeralSecret),
    P521(p521::ecdh::EphemeralSecret),
}

impl EphemeralKey {
    pub fn group(&self) -> NamedGroup {
        match self {
            Self::P256(_) => NamedGroup::P256,
            Self::P384(_) => NamedGroup::P384,
            Self::P521(_) => NamedGroup::P521,
        }
    }

    /// ECDH against the peer's uncompressed point. The shared secret is
    /// the x-coordinate, sized to the curve's field.
    pub fn agree(&self, peer_public: &[u8]) -> Result<Secret> {
        match self {
            Self::P256(sk) => {
                let pk = p256::PublicKey::from_sec1_bytes(peer_public)
                    .map_err(|_| Error::Decode("P-256 key exchange point"))?;
                Ok(Secret::new(
                    sk.diffie_hellman(&pk).raw_secret_bytes().to_vec(),
                ))
            }
            Self::P384(sk) => {
                let pk = p384::PublicKey::from_sec1_bytes(peer_public)
                    .map_err(|_| Error::Decode("P-384 key exchange point"))?;
                Ok(Secret::new(
                    sk.diffie_hellman(&pk).raw_secret_bytes().to_vec(),
                ))
            }
            Self::P521(sk) => {
                let pk = p521::PublicKey::from_sec1_bytes(peer_public)
                    .map_err(|_| Error::Decode("P-521 key exchange point"))?;
                Ok(Secret::new(
                    sk.diffie_hellman(&pk).raw_secret_bytes().to_vec(),
                ))
            }
        }
    }
}

/// Generate an ephemeral keypair for `group`, returning the private key
/// and the public value ready for a KeyShareEntry.
pub fn generate_key_share(group: NamedGroup) -> Result<(EphemeralKey, KeyExchange)> {
    let (key, point): (EphemeralKey, Vec<u8>) = match group {
        NamedGroup::P256 => {
            let sk = p256::ecdh::EphemeralSecret::random(&mut OsRng);
            let point = sk.public_key().to_encoded_point(false).as_bytes().to_vec();
            (EphemeralKey::P256(sk), point)
        }
        NamedGroup::P384 => {
            let sk = p384::ecdh::EphemeralSecret::random(&mut OsRng);
            let point = sk.public_key().to_encoded_point(false).as_bytes().to_vec();
            (EphemeralKey::P384(sk), point)
        }
        NamedGroup::P521 => {
            let sk = p521::ecdh::EphemeralSecret::random(&mut OsRng);
            let point = sk.public_key().to_encoded_point(false).as_bytes().to_vec();
            (EphemeralKey::P521(sk), point)
        }
    };
    let public = KeyExchange::from_slice(&point)
        .map_err(|_| Error::Internal("key exchange point exceeds buffer"))?;
    Ok((key, public))
}
