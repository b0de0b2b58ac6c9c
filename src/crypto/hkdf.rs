//! Hash, HKDF, and HMAC plumbing over the two suite hashes.
//!
//! The key schedule needs four primitives: a one-shot digest,
//! HKDF-Extract, the draft HKDF-Expand-Label (label prefix
//! `"TLS 1.3, "`), and HMAC for Finished verify_data. All are
//! enum-dispatched on [`HashAlgorithm`] because the hash is chosen at
//! suite negotiation time.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::crypto::{HashAlgorithm, Secret};
use crate::error::{Error, Result};

/// One-shot digest. Supports all three hashes so CertificateVerify can
/// use a signature hash the suite does not.
pub fn digest(hash: HashAlgorithm, data: &[u8]) -> Vec<u8> {
    match hash {
        HashAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
        HashAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
        HashAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
    }
}

/// HKDF-Extract(salt, ikm). An empty salt means a zeroed string of
/// hash length, per the HKDF definition.
pub fn extract(hash: HashAlgorithm, salt: &[u8], ikm: &[u8]) -> Result<Secret> {
    let prk = match hash {
        HashAlgorithm::Sha256 => hkdf::Hkdf::<Sha256>::extract(Some(salt), ikm).0.to_vec(),
        HashAlgorithm::Sha384 => hkdf::Hkdf::<Sha384>::extract(Some(salt), ikm).0.to_vec(),
        HashAlgorithm::Sha512 => return Err(Error::Internal("SHA-512 is not a suite hash")),
    };
    Ok(Secret::new(prk))
}

/// Raw HKDF-Expand(prk, info, len).
pub fn expand(hash: HashAlgorithm, prk: &[u8], info: &[u8], len: usize) -> Result<Vec<u8>> {
    let mut okm = vec![0u8; len];
    match hash {
        HashAlgorithm::Sha256 => {
            let hk = hkdf::Hkdf::<Sha256>::from_prk(prk)
                .map_err(|_| Error::Internal("HKDF PRK rejected"))?;
            hk.expand(info, &mut okm)
                .map_err(|_| Error::Internal("HKDF expand failed"))?;
        }
        HashAlgorithm::Sha384 => {
            let hk = hkdf::Hkdf::<Sha384>::from_prk(prk)
                .map_err(|_| Error::Internal("HKDF PRK rejected"))?;
            hk.expand(info, &mut okm)
                .map_err(|_| Error::Internal("HKDF expand failed"))?;
        }
        HashAlgorithm::Sha512 => return Err(Error::Internal("SHA-512 is not a suite hash")),
    }
    Ok(okm)
}

/// Draft HKDF-Expand-Label.
///
/// HkdfLabel:
///   uint16 length = len
///   opaque label<1..255> = "TLS 1.3, " + label
///   opaque hash_value<0..255> = context
pub fn expand_label(
    hash: HashAlgorithm,
    secret: &[u8],
    label: &[u8],
    context: &[u8],
    len: usize,
) -> Result<Vec<u8>> {
    let info = build_hkdf_label(label, context, len)?;
    expand(hash, secret, &info, len)
}

const LABEL_PREFIX: &[u8] = b"TLS 1.3, ";

fn build_hkdf_label(label: &[u8], context: &[u8], len: usize) -> Result<Vec<u8>> {
    let full_label_len = LABEL_PREFIX.len() + label.len();
    if full_label_len > 255 || context.len() > 255 || len > u16::MAX as usize {
        return Err(Error::Internal("oversized HKDF label"));
    }
    let mut info = Vec::with_capacity(2 + 1 + full_label_len + 1 + context.len());
    info.extend_from_slice(&(len as u16).to_be_bytes());
    info.push(full_label_len as u8);
    info.extend_from_slice(LABEL_PREFIX);
    info.extend_from_slice(label);
    info.push(context.len() as u8);
    info.extend_from_slice(context);
    Ok(info)
}

/// HMAC(key, data) with the suite hash. Finished verify_data is exactly
/// this over the transcript hash.
pub fn hmac(hash: HashAlgorithm, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    match hash {
        HashAlgorithm::Sha256 => {
            let mut mac = Hmac::<Sha256>::new_from_slice(key)
                .map_err(|_| Error::Internal("HMAC key rejected"))?;
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        }
        HashAlgorithm::Sha384 => {
            let mut mac = Hmac::<Sha384>::new_from_slice(key)
                .map_err(|_| Error::Internal("HMAC key rejected"))?;
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        }
        HashAlgorithm::Sha512 => Err(Error::Internal("SHA-512 is not a suite hash")),
    }
}
