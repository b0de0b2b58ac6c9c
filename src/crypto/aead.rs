//! Record protection AEAD.
//!
//! The suite is negotiated at run time from a closed set, so the cipher
//! is an enum rather than a type parameter. Both variants are AES-GCM
//! with a 16-byte tag; they differ only in key size.

use aes_gcm::aead::AeadInPlace;
use aes_gcm::{Aes128Gcm, Aes256Gcm, KeyInit, Nonce, Tag};

use crate::crypto::{CipherSuite, IV_LEN, TAG_LEN};
use crate::error::{Error, Result};

/// AEAD instance keyed for one direction of the record layer.
pub enum RecordCipher {
    Aes128Gcm(Aes128Gcm),
    Aes256Gcm(Aes256Gcm),
}

impl RecordCipher {
    /// Build the AEAD a suite calls for. Fails if the key length does
    /// not match the suite.
    pub fn new(suite: CipherSuite, key: &[u8]) -> Result<Self> {
        crate::crypto::check_key_len(suite, key)?;
        match suite.params().key_len {
            16 => Ok(Self::Aes128Gcm(
                Aes128Gcm::new_from_slice(key).map_err(|_| Error::Internal("AEAD key rejected"))?,
            )),
            32 => Ok(Self::Aes256Gcm(
                Aes256Gcm::new_from_slice(key).map_err(|_| Error::Internal("AEAD key rejected"))?,
            )),
            _ => Err(Error::Internal("unsupported AEAD key length")),
        }
    }

    /// Encrypt `plaintext`, returning ciphertext with the tag appended.
    pub fn seal(&self, nonce: &[u8; IV_LEN], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(plaintext.len() + TAG_LEN);
        buf.extend_from_slice(plaintext);
        let nonce = Nonce::from_slice(nonce);
        let tag = match self {
            Self::Aes128Gcm(c) => c.encrypt_in_place_detached(nonce, aad, &mut buf),
            Self::Aes256Gcm(c) => c.encrypt_in_place_detached(nonce, aad, &mut buf),
        }
        .map_err(|_| Error::Internal("AEAD seal failed"))?;
        buf.extend_from_slice(&tag);
        Ok(buf)
    }

    /// Decrypt a ciphertext with trailing tag. Authentication failure is
    /// `BadRecordMac`.
    pub fn open(&self, nonce: &[u8; IV_LEN], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < TAG_LEN {
            return Err(Error::BadRecordMac);
        }
        let split = ciphertext.len() - TAG_LEN;
        let mut buf = ciphertext[..split].to_vec();
        let tag = Tag::from_slice(&ciphertext[split..]);
        let nonce = Nonce::from_slice(nonce);
        match self {
            Self::Aes128Gcm(c) => c.decrypt_in_place_detached(nonce, aad, &mut buf, tag),
            Self::Aes256Gcm(c) => c.decrypt_in_place_detached(nonce, aad, &mut buf, tag),
        }
        .map_err(|_| Error::BadRecordMac)?;
        Ok(buf)
    }
}
