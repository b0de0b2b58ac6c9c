//! Running transcript hash over serialised handshake messages.
//!
//! Intermediate hashes are taken by cloning the state, so the
//! transcript can keep growing after a snapshot.

use sha2::{Digest, Sha256, Sha384};

use crate::crypto::HashAlgorithm;
use crate::error::{Error, Result};

/// Incremental transcript hash, SHA-256 or SHA-384 by suite.
#[derive(Debug, Clone)]
pub enum TranscriptHash {
    Sha256(Sha256),
    Sha384(Sha384),
}

impl TranscriptHash {
    pub fn new(hash: HashAlgorithm) -> Result<Self> {
        match hash {
            HashAlgorithm::Sha256 => Ok(Self::Sha256(Sha256::new())),
            HashAlgorithm::Sha384 => Ok(Self::Sha384(Sha384::new())),
            HashAlgorithm::Sha512 => Err(Error::Internal("SHA-512 is not a suite hash")),
        }
    }

    /// Feed serialised handshake message bytes into the transcript.
    pub fn update(&mut self, message: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(message),
            Self::Sha384(h) => h.update(message),
        }
    }

    /// Current hash without consuming the state.
    pub fn current_hash(&self) -> Vec<u8> {
        match self {
            Self::Sha256(h) => h.clone().finalize().to_vec(),
            Self::Sha384(h) => h.clone().finalize().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_one_shot_digest() {
        let mut t = TranscriptHash::new(HashAlgorithm::Sha256).unwrap();
        t.update(b"client hello ");
        t.update(b"server hello");
        assert_eq!(
            t.current_hash(),
            Sha256::digest(b"client hello server hello").to_vec()
        );
    }

    #[test]
    fn snapshot_does_not_consume() {
        let mut t = TranscriptHash::new(HashAlgorithm::Sha384).unwrap();
        t.update(b"data");
        let h1 = t.current_hash();
        let h2 = t.current_hash();
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 48);

        t.update(b"more");
        assert_ne!(t.current_hash(), h1);
    }

    #[test]
    fn sha512_is_not_a_transcript_hash() {
        assert!(TranscriptHash::new(HashAlgorithm::Sha512).is_err());
    }
}
