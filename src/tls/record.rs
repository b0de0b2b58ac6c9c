//! TLS record layer: framing, AEAD protection, rekeying.
//!
//! One [`RecordLayer`] instance serves one direction of one
//! connection. `rekey` swaps the AEAD parameters and resets the
//! sequence number as a single transition; the caller holds the
//! direction lock for the duration of any call here.
//!
//! Wire format: type(1) ‖ version(2, legacy) ‖ length(2) ‖ payload.
//! When keyed, the payload is AEAD ciphertext and the AAD is the
//! 5-byte header whose length field holds the ciphertext length. The
//! nonce is the per-direction sequence number XORed into the low bytes
//! of the static IV.

use std::sync::Arc;

use log::trace;

use crate::crypto::aead::RecordCipher;
use crate::crypto::{CipherSuite, IV_LEN, TAG_LEN};
use crate::error::{Error, Result};
use crate::transport::Transport;

/// Record header size on the wire.
pub const RECORD_HEADER_LEN: usize = 5;

/// Largest plaintext fragment a record may carry (2^14).
pub const MAX_FRAGMENT_LEN: usize = 16384;

/// Largest ciphertext payload: a full fragment plus AEAD overhead.
pub const MAX_CIPHERTEXT_LEN: usize = MAX_FRAGMENT_LEN + TAG_LEN;

/// Legacy version bytes written into record headers.
pub const RECORD_VERSION: u16 = 0x0303;

/// Record content types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContentType {
    ChangeCipherSpec = 20,
    Alert = 21,
    Handshake = 22,
    ApplicationData = 23,
}

impl ContentType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            20 => Some(Self::ChangeCipherSpec),
            21 => Some(Self::Alert),
            22 => Some(Self::Handshake),
            23 => Some(Self::ApplicationData),
            _ => None,
        }
    }
}

/// One plaintext record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub content_type: ContentType,
    pub fragment: Vec<u8>,
}

/// Encode a record header.
pub fn encode_record_header(ct: ContentType, length: u16) -> [u8; RECORD_HEADER_LEN] {
    let version = RECORD_VERSION.to_be_bytes();
    let length = length.to_be_bytes();
    [ct as u8, version[0], version[1], length[0], length[1]]
}

/// Decode a record header. The legacy version bytes are not checked:
/// the draft in use is identified by the DraftVersion extension.
pub fn decode_record_header(data: &[u8; RECORD_HEADER_LEN]) -> Result<(ContentType, usize)> {
    let ct = ContentType::from_u8(data[0]).ok_or(Error::Decode("record content type"))?;
    let length = u16::from_be_bytes([data[3], data[4]]) as usize;
    Ok((ct, length))
}

/// AEAD nonce: sequence number XORed into the low 8 bytes of the IV.
pub fn build_nonce(iv: &[u8; IV_LEN], seq: u64) -> [u8; IV_LEN] {
    let mut nonce = *iv;
    let seq_bytes = seq.to_be_bytes();
    for i in 0..8 {
        nonce[IV_LEN - 8 + i] ^= seq_bytes[i];
    }
    nonce
}

struct DirectionKeys {
    cipher: RecordCipher,
    iv: [u8; IV_LEN],
}

/// One direction of the record protocol over a shared transport.
pub struct RecordLayer<T: Transport> {
    transport: Arc<T>,
    keys: Option<DirectionKeys>,
    seq: u64,
}

impl<T: Transport> RecordLayer<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            keys: None,
            seq: 0,
        }
    }

    /// Whether this direction is under AEAD protection yet.
    pub fn is_keyed(&self) -> bool {
        self.keys.is_some()
    }

    /// Install new AEAD parameters and reset the sequence number, as a
    /// single transition.
    pub fn rekey(&mut self, suite: CipherSuite, key: &[u8], iv: &[u8]) -> Result<()> {
        let iv: [u8; IV_LEN] = iv.try_into().map_err(|_| Error::Internal("IV length"))?;
        let cipher = RecordCipher::new(suite, key)?;
        self.keys = Some(DirectionKeys { cipher, iv });
        self.seq = 0;
        trace!("record layer rekeyed ({suite:?})");
        Ok(())
    }

    /// Read one record, decrypting if keyed. ChangeCipherSpec records
    /// are skipped. Oversized payloads (before or after decryption)
    /// are `RecordOverflow`.
    pub fn read_record(&mut self) -> Result<Record> {
        loop {
            let mut header = [0u8; RECORD_HEADER_LEN];
            self.read_exact(&mut header)?;
            let (content_type, length) = decode_record_header(&header)?;

            let limit = if self.keys.is_some() {
                MAX_CIPHERTEXT_LEN
            } else {
                MAX_FRAGMENT_LEN
            };
            if length > limit {
                return Err(Error::RecordOverflow);
            }

            let mut fragment = vec![0u8; length];
            self.read_exact(&mut fragment)?;

            if content_type == ContentType::ChangeCipherSpec {
                trace!("ignoring change_cipher_spec record");
                continue;
            }

            if let Some(keys) = &self.keys {
                if self.seq == u64::MAX {
                    return Err(Error::Internal("record sequence number exhausted"));
                }
                let nonce = build_nonce(&keys.iv, self.seq);
                self.seq += 1;
                fragment = keys.cipher.open(&nonce, &header, &fragment)?;
                if fragment.len() > MAX_FRAGMENT_LEN {
                    return Err(Error::RecordOverflow);
                }
            }

            trace!("read record {content_type:?} ({} bytes)", fragment.len());
            return Ok(Record {
                content_type,
                fragment,
            });
        }
    }

    /// Write one record, encrypting if keyed. Fragmenting oversized
    /// payloads is the caller's job; handing one in is an invariant
    /// violation.
    pub fn write_record(&mut self, content_type: ContentType, fragment: &[u8]) -> Result<()> {
        if fragment.len() > MAX_FRAGMENT_LEN {
            return Err(Error::Internal("record fragment exceeds maximum"));
        }

        let mut wire = Vec::with_capacity(RECORD_HEADER_LEN + fragment.len() + TAG_LEN);
        match &self.keys {
            None => {
                wire.extend_from_slice(&encode_record_header(content_type, fragment.len() as u16));
                wire.extend_from_slice(fragment);
            }
            Some(keys) => {
                if self.seq == u64::MAX {
                    return Err(Error::Internal("record sequence number exhausted"));
                }
                let nonce = build_nonce(&keys.iv, self.seq);
                self.seq += 1;
                let header =
                    encode_record_header(content_type, (fragment.len() + TAG_LEN) as u16);
                let sealed = keys.cipher.seal(&nonce, &header, fragment)?;
                wire.extend_from_slice(&header);
                wire.extend_from_slice(&sealed);
            }
        }

        trace!("write record {content_type:?} ({} bytes)", fragment.len());
        self.write_all(&wire)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.transport.read(&mut buf[filled..])?;
            if n == 0 {
                return Err(Error::Io {
                    kind: std::io::ErrorKind::UnexpectedEof,
                    msg: "transport closed mid-record".into(),
                });
            }
            filled += n;
        }
        Ok(())
    }

    fn write_all(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            let n = self.transport.write(buf)?;
            if n == 0 {
                return Err(Error::Io {
                    kind: std::io::ErrorKind::WriteZero,
                    msg: "transport refused bytes".into(),
                });
            }
            buf = &buf[n..];
        }
        Ok(())
    }
}
