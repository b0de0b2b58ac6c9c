//! The draft key schedule and per-connection crypto context.
//!
//! Inputs are the ephemeral and static secrets (equal in this pure
//! 1-RTT design) and the running transcript:
//!
//! ```text
//!   xSS = HKDF-Extract(0, SS)
//!   xES = HKDF-Extract(0, ES)
//!   handshake key block
//!       = HKDF-Expand-Label(xES, "handshake key expansion",
//!                           Hash(CH ‖ SH), 2·keyLen + 2·ivLen)
//!   master secret = HKDF-Extract(xSS, xES)
//!   finished_key(role)
//!       = HKDF-Expand-Label(xES, "<role> finished", "", hashLen)
//!   verify_data(role) = HMAC(finished_key(role), Hash(transcript))
//!   application key block
//!       = HKDF-Expand-Label(master, "application data key expansion",
//!                           Hash(full transcript), 2·keyLen + 2·ivLen)
//! ```
//!
//! Key blocks split as client key ‖ server key ‖ client IV ‖ server IV.
//! The transcript is fed serialised handshake messages in strict
//! protocol order, each exactly once; `update` absorbs both Finished
//! messages itself so the two sides agree structurally.

use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{hkdf, CipherSuite, Secret, SuiteParams, IV_LEN};
use crate::error::{Error, Result};
use crate::tls::messages::{FinishedBody, HandshakeMessage};
use crate::tls::transcript::TranscriptHash;

/// The four traffic keys for one protocol stage.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct TrafficKeys {
    pub client_write_key: Vec<u8>,
    pub server_write_key: Vec<u8>,
    pub client_write_iv: [u8; IV_LEN],
    pub server_write_iv: [u8; IV_LEN],
}

impl std::fmt::Debug for TrafficKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TrafficKeys({}-byte keys)", self.client_write_key.len())
    }
}

fn derive_traffic_keys(
    params: &SuiteParams,
    secret: &Secret,
    label: &[u8],
    transcript_hash: &[u8],
) -> Result<TrafficKeys> {
    let block = hkdf::expand_label(
        params.hash,
        secret.as_slice(),
        label,
        transcript_hash,
        params.key_block_len(),
    )?;
    let k = params.key_len;
    let iv = params.iv_len;
    let mut client_write_iv = [0u8; IV_LEN];
    let mut server_write_iv = [0u8; IV_LEN];
    client_write_iv.copy_from_slice(&block[2 * k..2 * k + iv]);
    server_write_iv.copy_from_slice(&block[2 * k + iv..2 * k + 2 * iv]);
    Ok(TrafficKeys {
        client_write_key: block[..k].to_vec(),
        server_write_key: block[k..2 * k].to_vec(),
        client_write_iv,
        server_write_iv,
    })
}

/// Transcript hash plus key schedule for one connection.
///
/// `init` absorbs the two Hellos and derives everything the handshake
/// stage needs; `update` absorbs the server's first flight and
/// finishes the schedule. Both Finished verify_data values are
/// precomputed so drivers only compare.
#[derive(Debug)]
pub struct CryptoContext {
    params: SuiteParams,
    transcript: TranscriptHash,
    master_secret: Secret,
    client_finished_key: Secret,
    server_finished_key: Secret,
    pub handshake_keys: TrafficKeys,
    pub client_finished: FinishedBody,
    pub server_finished: FinishedBody,
    pub application_keys: Option<TrafficKeys>,
}

impl CryptoContext {
    /// Set up the schedule from the two Hellos and the agreed secrets.
    pub fn init(
        client_hello: &HandshakeMessage,
        server_hello: &HandshakeMessage,
        es: &Secret,
        ss: &Secret,
        suite: CipherSuite,
    ) -> Result<Self> {
        let params = suite.params();
        let hash_len = params.hash.digest_len();

        let mut transcript = TranscriptHash::new(params.hash)?;
        transcript.update(&client_hello.encoded());
        transcript.update(&server_hello.encoded());
        let hello_hash = transcript.current_hash();

        let zero_salt = vec![0u8; hash_len];
        let xss = hkdf::extract(params.hash, &zero_salt, ss.as_slice())?;
        let xes = hkdf::extract(params.hash, &zero_salt, es.as_slice())?;

        let handshake_keys =
            derive_traffic_keys(&params, &xes, b"handshake key expansion", &hello_hash)?;
        let master_secret = hkdf::extract(params.hash, xss.as_slice(), xes.as_slice())?;

        let client_finished_key = Secret::new(hkdf::expand_label(
            params.hash,
            xes.as_slice(),
            b"client finished",
            &[],
            hash_len,
        )?);
        let server_finished_key = Secret::new(hkdf::expand_label(
            params.hash,
            xes.as_slice(),
            b"server finished",
            &[],
            hash_len,
        )?);

        // Precompute verify_data over the transcript so far; `update`
        // recomputes once the server's flight is absorbed.
        let client_finished = FinishedBody {
            verify_data: hkdf::hmac(params.hash, client_finished_key.as_slice(), &hello_hash)?,
        };
        let server_finished = FinishedBody {
            verify_data: hkdf::hmac(params.hash, server_finished_key.as_slice(), &hello_hash)?,
        };

        Ok(Self {
            params,
            transcript,
            master_secret,
            client_finished_key,
            server_finished_key,
            handshake_keys,
            client_finished,
            server_finished,
            application_keys: None,
        })
    }

    /// Absorb the handshake messages between ServerHello and Finished,
    /// then complete the schedule: server Finished over the transcript
    /// so far, client Finished over the transcript including the
    /// server's, and the application key block over the full
    /// transcript.
    pub fn update<'a, I>(&mut self, messages: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a HandshakeMessage>,
    {
        for message in messages {
            self.transcript.update(&message.encoded());
        }

        let hash = self.transcript.current_hash();
        self.server_finished = FinishedBody {
            verify_data: hkdf::hmac(self.params.hash, self.server_finished_key.as_slice(), &hash)?,
        };
        let server_finished_msg = HandshakeMessage::from_body(&self.server_finished)?;
        self.transcript.update(&server_finished_msg.encoded());

        let hash = self.transcript.current_hash();
        self.client_finished = FinishedBody {
            verify_data: hkdf::hmac(self.params.hash, self.client_finished_key.as_slice(), &hash)?,
        };
        let client_finished_msg = HandshakeMessage::from_body(&self.client_finished)?;
        self.transcript.update(&client_finished_msg.encoded());

        let hash = self.transcript.current_hash();
        self.application_keys = Some(derive_traffic_keys(
            &self.params,
            &self.master_secret,
            b"application data key expansion",
            &hash,
        )?);
        Ok(())
    }

    pub fn suite(&self) -> CipherSuite {
        self.params.suite
    }

    pub fn params(&self) -> &SuiteParams {
        &self.params
    }

    /// Current transcript hash (diagnostic; the schedule snapshots the
    /// values it needs internally).
    pub fn transcript_hash(&self) -> Vec<u8> {
        self.transcript.current_hash()
    }

    /// Constant-time check of the peer server's Finished.
    pub fn verify_server_finished(&self, received: &FinishedBody) -> Result<()> {
        verify_data_eq(&self.server_finished, received)
    }

    /// Constant-time check of the peer client's Finished.
    pub fn verify_client_finished(&self, received: &FinishedBody) -> Result<()> {
        verify_data_eq(&self.client_finished, received)
    }
}

fn verify_data_eq(expected: &FinishedBody, received: &FinishedBody) -> Result<()> {
    if bool::from(
        expected
            .verify_data
            .as_slice()
            .ct_eq(received.verify_data.as_slice()),
    ) {
        Ok(())
    } else {
        Err(Error::BadRecordMac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::messages::{HandshakeBody, HandshakeType};

    fn message(msg_type: HandshakeType, fill: u8, len: usize) -> HandshakeMessage {
        HandshakeMessage {
            msg_type,
            body: vec![fill; len],
        }
    }

    fn context(suite: CipherSuite, es: u8) -> CryptoContext {
        let ch = message(HandshakeType::ClientHello, 0x01, 60);
        let sh = message(HandshakeType::ServerHello, 0x02, 48);
        let secret = Secret::new(vec![es; 32]);
        CryptoContext::init(&ch, &sh, &secret, &secret, suite).unwrap()
    }

    #[test]
    fn directions_get_distinct_keys() {
        let ctx = context(CipherSuite::EcdheRsaAes128GcmSha256, 0x42);
        let keys = &ctx.handshake_keys;
        assert_eq!(keys.client_write_key.len(), 16);
        assert_eq!(keys.server_write_key.len(), 16);
        assert_ne!(keys.client_write_key, keys.server_write_key);
        assert_ne!(keys.client_write_iv, keys.server_write_iv);
    }

    #[test]
    fn sha384_suite_gets_256_bit_keys() {
        let ctx = context(CipherSuite::EcdheEcdsaAes256GcmSha384, 0x42);
        assert_eq!(ctx.handshake_keys.client_write_key.len(), 32);
        assert_eq!(ctx.client_finished.verify_data.len(), 48);
    }

    #[test]
    fn different_secrets_different_keys() {
        let a = context(CipherSuite::EcdheRsaAes128GcmSha256, 0x11);
        let b = context(CipherSuite::EcdheRsaAes128GcmSha256, 0x22);
        assert_ne!(
            a.handshake_keys.client_write_key,
            b.handshake_keys.client_write_key
        );
    }

    #[test]
    fn both_sides_agree_after_identical_updates() {
        let flight = [
            message(HandshakeType::EncryptedExtensions, 0x03, 10),
            message(HandshakeType::Certificate, 0x04, 500),
            message(HandshakeType::CertificateVerify, 0x05, 80),
        ];
        let mut client = context(CipherSuite::EcdheRsaAes128GcmSha256, 0x42);
        let mut server = context(CipherSuite::EcdheRsaAes128GcmSha256, 0x42);
        client.update(flight.iter()).unwrap();
        server.update(flight.iter()).unwrap();

        // Transcript agreement, byte for byte.
        assert_eq!(client.transcript_hash(), server.transcript_hash());
        assert_eq!(
            client.server_finished.verify_data,
            server.server_finished.verify_data
        );
        assert_eq!(
            client.client_finished.verify_data,
            server.client_finished.verify_data
        );

        let ck = client.application_keys.as_ref().unwrap();
        let sk = server.application_keys.as_ref().unwrap();
        assert_eq!(ck.client_write_key, sk.client_write_key);
        assert_eq!(ck.server_write_key, sk.server_write_key);
        assert_eq!(ck.client_write_iv, sk.client_write_iv);
        assert_eq!(ck.server_write_iv, sk.server_write_iv);
    }

    #[test]
    fn finished_values_are_role_tagged() {
        let mut ctx = context(CipherSuite::EcdheRsaAes128GcmSha256, 0x42);
        ctx.update([message(HandshakeType::EncryptedExtensions, 0, 2)].iter())
            .unwrap();
        assert_ne!(
            ctx.client_finished.verify_data,
            ctx.server_finished.verify_data
        );
        assert_eq!(ctx.client_finished.verify_data.len(), 32);
    }

    #[test]
    fn update_moves_finished_values() {
        let mut ctx = context(CipherSuite::EcdheRsaAes128GcmSha256, 0x42);
        let before = ctx.server_finished.verify_data.clone();
        ctx.update([message(HandshakeType::Certificate, 0x09, 40)].iter())
            .unwrap();
        assert_ne!(ctx.server_finished.verify_data, before);
    }

    #[test]
    fn application_keys_only_after_update() {
        let mut ctx = context(CipherSuite::EcdheRsaAes128GcmSha256, 0x42);
        assert!(ctx.application_keys.is_none());
        ctx.update(std::iter::empty::<&HandshakeMessage>()).unwrap();
        assert!(ctx.application_keys.is_some());
    }

    #[test]
    fn handshake_and_application_keys_differ() {
        let mut ctx = context(CipherSuite::EcdheRsaAes128GcmSha256, 0x42);
        ctx.update(std::iter::empty::<&HandshakeMessage>()).unwrap();
        let app = ctx.application_keys.as_ref().unwrap();
        assert_ne!(app.client_write_key, ctx.handshake_keys.client_write_key);
        assert_ne!(app.server_write_key, ctx.handshake_keys.server_write_key);
    }

    #[test]
    fn finished_verification_accepts_and_rejects() {
        let mut ctx = context(CipherSuite::EcdheRsaAes128GcmSha256, 0x42);
        ctx.update(std::iter::empty::<&HandshakeMessage>()).unwrap();

        ctx.verify_server_finished(&ctx.server_finished.clone())
            .unwrap();
        ctx.verify_client_finished(&ctx.client_finished.clone())
            .unwrap();

        // Any flipped bit fails.
        let mut bad = ctx.server_finished.clone();
        bad.verify_data[0] ^= 0x01;
        assert_eq!(
            ctx.verify_server_finished(&bad).unwrap_err(),
            Error::BadRecordMac
        );

        // Length mismatch fails.
        let short = FinishedBody {
            verify_data: ctx.server_finished.verify_data[..16].to_vec(),
        };
        assert_eq!(
            ctx.verify_server_finished(&short).unwrap_err(),
            Error::BadRecordMac
        );

        // Swapped roles fail.
        assert!(ctx
            .verify_server_finished(&ctx.client_finished.clone())
            .is_err());
    }

    #[test]
    fn update_order_matters() {
        let m1 = message(HandshakeType::EncryptedExtensions, 0x03, 10);
        let m2 = message(HandshakeType::Certificate, 0x04, 10);
        let mut a = context(CipherSuite::EcdheRsaAes128GcmSha256, 0x42);
        let mut b = context(CipherSuite::EcdheRsaAes128GcmSha256, 0x42);
        a.update([m1.clone(), m2.clone()].iter()).unwrap();
        b.update([m2, m1].iter()).unwrap();
        assert_ne!(
            a.server_finished.verify_data,
            b.server_finished.verify_data
        );
    }

    #[test]
    fn finished_message_roundtrips_through_codec() {
        let mut ctx = context(CipherSuite::EcdheRsaAes128GcmSha256, 0x42);
        ctx.update(std::iter::empty::<&HandshakeMessage>()).unwrap();
        let msg = HandshakeMessage::from_body(&ctx.server_finished).unwrap();
        let parsed = FinishedBody::decode(&msg.body).unwrap();
        ctx.verify_server_finished(&parsed).unwrap();
    }
}
