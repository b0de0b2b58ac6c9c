//! Client side of the handshake.
//!
//! Straight-line sequence: send ClientHello, read ServerHello, agree
//! on keys, rekey to handshake traffic, read the server's flight up to
//! Finished, authenticate, send our own Finished, rekey to application
//! traffic. Any failure is terminal for the connection.

use log::debug;
use rand_core::{OsRng, RngCore};

use crate::config::Config;
use crate::crypto::ecdh::{self, EphemeralKey};
use crate::crypto::{cert, hkdf};
use crate::error::{Error, Result};
use crate::tls::extensions::{
    ClientKeySharesExt, DraftVersionExt, ExtensionSet, KeyShareEntry, ServerKeyShareExt,
    ServerNameExt, SignatureAlgorithmsExt, SupportedGroupsExt,
};
use crate::tls::handshake::HandshakeFrames;
use crate::tls::key_schedule::CryptoContext;
use crate::tls::messages::{
    CertificateBody, CertificateVerifyBody, ClientHelloBody, EncryptedExtensionsBody,
    FinishedBody, HandshakeMessage, HandshakeType, ServerHelloBody,
};
use crate::tls::record::RecordLayer;
use crate::transport::Transport;

pub(crate) fn client_handshake<T: Transport>(
    config: &Config,
    inbound: &mut RecordLayer<T>,
    outbound: &mut RecordLayer<T>,
) -> Result<CryptoContext> {
    let mut hs_in = HandshakeFrames::new(inbound);
    let mut hs_out = HandshakeFrames::new(outbound);

    // One ephemeral keypair per offered group; the server picks one.
    let mut private_keys: Vec<EphemeralKey> = Vec::with_capacity(config.groups.len());
    let mut shares = Vec::with_capacity(config.groups.len());
    for &group in &config.groups {
        let (private, public) = ecdh::generate_key_share(group)?;
        private_keys.push(private);
        shares.push(KeyShareEntry {
            group,
            key_exchange: public,
        });
    }

    let mut random = [0u8; 32];
    OsRng.fill_bytes(&mut random);

    let mut client_hello = ClientHelloBody {
        random,
        legacy_session_id: Vec::new(),
        cipher_suites: config.cipher_suites.clone(),
        extensions: ExtensionSet::new(),
    };
    client_hello
        .extensions
        .add(&ServerNameExt(config.server_name.clone()))?;
    client_hello.extensions.add(&ClientKeySharesExt(shares))?;
    client_hello
        .extensions
        .add(&SupportedGroupsExt(config.groups.clone()))?;
    client_hello
        .extensions
        .add(&SignatureAlgorithmsExt(config.signature_algorithms.clone()))?;
    client_hello.extensions.add(&DraftVersionExt::default())?;

    let chm = hs_out.write_body(&client_hello)?;
    debug!("sent ClientHello");

    let (shm, server_hello) = hs_in.read_body::<ServerHelloBody>()?;
    debug!("received ServerHello ({:?})", server_hello.cipher_suite);

    if !config.cipher_suites.contains(&server_hello.cipher_suite) {
        return Err(Error::HandshakeFailure("server chose an unoffered cipher suite"));
    }
    let server_share = server_hello
        .extensions
        .find::<ServerKeyShareExt>()?
        .ok_or(Error::MissingExtension("key_share"))?;
    let private = private_keys
        .iter()
        .find(|key| key.group() == server_share.0.group)
        .ok_or(Error::HandshakeFailure("server chose an unoffered group"))?;
    let shared_secret = private.agree(&server_share.0.key_exchange)?;
    debug!("completed key agreement ({:?})", server_share.0.group);

    let mut ctx = CryptoContext::init(
        &chm,
        &shm,
        &shared_secret,
        &shared_secret,
        server_hello.cipher_suite,
    )?;
    // Install the peer's write keys for reading, ours for writing.
    hs_in.rekey(
        ctx.suite(),
        &ctx.handshake_keys.server_write_key,
        &ctx.handshake_keys.server_write_iv,
    )?;
    hs_out.rekey(
        ctx.suite(),
        &ctx.handshake_keys.client_write_key,
        &ctx.handshake_keys.client_write_iv,
    )?;
    debug!("installed handshake traffic keys");

    // Server flight up to Finished: optional EncryptedExtensions, then
    // Certificate, then CertificateVerify; anything else is an error.
    let mut transcript: Vec<HandshakeMessage> = Vec::new();
    let mut certificate: Option<CertificateBody> = None;
    let mut certificate_verify: Option<CertificateVerifyBody> = None;
    let finished_message;
    let mut stage = 0u8;
    loop {
        let message = hs_in.read_message()?;
        match message.msg_type {
            HandshakeType::Finished => {
                finished_message = message;
                break;
            }
            HandshakeType::EncryptedExtensions if stage < 1 => {
                message.parse::<EncryptedExtensionsBody>()?;
                stage = 1;
            }
            HandshakeType::Certificate if stage < 2 => {
                certificate = Some(message.parse()?);
                stage = 2;
            }
            HandshakeType::CertificateVerify if stage == 2 => {
                certificate_verify = Some(message.parse()?);
                stage = 3;
            }
            _ => return Err(Error::UnexpectedMessage("server flight ordering")),
        }
        transcript.push(message);
    }
    debug!("read server flight ({} messages)", transcript.len());

    if let Some(callback) = &config.auth_callback {
        let certificate = certificate
            .as_ref()
            .ok_or_else(|| Error::BadCertificate("server sent no certificate".into()))?;
        let verify = certificate_verify
            .as_ref()
            .ok_or_else(|| Error::BadCertificate("server sent no certificate verify".into()))?;

        // The signature covers {CH, SH, ..., Certificate} serialised,
        // hashed with the algorithm declared in CertificateVerify.
        let mut signed = chm.encoded();
        signed.extend_from_slice(&shm.encoded());
        for message in &transcript {
            if message.msg_type == HandshakeType::CertificateVerify {
                break;
            }
            signed.extend_from_slice(&message.encoded());
        }
        let digest = hkdf::digest(verify.algorithm.hash, &signed);

        let leaf = certificate
            .leaf()
            .ok_or_else(|| Error::BadCertificate("empty certificate chain".into()))?;
        let public_key = cert::public_key_from_certificate(leaf)?;
        public_key.verify(verify.algorithm, &digest, &verify.signature)?;
        debug!("verified CertificateVerify signature");

        callback(&certificate.chain()).map_err(Error::BadCertificate)?;
    }

    ctx.update(transcript.iter())?;

    let finished = finished_message.parse::<FinishedBody>()?;
    if finished.verify_data.len() != ctx.params().hash.digest_len() {
        return Err(Error::Decode("finished"));
    }
    ctx.verify_server_finished(&finished)?;
    debug!("verified server Finished");

    let client_finished = ctx.client_finished.clone();
    hs_out.write_body(&client_finished)?;

    let app = ctx
        .application_keys
        .as_ref()
        .ok_or(Error::Internal("application keys missing"))?;
    hs_in.rekey(ctx.suite(), &app.server_write_key, &app.server_write_iv)?;
    hs_out.rekey(ctx.suite(), &app.client_write_key, &app.client_write_iv)?;
    debug!("installed application traffic keys");

    Ok(ctx)
}
