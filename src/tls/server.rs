//! Server side of the handshake.
//!
//! Read ClientHello, negotiate group and suite on the client's
//! preference order, send ServerHello, rekey to handshake traffic,
//! send EncryptedExtensions ‖ Certificate ‖ CertificateVerify ‖
//! Finished, verify the client's Finished, rekey to application
//! traffic.

use log::debug;
use rand_core::{OsRng, RngCore};

use crate::config::Config;
use crate::crypto::{ecdh, hkdf};
use crate::error::{Error, Result};
use crate::tls::extensions::{
    ClientKeySharesExt, ExtensionSet, KeyShareEntry, ServerKeyShareExt, ServerNameExt,
    SignatureAlgorithmsExt, SupportedGroupsExt,
};
use crate::tls::handshake::HandshakeFrames;
use crate::tls::key_schedule::CryptoContext;
use crate::tls::messages::{
    CertificateBody, CertificateEntry, CertificateVerifyBody, ClientHelloBody,
    EncryptedExtensionsBody, FinishedBody, ServerHelloBody,
};
use crate::tls::record::RecordLayer;
use crate::transport::Transport;

pub(crate) fn server_handshake<T: Transport>(
    config: &Config,
    inbound: &mut RecordLayer<T>,
    outbound: &mut RecordLayer<T>,
) -> Result<CryptoContext> {
    let credential = config
        .credential
        .as_ref()
        .ok_or(Error::Config("server credential not configured"))?;

    let mut hs_in = HandshakeFrames::new(inbound);
    let mut hs_out = HandshakeFrames::new(outbound);

    let (chm, client_hello) = hs_in.read_body::<ClientHelloBody>()?;
    debug!("received ClientHello");

    let _server_name = client_hello
        .extensions
        .find::<ServerNameExt>()?
        .ok_or(Error::MissingExtension("server_name"))?;
    let _groups = client_hello
        .extensions
        .find::<SupportedGroupsExt>()?
        .ok_or(Error::MissingExtension("supported_groups"))?;
    let _signature_algorithms = client_hello
        .extensions
        .find::<SignatureAlgorithmsExt>()?
        .ok_or(Error::MissingExtension("signature_algorithms"))?;
    let key_shares = client_hello
        .extensions
        .find::<ClientKeySharesExt>()?
        .ok_or(Error::MissingExtension("key_share"))?;

    // First client-offered share whose group we also support.
    let mut selected = None;
    for share in &key_shares.0 {
        if config.groups.contains(&share.group) {
            let (private, public) = ecdh::generate_key_share(share.group)?;
            let shared_secret = private
                .agree(&share.key_exchange)
                .map_err(|_| Error::HandshakeFailure("key agreement failed"))?;
            selected = Some((share.group, public, shared_secret));
            break;
        }
    }
    let (group, server_public, shared_secret) =
        selected.ok_or(Error::HandshakeFailure("no common key share group"))?;
    debug!("selected group {group:?}");

    // First client-offered suite we accept.
    let suite = client_hello
        .cipher_suites
        .iter()
        .copied()
        .find(|suite| config.cipher_suites.contains(suite))
        .ok_or(Error::HandshakeFailure("no common cipher suite"))?;
    debug!("selected suite {suite:?}");

    let mut random = [0u8; 32];
    OsRng.fill_bytes(&mut random);

    let mut server_hello = ServerHelloBody {
        random,
        legacy_session_id: client_hello.legacy_session_id.clone(),
        cipher_suite: suite,
        extensions: ExtensionSet::new(),
    };
    server_hello.extensions.add(&ServerKeyShareExt(KeyShareEntry {
        group,
        key_exchange: server_public,
    }))?;
    let shm = hs_out.write_body(&server_hello)?;
    debug!("sent ServerHello");

    let mut ctx = CryptoContext::init(&chm, &shm, &shared_secret, &shared_secret, suite)?;
    hs_in.rekey(
        suite,
        &ctx.handshake_keys.client_write_key,
        &ctx.handshake_keys.client_write_iv,
    )?;
    hs_out.rekey(
        suite,
        &ctx.handshake_keys.server_write_key,
        &ctx.handshake_keys.server_write_iv,
    )?;
    debug!("installed handshake traffic keys");

    // EncryptedExtensions goes out even when empty.
    let eem = hs_out.write_body(&EncryptedExtensionsBody::default())?;

    let certificate = CertificateBody {
        context: Vec::new(),
        certificate_list: credential
            .certificate_chain
            .iter()
            .map(|der| CertificateEntry {
                cert_data: der.clone(),
                extensions: Vec::new(),
            })
            .collect(),
    };
    let certm = hs_out.write_body(&certificate)?;

    // Sign {CH, SH, EE, Certificate} with the configured key.
    let mut signed = chm.encoded();
    signed.extend_from_slice(&shm.encoded());
    signed.extend_from_slice(&eem.encoded());
    signed.extend_from_slice(&certm.encoded());
    let digest = hkdf::digest(credential.algorithm.hash, &signed);
    let signature = credential.private_key.sign(credential.algorithm, &digest)?;
    let cvm = hs_out.write_body(&CertificateVerifyBody {
        algorithm: credential.algorithm,
        signature,
    })?;
    debug!("sent Certificate and CertificateVerify");

    ctx.update([&eem, &certm, &cvm])?;

    let server_finished = ctx.server_finished.clone();
    hs_out.write_body(&server_finished)?;
    debug!("sent server Finished");

    let (_, client_finished) = hs_in.read_body::<FinishedBody>()?;
    if client_finished.verify_data.len() != ctx.params().hash.digest_len() {
        return Err(Error::Decode("finished"));
    }
    ctx.verify_client_finished(&client_finished)?;
    debug!("verified client Finished");

    let app = ctx
        .application_keys
        .as_ref()
        .ok_or(Error::Internal("application keys missing"))?;
    hs_in.rekey(suite, &app.client_write_key, &app.client_write_iv)?;
    hs_out.rekey(suite, &app.server_write_key, &app.server_write_iv)?;
    debug!("installed application traffic keys");

    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerCredential;
    use crate::crypto::sign::SigningKey;
    use crate::crypto::{
        CipherSuite, HashAlgorithm, NamedGroup, SignatureAlgorithm, SignatureAndHash,
    };
    use crate::tls::client::client_handshake;
    use crate::transport::{pipe, Pipe};
    use std::sync::Arc;
    use std::thread;

    fn ecdsa_credential(name: &str) -> ServerCredential {
        ServerCredential::self_signed(
            name,
            SignatureAndHash::new(HashAlgorithm::Sha256, SignatureAlgorithm::Ecdsa),
            SigningKey::generate(SignatureAlgorithm::Ecdsa).unwrap(),
        )
        .unwrap()
    }

    fn layers(t: Pipe) -> (RecordLayer<Pipe>, RecordLayer<Pipe>) {
        let t = Arc::new(t);
        (RecordLayer::new(t.clone()), RecordLayer::new(t))
    }

    fn run_pair(
        client_config: Config,
        server_config: Config,
    ) -> (Result<CryptoContext>, Result<CryptoContext>) {
        let (ct, st) = pipe();
        let server = thread::spawn(move || {
            let (mut inbound, mut outbound) = layers(st);
            server_handshake(&server_config, &mut inbound, &mut outbound)
        });
        let client = {
            // Scope the client's layers so the pipe closes when the
            // client is done, unblocking a server stuck mid-read.
            let (mut inbound, mut outbound) = layers(ct);
            client_handshake(&client_config, &mut inbound, &mut outbound)
        };
        (client, server.join().unwrap())
    }

    #[test]
    fn drivers_complete_and_agree() {
        let mut client_config = Config::client("example.com");
        client_config.auth_callback = Some(Arc::new(|chain| {
            if chain.is_empty() {
                Err("empty chain".into())
            } else {
                Ok(())
            }
        }));
        let server_config = Config::server(ecdsa_credential("example.com"));

        let (client, server) = run_pair(client_config, server_config);
        let client = client.unwrap();
        let server = server.unwrap();

        // Transcript agreement, byte for byte.
        assert_eq!(client.transcript_hash(), server.transcript_hash());
        assert_eq!(client.suite(), server.suite());

        // Identical application traffic keys on both sides.
        let ck = client.application_keys.as_ref().unwrap();
        let sk = server.application_keys.as_ref().unwrap();
        assert_eq!(ck.client_write_key, sk.client_write_key);
        assert_eq!(ck.server_write_key, sk.server_write_key);

        // Direction asymmetry: the two directions never share keys.
        assert_ne!(ck.client_write_key, ck.server_write_key);
    }

    #[test]
    fn every_suite_and_group_negotiates() {
        for (suite, sig) in [
            (
                CipherSuite::EcdheEcdsaAes128GcmSha256,
                SignatureAlgorithm::Ecdsa,
            ),
            (
                CipherSuite::EcdheEcdsaAes256GcmSha384,
                SignatureAlgorithm::Ecdsa,
            ),
            (CipherSuite::EcdheRsaAes128GcmSha256, SignatureAlgorithm::Rsa),
        ] {
            for group in [NamedGroup::P256, NamedGroup::P384, NamedGroup::P521] {
                let mut client_config = Config::client("example.com");
                client_config.cipher_suites = vec![suite];
                client_config.groups = vec![group];
                let credential = ServerCredential::self_signed(
                    "example.com",
                    SignatureAndHash::new(HashAlgorithm::Sha256, sig),
                    SigningKey::generate(sig).unwrap(),
                )
                .unwrap();
                let server_config = Config::server(credential);

                let (client, server) = run_pair(client_config, server_config);
                let client = client.unwrap();
                let server = server.unwrap();
                assert_eq!(client.suite(), suite);
                assert_eq!(client.transcript_hash(), server.transcript_hash());
            }
        }
    }

    #[test]
    fn no_common_group_fails_handshake() {
        let mut client_config = Config::client("example.com");
        client_config.groups = vec![NamedGroup::P384];
        let mut server_config = Config::server(ecdsa_credential("example.com"));
        server_config.groups = vec![NamedGroup::P256];

        let (client, server) = run_pair(client_config, server_config);
        assert_eq!(
            server.unwrap_err(),
            Error::HandshakeFailure("no common key share group")
        );
        // The client fails reading past its ClientHello; the exact
        // error depends on whether the alert got out first.
        assert!(client.is_err());
    }

    #[test]
    fn no_common_suite_fails_handshake() {
        let mut client_config = Config::client("example.com");
        client_config.cipher_suites = vec![CipherSuite::EcdheEcdsaAes128GcmSha256];
        let mut server_config = Config::server(ecdsa_credential("example.com"));
        server_config.cipher_suites = vec![CipherSuite::EcdheRsaAes256GcmSha384];

        let (client, server) = run_pair(client_config, server_config);
        assert_eq!(
            server.unwrap_err(),
            Error::HandshakeFailure("no common cipher suite")
        );
        assert!(client.is_err());
    }

    #[test]
    fn server_preference_follows_client_order() {
        let mut client_config = Config::client("example.com");
        client_config.cipher_suites = vec![
            CipherSuite::EcdheEcdsaAes256GcmSha384,
            CipherSuite::EcdheEcdsaAes128GcmSha256,
        ];
        let server_config = Config::server(ecdsa_credential("example.com"));

        let (client, server) = run_pair(client_config, server_config);
        // The client listed the SHA-384 suite first, so that wins.
        assert_eq!(
            client.unwrap().suite(),
            CipherSuite::EcdheEcdsaAes256GcmSha384
        );
        assert_eq!(
            server.unwrap().suite(),
            CipherSuite::EcdheEcdsaAes256GcmSha384
        );
    }

    #[test]
    fn missing_credential_is_config_error() {
        let (_, st) = pipe();
        let (mut inbound, mut outbound) = layers(st);
        let config = Config::default();
        assert_eq!(
            server_handshake(&config, &mut inbound, &mut outbound).unwrap_err(),
            Error::Config("server credential not configured")
        );
    }

    #[test]
    fn wrong_signing_key_fails_client_verification() {
        // Certificate advertises one key, CertificateVerify is signed
        // with another: the client must refuse with DecryptError.
        let honest = ecdsa_credential("example.com");
        let mut credential = ecdsa_credential("example.com");
        credential.certificate_chain = honest.certificate_chain;

        let mut client_config = Config::client("example.com");
        client_config.auth_callback = Some(Arc::new(|_| Ok(())));
        let server_config = Config::server(credential);

        let (client, _server) = run_pair(client_config, server_config);
        assert_eq!(client.unwrap_err(), Error::DecryptError);
    }

    #[test]
    fn auth_callback_rejection_aborts() {
        let mut client_config = Config::client("example.com");
        client_config.auth_callback = Some(Arc::new(|_| Err("untrusted".into())));
        let server_config = Config::server(ecdsa_credential("example.com"));

        let (client, _server) = run_pair(client_config, server_config);
        assert_eq!(
            client.unwrap_err(),
            Error::BadCertificate("untrusted".into())
        );
    }

    #[test]
    fn without_callback_chain_is_not_checked() {
        // No auth callback configured: the mismatched signature above
        // would still fail, but a valid handshake with no callback
        // completes without inspecting the chain.
        let client_config = Config::client("example.com");
        let server_config = Config::server(ecdsa_credential("other.host"));
        let (client, server) = run_pair(client_config, server_config);
        client.unwrap();
        server.unwrap();
    }
}
