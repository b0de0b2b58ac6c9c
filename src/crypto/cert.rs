//! Minimal X.509 plumbing.
//!
//! The core never evaluates PKI trust (that is the auth callback's
//! business); it only needs two things from a certificate: the leaf's
//! public key for CertificateVerify, and, for self-signed server
//! credentials, a way to wrap a SubjectPublicKeyInfo in a well-formed
//! DER certificate. Extraction scans for the algorithm OID rather
//! than fully parsing the TBS structure.

use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::RsaPublicKey;

use crate::crypto::sign::PublicKey;
use crate::crypto::NamedGroup;
use crate::error::{Error, Result};

// DER-encoded OIDs, tag and length included.
const OID_PRIME256V1: &[u8] = &[0x06, 0x08, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07];
const OID_SECP384R1: &[u8] = &[0x06, 0x05, 0x2b, 0x81, 0x04, 0x00, 0x22];
const OID_RSA_ENCRYPTION: &[u8] = &[
    0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01,
];
const OID_SHA256_WITH_RSA: &[u8] = &[
    0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x0b,
];
const OID_COMMON_NAME: &[u8] = &[0x06, 0x03, 0x55, 0x04, 0x03];

/// Extract the leaf public key from a DER certificate.
pub fn public_key_from_certificate(cert_der: &[u8]) -> Result<PublicKey> {
    if let Some(pos) = find_subsequence(cert_der, OID_PRIME256V1) {
        let point = extract_ec_point(cert_der, pos + OID_PRIME256V1.len(), NamedGroup::P256)?;
        let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(point)
            .map_err(|_| Error::Decode("certificate P-256 public key"))?;
        return Ok(PublicKey::EcdsaP256(key));
    }
    if let Some(pos) = find_subsequence(cert_der, OID_SECP384R1) {
        let point = extract_ec_point(cert_der, pos + OID_SECP384R1.len(), NamedGroup::P384)?;
        let key = p384::ecdsa::VerifyingKey::from_sec1_bytes(point)
            .map_err(|_| Error::Decode("certificate P-384 public key"))?;
        return Ok(PublicKey::EcdsaP384(key));
    }
    if let Some(pos) = find_subsequence(cert_der, OID_RSA_ENCRYPTION) {
        let key = extract_rsa_key(cert_der, pos + OID_RSA_ENCRYPTION.len())?;
        return Ok(PublicKey::Rsa(key));
    }
    Err(Error::Decode("certificate public key algorithm"))
}

/// Find the SubjectPublicKeyInfo BIT STRING following a curve OID and
/// return the uncompressed point inside it.
fn extract_ec_point(cert: &[u8], after: usize, group: NamedGroup) -> Result<&[u8]> {
    let want = group.point_len();
    let mut i = after;
    while i < cert.len() {
        if cert[i] == 0x03 {
            if let Ok((len, hdr_len)) = parse_asn1_length(&cert[i + 1..]) {
                // BIT STRING: one unused-bits byte, then the point.
                if len == want + 1 {
                    let start = i + 1 + hdr_len;
                    if cert.get(start) == Some(&0x00) && start + 1 + want <= cert.len() {
                        return Ok(&cert[start + 1..start + 1 + want]);
                    }
                }
            }
        }
        i += 1;
    }
    Err(Error::Decode("certificate EC public key"))
}

/// Find the BIT STRING after the rsaEncryption OID and parse the
/// PKCS#1 RSAPublicKey inside it.
fn extract_rsa_key(cert: &[u8], after: usize) -> Result<RsaPublicKey> {
    let mut i = after;
    while i < cert.len() {
        if cert[i] == 0x03 {
            if let Ok((len, hdr_len)) = parse_asn1_length(&cert[i + 1..]) {
                let start = i + 1 + hdr_len;
                if cert.get(start) == Some(&0x00) && start + len <= cert.len() {
                    let body = &cert[start + 1..start + len];
                    if let Ok(key) = RsaPublicKey::from_pkcs1_der(body) {
                        return Ok(key);
                    }
                }
            }
        }
        i += 1;
    }
    Err(Error::Decode("certificate RSA public key"))
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Parse a DER length; returns (length, bytes consumed by the length).
fn parse_asn1_length(data: &[u8]) -> Result<(usize, usize)> {
    let first = *data.first().ok_or(Error::Decode("DER length"))?;
    if first & 0x80 == 0 {
        return Ok((first as usize, 1));
    }
    let n = (first & 0x7f) as usize;
    if n == 0 || n > 4 || data.len() < 1 + n {
        return Err(Error::Decode("DER length"));
    }
    let mut len = 0usize;
    for &b in &data[1..1 + n] {
        len = (len << 8) | b as usize;
    }
    Ok((len, 1 + n))
}

fn encode_len(len: usize) -> Vec<u8> {
    if len < 0x80 {
        vec![len as u8]
    } else {
        let bytes = len.to_be_bytes();
        let skip = bytes.iter().take_while(|&&b| b == 0).count();
        let mut out = vec![0x80 | (bytes.len() - skip) as u8];
        out.extend_from_slice(&bytes[skip..]);
        out
    }
}

fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + content.len());
    out.push(tag);
    out.extend_from_slice(&encode_len(content.len()));
    out.extend_from_slice(content);
    out
}

/// Build a minimal DER certificate around a SubjectPublicKeyInfo.
///
/// The certificate names `common_name` as both issuer and subject and
/// carries a placeholder signature: endpoint authentication happens via
/// CertificateVerify, and chain validation belongs to the auth
/// callback, so the wrapper only has to be structurally valid DER.
pub fn build_certificate(spki_der: &[u8], common_name: &str) -> Result<Vec<u8>> {
    if common_name.is_empty() || common_name.len() > 64 {
        return Err(Error::Config("certificate common name length"));
    }

    let mut attr = Vec::new();
    attr.extend_from_slice(OID_COMMON_NAME);
    attr.extend_from_slice(&tlv(0x0c, common_name.as_bytes()));
    let name = tlv(0x30, &tlv(0x31, &tlv(0x30, &attr)));

    let mut validity = Vec::new();
    validity.extend_from_slice(&tlv(0x17, b"250101000000Z"));
    validity.extend_from_slice(&tlv(0x17, b"350101000000Z"));
    let validity = tlv(0x30, &validity);

    let mut sig_alg_body = Vec::new();
    sig_alg_body.extend_from_slice(OID_SHA256_WITH_RSA);
    sig_alg_body.extend_from_slice(&[0x05, 0x00]);
    let sig_alg = tlv(0x30, &sig_alg_body);

    let mut tbs = Vec::new();
    tbs.extend_from_slice(&tlv(0xa0, &[0x02, 0x01, 0x02])); // version v3
    tbs.extend_from_slice(&[0x02, 0x01, 0x01]); // serial 1
    tbs.extend_from_slice(&sig_alg);
    tbs.extend_from_slice(&name); // issuer
    tbs.extend_from_slice(&validity);
    tbs.extend_from_slice(&name); // subject
    tbs.extend_from_slice(spki_der);
    let tbs = tlv(0x30, &tbs);

    let mut sig_value = vec![0x00];
    sig_value.extend_from_slice(&[0u8; 16]); // placeholder signature

    let mut cert = Vec::new();
    cert.extend_from_slice(&tbs);
    cert.extend_from_slice(&sig_alg);
    cert.extend_from_slice(&tlv(0x03, &sig_value));
    Ok(tlv(0x30, &cert))
}
