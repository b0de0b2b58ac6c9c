//! Hello extensions.
//!
//! An [`ExtensionSet`] is an ordered list with per-type uniqueness,
//! serialised as `uint16 totalLen ‖ (uint16 type ‖ uint16 bodyLen ‖
//! body)*`. Bodies known to the core form a closed set of types, each
//! implementing [`ExtensionBody`]; unknown extensions are carried
//! opaquely so a set round-trips byte for byte.

use crate::crypto::ecdh::KeyExchange;
use crate::crypto::{NamedGroup, SignatureAndHash};
use crate::error::{Error, Result};
use crate::tls::codec::{put_u16, put_vec16, Reader};
use crate::tls::DRAFT_VERSION;

/// Extension type codes (draft numbering).
pub mod extension_type {
    pub const SERVER_NAME: u16 = 0;
    pub const SUPPORTED_GROUPS: u16 = 10;
    pub const SIGNATURE_ALGORITHMS: u16 = 13;
    pub const KEY_SHARE: u16 = 40;
    pub const DRAFT_VERSION: u16 = 0xff02;
}

/// A typed extension body that can serialise itself into, and parse
/// itself out of, a raw extension entry.
pub trait ExtensionBody: Sized {
    const EXTENSION_TYPE: u16;
    fn encode(&self) -> Result<Vec<u8>>;
    fn decode(body: &[u8]) -> Result<Self>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RawExtension {
    ext_type: u16,
    body: Vec<u8>,
}

/// Ordered extension list with per-type uniqueness.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionSet {
    entries: Vec<RawExtension>,
}

impl ExtensionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a typed extension. A second entry of the same type is
    /// `DuplicateExtension`.
    pub fn add<B: ExtensionBody>(&mut self, body: &B) -> Result<()> {
        if self.entries.iter().any(|e| e.ext_type == B::EXTENSION_TYPE) {
            return Err(Error::DuplicateExtension);
        }
        self.entries.push(RawExtension {
            ext_type: B::EXTENSION_TYPE,
            body: body.encode()?,
        });
        Ok(())
    }

    /// Look up and parse the extension of type `B`. Absence is
    /// `Ok(None)`; a present-but-malformed body is an error.
    pub fn find<B: ExtensionBody>(&self) -> Result<Option<B>> {
        match self
            .entries
            .iter()
            .find(|e| e.ext_type == B::EXTENSION_TYPE)
        {
            None => Ok(None),
            Some(e) => B::decode(&e.body).map(Some),
        }
    }

    pub(crate) fn encode_to(&self, out: &mut Vec<u8>) -> Result<()> {
        let mut body = Vec::new();
        for e in &self.entries {
            put_u16(&mut body, e.ext_type);
            put_vec16(&mut body, &e.body)?;
        }
        put_vec16(out, &body)
    }

    pub(crate) fn decode(r: &mut Reader<'_>) -> Result<Self> {
        let body = r.vec16("extension set")?;
        let mut sub = Reader::new(body);
        let mut set = Self::new();
        while !sub.is_empty() {
            let ext_type = sub.u16("extension type")?;
            let body = sub.vec16("extension body")?.to_vec();
            if set.entries.iter().any(|e| e.ext_type == ext_type) {
                return Err(Error::DuplicateExtension);
            }
            set.entries.push(RawExtension { ext_type, body });
        }
        Ok(set)
    }
}

// ---- Server name ----

/// SNI host name (one host_name entry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerNameExt(pub String);

impl ExtensionBody for ServerNameExt {
    const EXTENSION_TYPE: u16 = extension_type::SERVER_NAME;

    fn encode(&self) -> Result<Vec<u8>> {
        let name = self.0.as_bytes();
        let mut entry = Vec::with_capacity(3 + name.len());
        entry.push(0); // name_type = host_name
        put_vec16(&mut entry, name)?;
        let mut out = Vec::new();
        put_vec16(&mut out, &entry)?;
        Ok(out)
    }

    fn decode(body: &[u8]) -> Result<Self> {
        let mut r = Reader::new(body);
        let list = r.vec16("server name list")?;
        r.expect_end("server name")?;
        let mut lr = Reader::new(list);
        let name_type = lr.u8("server name type")?;
        if name_type != 0 {
            return Err(Error::Decode("server name type"));
        }
        let name = lr.vec16("server name")?;
        lr.expect_end("server name list")?;
        let name = std::str::from_utf8(name).map_err(|_| Error::Decode("server name"))?;
        Ok(Self(name.to_owned()))
    }
}

// ---- Supported groups ----

/// Groups offered for key agreement, in preference order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportedGroupsExt(pub Vec<NamedGroup>);

impl ExtensionBody for SupportedGroupsExt {
    const EXTENSION_TYPE: u16 = extension_type::SUPPORTED_GROUPS;

    fn encode(&self) -> Result<Vec<u8>> {
        let mut list = Vec::with_capacity(self.0.len() * 2);
        for group in &self.0 {
            put_u16(&mut list, group.to_u16());
        }
        let mut out = Vec::new();
        put_vec16(&mut out, &list)?;
        Ok(out)
    }

    fn decode(body: &[u8]) -> Result<Self> {
        let mut r = Reader::new(body);
        let list = r.vec16("supported groups")?;
        r.expect_end("supported groups")?;
        if list.len() % 2 != 0 {
            return Err(Error::Decode("supported groups"));
        }
        // Unknown groups are skipped, not rejected.
        let groups = list
            .chunks_exact(2)
            .filter_map(|c| NamedGroup::from_u16(u16::from_be_bytes([c[0], c[1]])))
            .collect();
        Ok(Self(groups))
    }
}

// ---- Signature algorithms ----

/// (hash, signature) pairs the sender accepts, in preference order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureAlgorithmsExt(pub Vec<SignatureAndHash>);

impl ExtensionBody for SignatureAlgorithmsExt {
    const EXTENSION_TYPE: u16 = extension_type::SIGNATURE_ALGORITHMS;

    fn encode(&self) -> Result<Vec<u8>> {
        let mut list = Vec::with_capacity(self.0.len() * 2);
        for alg in &self.0 {
            list.push(alg.hash.to_u8());
            list.push(alg.signature.to_u8());
        }
        let mut out = Vec::new();
        put_vec16(&mut out, &list)?;
        Ok(out)
    }

    fn decode(body: &[u8]) -> Result<Self> {
        let mut r = Reader::new(body);
        let list = r.vec16("signature algorithms")?;
        r.expect_end("signature algorithms")?;
        if list.len() % 2 != 0 {
            return Err(Error::Decode("signature algorithms"));
        }
        let algs = list
            .chunks_exact(2)
            .filter_map(|c| {
                use crate::crypto::{HashAlgorithm, SignatureAlgorithm};
                Some(SignatureAndHash {
                    hash: HashAlgorithm::from_u8(c[0])?,
                    signature: SignatureAlgorithm::from_u8(c[1])?,
                })
            })
            .collect();
        Ok(Self(algs))
    }
}

// ---- Key share ----

/// One (group, public value) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyShareEntry {
    pub group: NamedGroup,
    pub key_exchange: KeyExchange,
}

impl KeyShareEntry {
    fn encode_to(&self, out: &mut Vec<u8>) -> Result<()> {
        put_u16(out, self.group.to_u16());
        put_vec16(out, &self.key_exchange)
    }

    /// Parse one entry; `Ok(None)` for an unknown group (skipped).
    fn decode_from(r: &mut Reader<'_>) -> Result<Option<Self>> {
        let group = r.u16("key share group")?;
        let key = r.vec16("key share value")?;
        match NamedGroup::from_u16(group) {
            None => Ok(None),
            Some(group) => {
                let key_exchange = KeyExchange::from_slice(key)
                    .map_err(|_| Error::Decode("key share value"))?;
                Ok(Some(KeyShareEntry {
                    group,
                    key_exchange,
                }))
            }
        }
    }
}

/// The client's key_share: a sequence of entries, one per offered
/// group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientKeySharesExt(pub Vec<KeyShareEntry>);

impl ExtensionBody for ClientKeySharesExt {
    const EXTENSION_TYPE: u16 = extension_type::KEY_SHARE;

    fn encode(&self) -> Result<Vec<u8>> {
        let mut list = Vec::new();
        for share in &self.0 {
            share.encode_to(&mut list)?;
        }
        let mut out = Vec::new();
        put_vec16(&mut out, &list)?;
        Ok(out)
    }

    fn decode(body: &[u8]) -> Result<Self> {
        let mut r = Reader::new(body);
        let list = r.vec16("key share list")?;
        r.expect_end("key share")?;
        let mut lr = Reader::new(list);
        let mut shares = Vec::new();
        while !lr.is_empty() {
            if let Some(entry) = KeyShareEntry::decode_from(&mut lr)? {
                shares.push(entry);
            }
        }
        Ok(Self(shares))
    }
}

/// The server's key_share: exactly one entry, no list framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerKeyShareExt(pub KeyShareEntry);

impl ExtensionBody for ServerKeyShareExt {
    const EXTENSION_TYPE: u16 = extension_type::KEY_SHARE;

    fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.0.encode_to(&mut out)?;
        Ok(out)
    }

    fn decode(body: &[u8]) -> Result<Self> {
        let mut r = Reader::new(body);
        let entry =
            KeyShareEntry::decode_from(&mut r)?.ok_or(Error::Decode("key share group"))?;
        r.expect_end("key share")?;
        Ok(Self(entry))
    }
}

// ---- Draft version ----

/// Identifies the draft revision this implementation speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DraftVersionExt(pub u16);

impl Default for DraftVersionExt {
    fn default() -> Self {
        Self(DRAFT_VERSION)
    }
}

impl ExtensionBody for DraftVersionExt {
    const EXTENSION_TYPE: u16 = extension_type::DRAFT_VERSION;

    fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(2);
        put_u16(&mut out, self.0);
        Ok(out)
    }

    fn decode(body: &[u8]) -> Result<Self> {
        let mut r = Reader::new(body);
        let version = r.u16("draft version")?;
        r.expect_end("draft version")?;
        Ok(Self(version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{HashAlgorithm, SignatureAlgorithm};

    fn share(group: NamedGroup, byte: u8) -> KeyShareEntry {
        KeyShareEntry {
            group,
            key_exchange: KeyExchange::from_slice(&vec![byte; group.point_len()]).unwrap(),
        }
    }

    fn roundtrip_set(set: &ExtensionSet) -> ExtensionSet {
        let mut wire = Vec::new();
        set.encode_to(&mut wire).unwrap();
        let mut r = Reader::new(&wire);
        let parsed = ExtensionSet::decode(&mut r).unwrap();
        r.expect_end("wire").unwrap();
        parsed
    }

    #[test]
    fn add_find_roundtrip() {
        let mut set = ExtensionSet::new();
        set.add(&ServerNameExt("example.com".into())).unwrap();
        set.add(&SupportedGroupsExt(vec![NamedGroup::P256, NamedGroup::P384]))
            .unwrap();
        set.add(&DraftVersionExt::default()).unwrap();

        let parsed = roundtrip_set(&set);
        assert_eq!(parsed, set);

        let sni: ServerNameExt = parsed.find().unwrap().unwrap();
        assert_eq!(sni.0, "example.com");
        let groups: SupportedGroupsExt = parsed.find().unwrap().unwrap();
        assert_eq!(groups.0, vec![NamedGroup::P256, NamedGroup::P384]);
        let dv: DraftVersionExt = parsed.find().unwrap().unwrap();
        assert_eq!(dv.0, DRAFT_VERSION);
        let absent: Result<Option<SignatureAlgorithmsExt>> = parsed.find();
        assert_eq!(absent.unwrap(), None);
    }

    #[test]
    fn duplicate_add_rejected() {
        let mut set = ExtensionSet::new();
        set.add(&DraftVersionExt(9)).unwrap();
        assert_eq!(
            set.add(&DraftVersionExt(10)).unwrap_err(),
            Error::DuplicateExtension
        );
    }

    #[test]
    fn duplicate_on_the_wire_rejected() {
        // Two draft_version entries.
        let mut body = Vec::new();
        for _ in 0..2 {
            put_u16(&mut body, extension_type::DRAFT_VERSION);
            put_vec16(&mut body, &[0x00, 0x09]).unwrap();
        }
        let mut wire = Vec::new();
        put_vec16(&mut wire, &body).unwrap();
        let mut r = Reader::new(&wire);
        assert_eq!(
            ExtensionSet::decode(&mut r).unwrap_err(),
            Error::DuplicateExtension
        );
    }

    #[test]
    fn declared_length_must_match() {
        // totalLen claims 6 but only 4 bytes follow.
        let wire = [0x00, 0x06, 0xff, 0x02, 0x00, 0x00];
        let mut r = Reader::new(&wire);
        assert!(ExtensionSet::decode(&mut r).is_err());
    }

    #[test]
    fn client_key_shares_roundtrip() {
        let ext = ClientKeySharesExt(vec![
            share(NamedGroup::P256, 1),
            share(NamedGroup::P384, 2),
            share(NamedGroup::P521, 3),
        ]);
        let body = ext.encode().unwrap();
        let parsed = ClientKeySharesExt::decode(&body).unwrap();
        assert_eq!(parsed, ext);
        assert_eq!(body.len(), 2 + 3 * 4 + 65 + 97 + 133);
    }

    #[test]
    fn server_key_share_roundtrip() {
        let ext = ServerKeyShareExt(share(NamedGroup::P256, 7));
        let body = ext.encode().unwrap();
        let parsed = ServerKeyShareExt::decode(&body).unwrap();
        assert_eq!(parsed, ext);
        // No list framing: group ‖ len16 ‖ point.
        assert_eq!(body.len(), 2 + 2 + 65);
    }

    #[test]
    fn unknown_group_entries_are_skipped() {
        // group 29 (x25519) then a P-256 entry.
        let mut list = Vec::new();
        put_u16(&mut list, 29);
        put_vec16(&mut list, &[0u8; 32]).unwrap();
        put_u16(&mut list, 23);
        put_vec16(&mut list, &[4u8; 65]).unwrap();
        let mut body = Vec::new();
        put_vec16(&mut body, &list).unwrap();

        let parsed = ClientKeySharesExt::decode(&body).unwrap();
        assert_eq!(parsed.0.len(), 1);
        assert_eq!(parsed.0[0].group, NamedGroup::P256);
    }

    #[test]
    fn signature_algorithms_roundtrip() {
        let ext = SignatureAlgorithmsExt(vec![
            SignatureAndHash::new(HashAlgorithm::Sha256, SignatureAlgorithm::Rsa),
            SignatureAndHash::new(HashAlgorithm::Sha384, SignatureAlgorithm::Ecdsa),
            SignatureAndHash::new(HashAlgorithm::Sha512, SignatureAlgorithm::Rsa),
        ]);
        let parsed = SignatureAlgorithmsExt::decode(&ext.encode().unwrap()).unwrap();
        assert_eq!(parsed, ext);
    }

    #[test]
    fn server_name_rejects_bad_type_and_utf8() {
        // name_type 1 instead of 0.
        let mut entry = Vec::new();
        entry.push(1);
        put_vec16(&mut entry, b"example.com").unwrap();
        let mut body = Vec::new();
        put_vec16(&mut body, &entry).unwrap();
        assert!(ServerNameExt::decode(&body).is_err());

        // invalid UTF-8 host name.
        let mut entry = Vec::new();
        entry.push(0);
        put_vec16(&mut entry, &[0xff, 0xfe]).unwrap();
        let mut body = Vec::new();
        put_vec16(&mut body, &entry).unwrap();
        assert!(ServerNameExt::decode(&body).is_err());
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut body = DraftVersionExt(9).encode().unwrap();
        body.push(0x00);
        assert!(DraftVersionExt::decode(&body).is_err());
    }

    #[test]
    fn order_is_preserved() {
        let mut set = ExtensionSet::new();
        set.add(&DraftVersionExt::default()).unwrap();
        set.add(&ServerNameExt("a".into())).unwrap();
        let mut wire = Vec::new();
        set.encode_to(&mut wire).unwrap();
        // First entry after the 2-byte total length is draft_version.
        assert_eq!(
            u16::from_be_bytes([wire[2], wire[3]]),
            extension_type::DRAFT_VERSION
        );
    }
}
