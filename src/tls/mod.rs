//! The TLS 1.3 (draft) protocol core: record framing, handshake
//! message framing, wire codecs, the key schedule, and the two
//! handshake drivers.

pub mod alert;
pub mod client;
pub(crate) mod codec;
pub mod extensions;
pub mod handshake;
pub mod key_schedule;
pub mod messages;
pub mod record;
pub mod server;
pub mod transcript;

/// Draft revision announced in the DraftVersion extension.
pub const DRAFT_VERSION: u16 = 9;
