//! Crate-wide error type.
//!
//! Every protocol failure carries one of the kinds below; `Error::alert`
//! names the fatal alert sent to the peer (when emission is still
//! possible) before the connection is torn down. The type is `Clone` so
//! the one-shot handshake error can be stored once and re-raised by
//! every later `Read`/`Write` on the same connection.

use std::io;

use thiserror::Error;

use crate::tls::alert::AlertDescription;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Malformed wire bytes; the operand names the structure being parsed.
    #[error("malformed {0}")]
    Decode(&'static str),
    /// A message arrived with the wrong type or out of order.
    #[error("unexpected message: {0}")]
    UnexpectedMessage(&'static str),
    /// A required extension was absent from a Hello.
    #[error("missing required extension: {0}")]
    MissingExtension(&'static str),
    /// An extension type appeared twice in one set.
    #[error("duplicate extension")]
    DuplicateExtension,
    /// Negotiation could not agree on a suite, group, or parameter.
    #[error("handshake failure: {0}")]
    HandshakeFailure(&'static str),
    /// The auth callback rejected the peer's chain, or no chain was sent.
    #[error("bad certificate: {0}")]
    BadCertificate(String),
    /// CertificateVerify signature verification failed.
    #[error("signature verification failed")]
    DecryptError,
    /// AEAD open failed, or a Finished verify_data mismatched.
    #[error("record authentication failed")]
    BadRecordMac,
    /// A record exceeded the permitted fragment length.
    #[error("record overflow")]
    RecordOverflow,
    /// The local configuration cannot support the requested role.
    #[error("invalid configuration: {0}")]
    Config(&'static str),
    /// A local invariant was broken.
    #[error("internal error: {0}")]
    Internal(&'static str),
    /// The peer sent a fatal alert.
    #[error("fatal alert from peer: {0:?}")]
    PeerAlert(AlertDescription),
    /// Transport-level I/O failure, surfaced unchanged.
    #[error("{msg}")]
    Io { kind: io::ErrorKind, msg: String },
}

impl Error {
    /// The fatal alert to emit for this error, if one applies.
    ///
    /// Peer alerts and transport errors have no outbound alert: the
    /// peer either already closed the conversation or cannot hear us.
    pub fn alert(&self) -> Option<AlertDescription> {
        match self {
            Error::Decode(_) | Error::DuplicateExtension => Some(AlertDescription::DecodeError),
            Error::UnexpectedMessage(_) => Some(AlertDescription::UnexpectedMessage),
            Error::MissingExtension(_) => Some(AlertDescription::MissingExtension),
            Error::HandshakeFailure(_) => Some(AlertDescription::HandshakeFailure),
            Error::BadCertificate(_) => Some(AlertDescription::BadCertificate),
            Error::DecryptError => Some(AlertDescription::DecryptError),
            Error::BadRecordMac => Some(AlertDescription::BadRecordMac),
            Error::RecordOverflow => Some(AlertDescription::RecordOverflow),
            Error::Config(_) | Error::Internal(_) => Some(AlertDescription::InternalError),
            Error::PeerAlert(_) | Error::Io { .. } => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io {
            kind: e.kind(),
            msg: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_mapping_matches_error_kind() {
        assert_eq!(
            Error::Decode("record header").alert(),
            Some(AlertDescription::DecodeError)
        );
        assert_eq!(
            Error::BadRecordMac.alert(),
            Some(AlertDescription::BadRecordMac)
        );
        assert_eq!(
            Error::HandshakeFailure("no common suite").alert(),
            Some(AlertDescription::HandshakeFailure)
        );
        assert_eq!(
            Error::Internal("poisoned lock").alert(),
            Some(AlertDescription::InternalError)
        );
    }

    #[test]
    fn no_alert_for_transport_errors() {
        let io_err = Error::from(io::Error::new(io::ErrorKind::TimedOut, "deadline"));
        assert_eq!(io_err.alert(), None);
        assert_eq!(
            Error::PeerAlert(AlertDescription::InternalError).alert(),
            None
        );
    }

    #[test]
    fn io_errors_stay_cloneable() {
        let e = Error::from(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"));
        let e2 = e.clone();
        assert_eq!(e, e2);
    }
}
