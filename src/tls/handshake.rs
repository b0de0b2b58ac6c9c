//! Handshake message framing over one record-layer direction.
//!
//! A handshake message may span multiple records and a record may
//! carry several messages; [`HandshakeFrames`] buffers the
//! Handshake-content byte stream and cuts it at exact message
//! boundaries. Messages are returned with their original serialised
//! bytes so the transcript hashes what actually travelled.

use log::trace;

use crate::error::{Error, Result};
use crate::tls::alert::{Alert, AlertDescription, AlertLevel};
use crate::tls::messages::{HandshakeBody, HandshakeMessage, HandshakeType};
use crate::tls::record::{ContentType, RecordLayer, MAX_FRAGMENT_LEN};
use crate::transport::Transport;

const MESSAGE_HEADER_LEN: usize = 4;

/// Frames whole handshake messages over one record direction.
pub struct HandshakeFrames<'a, T: Transport> {
    records: &'a mut RecordLayer<T>,
    buffer: Vec<u8>,
}

impl<'a, T: Transport> HandshakeFrames<'a, T> {
    pub fn new(records: &'a mut RecordLayer<T>) -> Self {
        Self {
            records,
            buffer: Vec::new(),
        }
    }

    /// Rekey the underlying direction. The driver only rekeys at
    /// message boundaries; bytes buffered mid-message would mean a
    /// message straddled the key change.
    pub fn rekey(
        &mut self,
        suite: crate::crypto::CipherSuite,
        key: &[u8],
        iv: &[u8],
    ) -> Result<()> {
        if !self.buffer.is_empty() {
            return Err(Error::Internal("rekey inside a handshake message"));
        }
        self.records.rekey(suite, key, iv)
    }

    /// Read one whole handshake message, pulling records as needed.
    pub fn read_message(&mut self) -> Result<HandshakeMessage> {
        while self.buffer.len() < MESSAGE_HEADER_LEN {
            self.fill()?;
        }
        let length = ((self.buffer[1] as usize) << 16)
            | ((self.buffer[2] as usize) << 8)
            | self.buffer[3] as usize;
        while self.buffer.len() < MESSAGE_HEADER_LEN + length {
            self.fill()?;
        }

        let msg_type = HandshakeType::from_u8(self.buffer[0])
            .ok_or(Error::UnexpectedMessage("unknown handshake message type"))?;
        let mut raw: Vec<u8> = self
            .buffer
            .drain(..MESSAGE_HEADER_LEN + length)
            .collect();
        raw.drain(..MESSAGE_HEADER_LEN);
        trace!("read handshake message {msg_type:?} ({length} bytes)");
        Ok(HandshakeMessage {
            msg_type,
            body: raw,
        })
    }

    /// Read a message, asserting its type and parsing the body. The
    /// raw message comes back too, for the transcript.
    pub fn read_body<B: HandshakeBody>(&mut self) -> Result<(HandshakeMessage, B)> {
        let msg = self.read_message()?;
        let body = msg.parse::<B>()?;
        Ok((msg, body))
    }

    /// Serialise a body and emit it across one or more records.
    /// Returns the emitted message for the transcript.
    pub fn write_body<B: HandshakeBody>(&mut self, body: &B) -> Result<HandshakeMessage> {
        let msg = HandshakeMessage::from_body(body)?;
        let wire = msg.encoded();
        for chunk in wire.chunks(MAX_FRAGMENT_LEN) {
            self.records.write_record(ContentType::Handshake, chunk)?;
        }
        trace!("wrote handshake message {:?} ({} bytes)", msg.msg_type, wire.len());
        Ok(msg)
    }

    /// Pull one more record's worth of handshake bytes.
    fn fill(&mut self) -> Result<()> {
        let record = self.records.read_record()?;
        match record.content_type {
            ContentType::Handshake => {
                self.buffer.extend_from_slice(&record.fragment);
                Ok(())
            }
            ContentType::Alert => {
                let alert = Alert::decode(&record.fragment)?;
                match alert.level {
                    // Warnings other than close_notify are dropped.
                    AlertLevel::Warning
                        if alert.description != AlertDescription::CloseNotify =>
                    {
                        Ok(())
                    }
                    _ => Err(Error::PeerAlert(alert.description)),
                }
            }
            _ => Err(Error::UnexpectedMessage("non-handshake record mid-handshake")),
        }
    }
}
