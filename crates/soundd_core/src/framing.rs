//! Reusable framer/deframer for the wire protocol.
//!
//! Wire layout, one byte header followed by a 4-byte field and an optional
//! payload:
//!
//! ```text
//! byte 0:        (version:4 | type:4)
//! if type == SIMPLE:
//!   bytes 1..4:  u32 simple code (little-endian)
//! if type == STRUCTURED:
//!   bytes 1..4:  u32 payload length L (little-endian)
//!   bytes 5..5+L-1: serialized structured payload
//! ```
//!
//! The framer never buffers partial messages across calls: the caller is
//! expected to feed back exactly [`Framer::next_needed`] bytes each time
//! (the owning [`crate::context::ContextSession`]'s read loop asks first,
//! then reads exactly that many bytes off the socket).

use std::collections::VecDeque;

use thiserror::Error;

use crate::constants::{MAX_BYTES_ON_MESSAGE, PROTOCOL_VERSION};

const HEADER_SIZE: usize = 5;

/// Protocol-error taxonomy for malformed or out-of-contract framing. Fatal
/// at the [`crate::context::ContextSession`] level: any `FramerError`
/// aborts the connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramerError {
    #[error("unsupported protocol version {0:#x}")]
    UnsupportedVersion(u8),

    #[error("unknown message type tag {0:#x}")]
    UnknownType(u8),

    #[error("unknown simple code {0}")]
    UnknownSimpleCode(u32),

    #[error("declared payload length {declared} exceeds MaxBytesOnMessage ({limit})")]
    PayloadTooLarge { declared: u32, limit: u32 },

    #[error("fed {got} bytes, framer expected exactly {expected}")]
    WrongFeedSize { expected: usize, got: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Simple,
    Structured,
}

impl MessageType {
    fn tag(self) -> u8 {
        match self {
            MessageType::Simple => 0x01,
            MessageType::Structured => 0x02,
        }
    }

    fn from_tag(tag: u8) -> Result<Self, FramerError> {
        match tag {
            0x01 => Ok(MessageType::Simple),
            0x02 => Ok(MessageType::Structured),
            other => Err(FramerError::UnknownType(other)),
        }
    }
}

/// The three simple reply tokens the protocol defines. Any other 4-byte
/// code in a SIMPLE message is a protocol error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimpleCode {
    Ack = 0,
    Error = 1,
    Trail = 2,
}

impl SimpleCode {
    fn from_u32(code: u32) -> Result<Self, FramerError> {
        match code {
            0 => Ok(SimpleCode::Ack),
            1 => Ok(SimpleCode::Error),
            2 => Ok(SimpleCode::Trail),
            other => Err(FramerError::UnknownSimpleCode(other)),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Payload {
    Simple(SimpleCode),
    Structured(Vec<u8>),
}

/// A fully parsed or fully built message. Constructed and read only
/// through a [`Framer`]; never shared across framers.
#[derive(Debug, Clone)]
pub struct Message {
    pub version: u8,
    pub msg_type: MessageType,
    pub payload: Payload,
}

impl Message {
    /// Serialize to the wire layout described above.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE);
        out.push((self.version << 4) | self.msg_type.tag());
        match &self.payload {
            Payload::Simple(code) => {
                out.extend_from_slice(&(*code as u32).to_le_bytes());
            }
            Payload::Structured(bytes) => {
                out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                out.extend_from_slice(bytes);
            }
        }
        out
    }
}

/// Builder for outgoing messages: `framer.build().with_type(..).with_payload(..).construct()`.
pub struct MessageBuilder<'a> {
    framer: &'a mut Framer,
    version: u8,
    msg_type: MessageType,
    payload: Option<Payload>,
}

impl<'a> MessageBuilder<'a> {
    pub fn with_version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    pub fn with_type(mut self, msg_type: MessageType) -> Self {
        self.msg_type = msg_type;
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Push the built message onto the framer's outgoing queue.
    pub fn construct(self) -> &'a mut Framer {
        let message = Message {
            version: self.version,
            msg_type: self.msg_type,
            payload: self.payload.unwrap_or(Payload::Simple(SimpleCode::Ack)),
        };
        self.framer.built.push_back(message);
        self.framer
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Header,
    Payload { version: u8, len: usize },
}

/// Stateful parser/builder for the wire protocol. `HEADER -> PAYLOAD ->
/// HEADER -> ...`; a SIMPLE message never leaves HEADER.
pub struct Framer {
    stage: Stage,
    parsed: VecDeque<Message>,
    built: VecDeque<Message>,
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

impl Framer {
    pub fn new() -> Self {
        Self {
            stage: Stage::Header,
            parsed: VecDeque::new(),
            built: VecDeque::new(),
        }
    }

    /// Number of bytes the caller must read off the socket before the next
    /// call to [`Framer::feed`].
    pub fn next_needed(&self) -> usize {
        match self.stage {
            Stage::Header => HEADER_SIZE,
            Stage::Payload { len, .. } => len,
        }
    }

    /// Feed exactly `next_needed()` bytes. Appends a finished message to the
    /// parsed queue when one completes. Returns the new `next_needed()`.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<usize, FramerError> {
        if bytes.len() != self.next_needed() {
            return Err(FramerError::WrongFeedSize {
                expected: self.next_needed(),
                got: bytes.len(),
            });
        }

        match self.stage {
            Stage::Header => self.feed_header(bytes)?,
            Stage::Payload { version, .. } => {
                self.parsed.push_back(Message {
                    version,
                    msg_type: MessageType::Structured,
                    payload: Payload::Structured(bytes.to_vec()),
                });
                self.stage = Stage::Header;
            }
        }
        Ok(self.next_needed())
    }

    fn feed_header(&mut self, bytes: &[u8]) -> Result<(), FramerError> {
        let header = bytes[0];
        let version = header >> 4;
        let msg_type = MessageType::from_tag(header & 0x0F)?;
        if version != PROTOCOL_VERSION {
            return Err(FramerError::UnsupportedVersion(version));
        }

        let field = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        match msg_type {
            MessageType::Simple => {
                let code = SimpleCode::from_u32(field)?;
                self.parsed.push_back(Message {
                    version,
                    msg_type: MessageType::Simple,
                    payload: Payload::Simple(code),
                });
                // Stage stays HEADER.
            }
            MessageType::Structured => {
                if field > MAX_BYTES_ON_MESSAGE {
                    return Err(FramerError::PayloadTooLarge {
                        declared: field,
                        limit: MAX_BYTES_ON_MESSAGE,
                    });
                }
                if field == 0 {
                    self.parsed.push_back(Message {
                        version,
                        msg_type: MessageType::Structured,
                        payload: Payload::Structured(Vec::new()),
                    });
                } else {
                    self.stage = Stage::Payload {
                        version,
                        len: field as usize,
                    };
                }
            }
        }
        Ok(())
    }

    pub fn build(&mut self) -> MessageBuilder<'_> {
        MessageBuilder {
            framer: self,
            version: PROTOCOL_VERSION,
            msg_type: MessageType::Simple,
            payload: None,
        }
    }

    pub fn next_parsed(&mut self) -> Option<Message> {
        self.parsed.pop_front()
    }

    pub fn next_built(&mut self) -> Option<Message> {
        self.built.pop_front()
    }

    pub fn has_parsed(&self) -> bool {
        !self.parsed.is_empty()
    }

    pub fn has_built(&self) -> bool {
        !self.built.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_wire(code: SimpleCode) -> Vec<u8> {
        let mut framer = Framer::new();
        framer
            .build()
            .with_type(MessageType::Simple)
            .with_payload(Payload::Simple(code))
            .construct();
        framer.next_built().unwrap().encode()
    }

    #[test]
    fn test_framer_completeness_fed_in_next_needed_chunks() {
        let wire = simple_wire(SimpleCode::Ack);
        let mut framer = Framer::new();
        let mut offset = 0;
        while offset < wire.len() {
            let need = framer.next_needed();
            framer.feed(&wire[offset..offset + need]).unwrap();
            offset += need;
        }
        assert_eq!(offset, wire.len());
        let msg = framer.next_parsed().unwrap();
        assert!(matches!(msg.payload, Payload::Simple(SimpleCode::Ack)));
        assert!(framer.next_parsed().is_none());
    }

    #[test]
    fn test_framer_simple_round_trip() {
        let wire = simple_wire(SimpleCode::Trail);
        let mut framer = Framer::new();
        let need = framer.next_needed();
        assert_eq!(need, 5);
        framer.feed(&wire).unwrap();
        let msg = framer.next_parsed().unwrap();
        match msg.payload {
            Payload::Simple(SimpleCode::Trail) => {}
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_framer_two_back_to_back_messages() {
        let mut framer = Framer::new();
        framer
            .build()
            .with_type(MessageType::Simple)
            .with_payload(Payload::Simple(SimpleCode::Ack))
            .construct();
        framer
            .build()
            .with_type(MessageType::Simple)
            .with_payload(Payload::Simple(SimpleCode::Trail))
            .construct();
        let mut wire = Vec::new();
        wire.extend(framer.next_built().unwrap().encode());
        wire.extend(framer.next_built().unwrap().encode());

        let mut reader = Framer::new();
        let mut offset = 0;
        let mut messages = Vec::new();
        while offset < wire.len() {
            let need = reader.next_needed();
            reader.feed(&wire[offset..offset + need]).unwrap();
            offset += need;
            while let Some(m) = reader.next_parsed() {
                messages.push(m);
            }
        }
        assert_eq!(messages.len(), 2);
        assert!(matches!(messages[0].payload, Payload::Simple(SimpleCode::Ack)));
        assert!(matches!(messages[1].payload, Payload::Simple(SimpleCode::Trail)));
    }

    #[test]
    fn test_framer_structured_round_trip() {
        let mut framer = Framer::new();
        framer
            .build()
            .with_type(MessageType::Structured)
            .with_payload(Payload::Structured(b"hello".to_vec()))
            .construct();
        let wire = framer.next_built().unwrap().encode();

        let mut reader = Framer::new();
        let need = reader.next_needed();
        assert_eq!(need, 5);
        let remaining = reader.feed(&wire[..5]).unwrap();
        assert_eq!(remaining, 5); // b"hello".len()
        reader.feed(&wire[5..10]).unwrap();
        let msg = reader.next_parsed().unwrap();
        match msg.payload {
            Payload::Structured(bytes) => assert_eq!(bytes, b"hello"),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_framer_rejects_oversized_length_before_payload() {
        let mut framer = Framer::new();
        let mut header = Vec::new();
        header.push((PROTOCOL_VERSION << 4) | 0x02);
        header.extend_from_slice(&(MAX_BYTES_ON_MESSAGE + 1).to_le_bytes());
        let err = framer.feed(&header).unwrap_err();
        assert!(matches!(err, FramerError::PayloadTooLarge { .. }));
        // No payload bytes were ever requested: the framer should still be
        // sitting at a 5-byte header want, not some huge payload want.
    }

    #[test]
    fn test_framer_rejects_unknown_version() {
        let mut framer = Framer::new();
        let mut header = vec![0xF0]; // version 0xF, type 0x0 (invalid anyway)
        header.extend_from_slice(&0u32.to_le_bytes());
        assert!(framer.feed(&header).is_err());
    }

    #[test]
    fn test_framer_rejects_unknown_simple_code() {
        let mut framer = Framer::new();
        let mut header = vec![(PROTOCOL_VERSION << 4) | 0x01];
        header.extend_from_slice(&99u32.to_le_bytes());
        assert!(framer.feed(&header).is_err());
    }

    #[test]
    fn test_empty_structured_payload_completes_without_payload_stage() {
        let mut framer = Framer::new();
        let mut header = vec![(PROTOCOL_VERSION << 4) | 0x02];
        header.extend_from_slice(&0u32.to_le_bytes());
        let need = framer.feed(&header).unwrap();
        assert_eq!(need, 5);
        let msg = framer.next_parsed().unwrap();
        match msg.payload {
            Payload::Structured(bytes) => assert!(bytes.is_empty()),
            other => panic!("unexpected payload {other:?}"),
        }
    }
}
