//! Per-connection state machine: owns the framer, the set of child Stream
//! Sessions, and the outgoing reply queue. Routes inbound structured
//! messages either to the context itself (`Context.Connect`) or down to one
//! of its streams by id, and batches replies behind client-issued `TRAIL`
//! markers.
//!
//! This type does not own a socket directly — the daemon binary's
//! per-connection thread drives it by calling [`ContextSession::next_needed`]
//! to learn how many bytes to read, feeding them to
//! [`ContextSession::feed`], and writing whatever
//! [`ContextSession::drain_outgoing`] returns back to the client. A `feed`
//! that returns `Err` is this context's fatal protocol error: the spec calls
//! for notifying the owning server with reason `ABORTING` and tearing the
//! connection down, which the caller performs since `ContextSession` itself
//! holds no reference back to its listener.

use std::collections::HashMap;

use thiserror::Error;

use crate::framing::{Framer, FramerError, MessageType, Payload, SimpleCode};
use crate::protocol::{
    self, ClientMessage, ClientStream, ProtocolCodecError, ServerStreamOp,
};
use crate::stream::{HandleSource, SessionError, StreamSession};

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("stream id {0} is out of bounds")]
    UnknownStream(u32),

    #[error("unexpected inbound simple code: {0}")]
    UnexpectedSimpleCode(&'static str),

    #[error("failed to decode structured payload: {0}")]
    Decode(#[from] ProtocolCodecError),

    #[error("framing error: {0}")]
    Framer(#[from] FramerError),
}

pub type ContextResult<T> = Result<T, ContextError>;

/// Why a context's connection is going away — surfaced to the server's
/// bookkeeping, not to the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Clean client-initiated shutdown.
    Closing,
    /// Unrecoverable protocol error.
    Aborting,
}

pub struct ContextSession {
    framer: Framer,
    streams: HashMap<u32, StreamSession>,
    next_stream_id: u32,
    client_name: Option<String>,
}

impl Default for ContextSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextSession {
    pub fn new() -> Self {
        Self {
            framer: Framer::new(),
            streams: HashMap::new(),
            next_stream_id: 0,
            client_name: None,
        }
    }

    pub fn client_name(&self) -> Option<&str> {
        self.client_name.as_deref()
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Bytes the caller must read off the socket before the next `feed`.
    pub fn next_needed(&self) -> usize {
        self.framer.next_needed()
    }

    /// Feed exactly `next_needed()` bytes read from the socket. Any parsed
    /// messages are processed immediately and their replies enqueued; an
    /// `Err` here is fatal to the whole connection.
    pub fn feed(&mut self, bytes: &[u8], handles: &dyn HandleSource) -> ContextResult<()> {
        self.framer.feed(bytes)?;

        while let Some(message) = self.framer.next_parsed() {
            self.process(message.payload, handles)?;
        }
        Ok(())
    }

    fn process(&mut self, payload: Payload, handles: &dyn HandleSource) -> ContextResult<()> {
        match payload {
            Payload::Simple(SimpleCode::Trail) => {
                self.on_trail();
                Ok(())
            }
            Payload::Simple(SimpleCode::Ack) => {
                Err(ContextError::UnexpectedSimpleCode("ACK is outbound-only"))
            }
            Payload::Simple(SimpleCode::Error) => {
                Err(ContextError::UnexpectedSimpleCode("ERROR is outbound-only"))
            }
            Payload::Structured(bytes) => {
                let message = protocol::decode_client_message(&bytes)?;
                match message {
                    ClientMessage::ContextConnect(connect) => {
                        self.on_connect(connect.name);
                        Ok(())
                    }
                    ClientMessage::Stream(stream_message) => self.on_stream_message(stream_message, handles),
                }
            }
        }
    }

    fn on_connect(&mut self, name: String) {
        self.client_name = Some(name);
        self.enqueue_ack();
    }

    fn on_stream_message(
        &mut self,
        message: ClientStream,
        handles: &dyn HandleSource,
    ) -> ContextResult<()> {
        let stream_id = if message.wants_new_stream() {
            let id = self.next_stream_id;
            self.next_stream_id += 1;
            self.streams.insert(id, StreamSession::new());
            id
        } else {
            if !self.streams.contains_key(&message.stream_id) {
                // Stream id out of bounds is a fatal protocol error (§4.7):
                // no reply is owed, the connection is about to be aborted.
                return Err(ContextError::UnknownStream(message.stream_id));
            }
            message.stream_id
        };

        let session = self
            .streams
            .get_mut(&stream_id)
            .expect("stream_id was just inserted or validated above");

        let is_close = matches!(message.op, crate::protocol::ClientStreamOp::Close);
        match session.on_client_op(message.op, handles) {
            Ok(Some(server_op)) => {
                self.enqueue_stream_reply(stream_id, server_op);
            }
            Ok(None) => {
                self.enqueue_ack();
            }
            Err(SessionError::Handle(_)) | Err(SessionError::Configuration(_)) | Err(SessionError::InvalidState { .. }) | Err(SessionError::AlreadyConfigured) => {
                self.enqueue_error();
            }
        }

        if is_close {
            self.streams.remove(&stream_id);
        }
        Ok(())
    }

    fn on_trail(&mut self) {
        self.framer
            .build()
            .with_type(MessageType::Simple)
            .with_payload(Payload::Simple(SimpleCode::Trail))
            .construct();
    }

    fn enqueue_ack(&mut self) {
        self.framer
            .build()
            .with_type(MessageType::Simple)
            .with_payload(Payload::Simple(SimpleCode::Ack))
            .construct();
    }

    fn enqueue_error(&mut self) {
        self.framer
            .build()
            .with_type(MessageType::Simple)
            .with_payload(Payload::Simple(SimpleCode::Error))
            .construct();
    }

    fn enqueue_stream_reply(&mut self, stream_id: u32, op: ServerStreamOp) {
        protocol::enqueue_server_stream(&mut self.framer, stream_id, op);
    }

    /// Encode and drain every reply queued so far, in order, as wire bytes.
    pub fn drain_outgoing(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(message) = self.framer.next_built() {
            out.extend(message.encode());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::BASE_SAMPLE_RATE;
    use crate::handle::{Handle, ReadHandle, WriteHandle};
    use crate::protocol::{
        BufferConfig, ClientStreamOp, Configuration, ContextConnect, Direction, SampleSpec,
        WireFormatTag,
    };
    use std::sync::Arc;

    struct FakeHandles;
    impl HandleSource for FakeHandles {
        fn acquire_handle(&self, configuration: &Configuration) -> Arc<Handle> {
            match configuration.direction {
                Direction::Playback => Arc::new(Handle::Write(WriteHandle::new(
                    configuration.sample_spec.format.to_codec_format(),
                    0,
                ))),
                Direction::Record => Arc::new(Handle::Read(ReadHandle::new(
                    configuration.sample_spec.format.to_codec_format(),
                ))),
            }
        }
    }

    fn configuration() -> Configuration {
        Configuration {
            sample_spec: SampleSpec {
                format: WireFormatTag::S32LE,
                sample_rate: BASE_SAMPLE_RATE,
                channels: 1,
            },
            buffer_config: BufferConfig {
                total: 1024,
                prebuffer: 0,
                min_request: 1,
                fragment: 1,
            },
            direction: Direction::Playback,
            client_name: "demo".into(),
            stream_name: "main".into(),
        }
    }

    fn feed_structured(context: &mut ContextSession, message: &ClientMessage, handles: &dyn HandleSource) {
        let bytes = serde_json::to_vec(message).unwrap();
        let mut header = vec![(crate::constants::PROTOCOL_VERSION << 4) | 0x02];
        header.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        context.feed(&header, handles).unwrap();
        context.feed(&bytes, handles).unwrap();
    }

    fn feed_trail(context: &mut ContextSession, handles: &dyn HandleSource) {
        let mut header = vec![(crate::constants::PROTOCOL_VERSION << 4) | 0x01];
        header.extend_from_slice(&2u32.to_le_bytes()); // TRAIL
        context.feed(&header, handles).unwrap();
    }

    #[test]
    fn test_scenario_connect_then_trail_acks() {
        let mut context = ContextSession::new();
        let handles = FakeHandles;
        feed_structured(
            &mut context,
            &ClientMessage::ContextConnect(ContextConnect { name: "demo".into() }),
            &handles,
        );
        feed_trail(&mut context, &handles);

        let wire = context.drain_outgoing();
        // ACK (5 bytes) then TRAIL (5 bytes).
        assert_eq!(wire.len(), 10);
        assert_eq!(context.client_name(), Some("demo"));
    }

    #[test]
    fn test_new_stream_sentinel_allocates_and_assigns_id() {
        let mut context = ContextSession::new();
        let handles = FakeHandles;
        feed_structured(
            &mut context,
            &ClientMessage::Stream(ClientStream {
                stream_id: u32::MAX,
                op: ClientStreamOp::Connect {
                    configuration: configuration(),
                },
            }),
            &handles,
        );
        assert_eq!(context.stream_count(), 1);
    }

    #[test]
    fn test_unknown_stream_id_feed_returns_err() {
        let mut context = ContextSession::new();
        let handles = FakeHandles;
        let message = ClientMessage::Stream(ClientStream {
            stream_id: 42,
            op: ClientStreamOp::Push {
                data: vec![],
                size: 0,
            },
        });
        let bytes = serde_json::to_vec(&message).unwrap();
        let mut header = vec![(crate::constants::PROTOCOL_VERSION << 4) | 0x02];
        header.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        context.feed(&header, &handles).unwrap();
        let err = context.feed(&bytes, &handles).unwrap_err();
        assert!(matches!(err, ContextError::UnknownStream(42)));
    }

    #[test]
    fn test_close_removes_stream_from_table() {
        let mut context = ContextSession::new();
        let handles = FakeHandles;
        feed_structured(
            &mut context,
            &ClientMessage::Stream(ClientStream {
                stream_id: u32::MAX,
                op: ClientStreamOp::Connect {
                    configuration: configuration(),
                },
            }),
            &handles,
        );
        assert_eq!(context.stream_count(), 1);
        feed_structured(
            &mut context,
            &ClientMessage::Stream(ClientStream {
                stream_id: 0,
                op: ClientStreamOp::Close,
            }),
            &handles,
        );
        assert_eq!(context.stream_count(), 0);
    }

    #[test]
    fn test_oversized_declared_length_errors_before_payload() {
        let mut context = ContextSession::new();
        let handles = FakeHandles;
        let mut header = vec![(crate::constants::PROTOCOL_VERSION << 4) | 0x02];
        header.extend_from_slice(&(crate::constants::MAX_BYTES_ON_MESSAGE + 1).to_le_bytes());
        assert!(context.feed(&header, &handles).is_err());
    }
}
