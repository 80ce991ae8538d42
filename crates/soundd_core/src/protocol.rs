//! Structured payload schema carried inside `Payload::Structured` bytes.
//!
//! These are contracts, not wire primitives: the framer only counts bytes,
//! it never looks inside a structured payload. Serialized with `serde_json`
//! — a concrete, inspectable stand-in for the tag-length-value tree the
//! original described in protobuf, which this workspace does not vendor.

use serde::{Deserialize, Serialize};

use crate::constants::NEW_STREAM_ID;
use crate::framing::{Framer, Payload};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Playback,
    Record,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireFormatTag {
    U8,
    S16LE,
    S16BE,
    S32LE,
    S32BE,
    F32LE,
    F32BE,
}

impl WireFormatTag {
    pub fn to_codec_format(self) -> soundd_dsp::WireFormat {
        match self {
            WireFormatTag::U8 => soundd_dsp::WireFormat::U8,
            WireFormatTag::S16LE => soundd_dsp::WireFormat::S16LE,
            WireFormatTag::S16BE => soundd_dsp::WireFormat::S16BE,
            WireFormatTag::S32LE => soundd_dsp::WireFormat::S32LE,
            WireFormatTag::S32BE => soundd_dsp::WireFormat::S32BE,
            WireFormatTag::F32LE => soundd_dsp::WireFormat::F32LE,
            WireFormatTag::F32BE => soundd_dsp::WireFormat::F32BE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleSpec {
    pub format: WireFormatTag,
    pub sample_rate: u32,
    pub channels: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferConfig {
    pub total: u32,
    pub prebuffer: u32,
    pub min_request: u32,
    pub fragment: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub sample_spec: SampleSpec,
    pub buffer_config: BufferConfig,
    pub direction: Direction,
    pub client_name: String,
    pub stream_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConnect {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientStreamOp {
    Connect { configuration: Configuration },
    Push { data: Vec<u8>, size: u32 },
    Pull { size: u32 },
    Close,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientStream {
    pub stream_id: u32,
    pub op: ClientStreamOp,
}

impl ClientStream {
    /// `true` when `stream_id` is the sentinel meaning "allocate a new stream".
    pub fn wants_new_stream(&self) -> bool {
        self.stream_id == NEW_STREAM_ID
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerStreamOp {
    ConnectConfirmal {
        opened: bool,
        configuration: Configuration,
    },
    Push {
        data: Vec<u8>,
        size: u32,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerStream {
    pub stream_id: u32,
    pub op: ServerStreamOp,
}

/// Top-level structured message alternatives. Names mirror the contract
/// documented for the wire protocol; these are the only shapes a
/// `Payload::Structured` blob may deserialize to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientMessage {
    ContextConnect(ContextConnect),
    Stream(ClientStream),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerMessage {
    Stream(ServerStream),
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolCodecError {
    #[error("structured payload failed to deserialize: {0}")]
    Deserialize(#[from] serde_json::Error),
}

pub fn decode_client_message(payload: &[u8]) -> Result<ClientMessage, ProtocolCodecError> {
    Ok(serde_json::from_slice(payload)?)
}

pub fn encode_server_message(message: &ServerMessage) -> Payload {
    // `ServerMessage` variants carry no non-serializable fields; encoding
    // cannot fail.
    let bytes = serde_json::to_vec(message).expect("ServerMessage always serializes");
    Payload::Structured(bytes)
}

/// Build and enqueue a `ServerMessage::Stream` reply on a framer. The
/// stream id is the one the caller already resolved (freshly allocated, for
/// a message that carried the new-stream sentinel, or echoed back
/// otherwise) — there is no separate patch-after-build step.
pub fn enqueue_server_stream(framer: &mut Framer, stream_id: u32, op: ServerStreamOp) {
    let message = ServerMessage::Stream(ServerStream { stream_id, op });
    let payload = encode_server_message(&message);
    framer
        .build()
        .with_type(crate::framing::MessageType::Structured)
        .with_payload(payload)
        .construct();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_configuration() -> Configuration {
        Configuration {
            sample_spec: SampleSpec {
                format: WireFormatTag::S32LE,
                sample_rate: 44_100,
                channels: 1,
            },
            buffer_config: BufferConfig {
                total: 44_100 * 4,
                prebuffer: 44_100,
                min_request: 220,
                fragment: 220,
            },
            direction: Direction::Playback,
            client_name: "demo".into(),
            stream_name: "main".into(),
        }
    }

    #[test]
    fn test_context_connect_round_trips() {
        let msg = ClientMessage::ContextConnect(ContextConnect { name: "demo".into() });
        let bytes = serde_json::to_vec(&msg).unwrap();
        let decoded = decode_client_message(&bytes).unwrap();
        match decoded {
            ClientMessage::ContextConnect(c) => assert_eq!(c.name, "demo"),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_client_stream_new_stream_sentinel() {
        let msg = ClientStream {
            stream_id: NEW_STREAM_ID,
            op: ClientStreamOp::Connect {
                configuration: sample_configuration(),
            },
        };
        assert!(msg.wants_new_stream());
    }

    #[test]
    fn test_client_stream_push_round_trips() {
        let msg = ClientMessage::Stream(ClientStream {
            stream_id: 0,
            op: ClientStreamOp::Push {
                data: vec![1, 2, 3, 4],
                size: 1,
            },
        });
        let bytes = serde_json::to_vec(&msg).unwrap();
        let decoded = decode_client_message(&bytes).unwrap();
        match decoded {
            ClientMessage::Stream(ClientStream {
                stream_id,
                op: ClientStreamOp::Push { data, size },
            }) => {
                assert_eq!(stream_id, 0);
                assert_eq!(data, vec![1, 2, 3, 4]);
                assert_eq!(size, 1);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_decode_malformed_payload_errors() {
        assert!(decode_client_message(b"not json").is_err());
    }
}
