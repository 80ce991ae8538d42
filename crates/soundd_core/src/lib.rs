//! soundd Core - wire protocol, ring buffer, handles, and the audio engine.
//!
//! This crate provides the transport and realtime core of the sound-server
//! daemon:
//! - Framing and the structured protocol carried over `Payload::Structured`
//! - A byte ring buffer and the canonical-sample Handles built on it
//! - Per-stream and per-connection session state machines
//! - Device enumeration/selection and the Audio Engine's realtime callback
//! - Runtime configuration and its file-watching loader
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Listener thread                         │
//! │   TCP accept ──▶ one ContextSession per connection            │
//! └──────────────────────────────────────────────────────────────┘
//!                              │ EngineCommand / EngineEvent
//!                              ▼  (crossbeam-channel)
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Audio thread                            │
//! │   cpal input ──▶ Read Handles    Write Handles ──▶ cpal output│
//! │                                        │                       │
//! │                          mix bus ──▶ bass router ──▶ device   │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod constants;
mod context;
mod device;
mod engine;
mod error;
mod framing;
mod handle;
mod message;
mod protocol;
mod ring_buffer;
mod settings;
mod stream;

pub use config::{DaemonConfig, ServerConfig, SoundConfig};
pub use constants::{
    BASE_SAMPLE_RATE, DEFAULT_PORT, MAX_BYTES_ON_MESSAGE, NETWORK_BUFFER_SIZE, NEW_STREAM_ID,
    PROTOCOL_VERSION,
};
pub use context::{CloseReason, ContextError, ContextResult, ContextSession};
pub use device::{select_device, AudioDevice, DeviceType};
pub use engine::AudioEngine;
pub use error::{EngineError, EngineResult};
pub use framing::{Framer, FramerError, Message, MessageBuilder, MessageType, Payload, SimpleCode};
pub use handle::{Handle, HandleError, HandleResult, ReadHandle, TransferReport, WriteHandle};
pub use message::{EngineCommand, EngineEvent};
pub use protocol::{
    decode_client_message, encode_server_message, enqueue_server_stream, BufferConfig,
    ClientMessage, ClientStream, ClientStreamOp, Configuration, ContextConnect, Direction,
    ProtocolCodecError, SampleSpec, ServerMessage, ServerStream, ServerStreamOp, WireFormatTag,
};
pub use ring_buffer::RingBuffer;
pub use settings::ConfigWatcher;
pub use stream::{
    engine_pull_canonical, engine_push_canonical, validate_configuration, HandleSource,
    SessionError, SessionResult, SessionState, StreamSession,
};

// Re-export the DSP primitives the daemon's wire codec is built on, so a
// caller wiring up the engine never needs a direct `soundd_dsp` dependency.
pub use soundd_dsp::{
    fold_mix, from_canonical, sample_bytes, to_canonical, BassRange, BassRouterDispatcher,
    ChannelAssignment, ChannelLayout, DspError, Sample, TubeDispatcher, WireFormat, SILENCE,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        let _config = DaemonConfig::default();
        let _ = WireFormat::S32LE;
    }
}
