//! Hard constants from the wire protocol and the engine's data model.
//!
//! These are process-wide and compile-time; nothing here is configurable
//! at runtime (see [`crate::config`] for what is).

/// Largest declared length, in bytes, a single framed message may carry.
/// The framer rejects anything larger before reading a single payload byte.
pub const MAX_BYTES_ON_MESSAGE: u32 = 2048;

/// Size of the network scratch buffer each context reads into.
pub const NETWORK_BUFFER_SIZE: usize = 1024;

/// The only sample rate the engine accepts from clients.
pub const BASE_SAMPLE_RATE: u32 = 44_100;

/// Sentinel stream id meaning "allocate a new stream" on an inbound message.
pub const NEW_STREAM_ID: u32 = u32::MAX;

/// Default listening port for the wire protocol.
pub const DEFAULT_PORT: u16 = 7777;

/// Only defined protocol version.
pub const PROTOCOL_VERSION: u8 = 0x01;
