//! DSP Error Types

use thiserror::Error;

/// Errors that can occur in the dispatchers. The codec itself is total
/// (every fixed-width input converts to something) so it carries no error type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DspError {
    #[error("channel index {index} out of range for {channels} channels")]
    ChannelOutOfRange { index: usize, channels: usize },

    #[error("buffer length {got} is not a multiple of frame size {frame_size}")]
    MisalignedBuffer { got: usize, frame_size: usize },

    #[error("bass router window of {0} samples is too short to transform")]
    WindowTooShort(usize),
}
