//! Error taxonomy for the sound-server core.
//!
//! Each module that can fail on its own terms defines its own error enum
//! ([`crate::framing::FramerError`], [`crate::handle::HandleError`],
//! [`crate::stream::SessionError`]); [`EngineError`] aggregates them via
//! `#[from]` the way the teacher's top-level `EngineError` aggregates
//! `DspError`/`PlatformError`. Errors are local to the component that first
//! observes them: a `FramerError` tears down one
//! [`crate::context::ContextSession`], a `SessionError` fails one
//! [`crate::stream::StreamSession`], and only `EngineError::Device`
//! propagates all the way up to the daemon's exit code. Nothing here is
//! re-logged as it bubbles; the component that first sees an error logs it
//! once and converts it into the caller's action.

use thiserror::Error;

use crate::context::ContextError;
use crate::framing::FramerError;
use crate::handle::HandleError;
use crate::stream::SessionError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("protocol error: {0}")]
    Framer(#[from] FramerError),

    #[error("handle error: {0}")]
    Handle(#[from] HandleError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("context error: {0}")]
    Context(#[from] ContextError),

    #[error("device error: {0}")]
    Device(String),

    #[error("no audio devices found")]
    NoDevicesFound,

    #[error("reply queue backpressure, dropping response")]
    Backpressure,

    #[error("dsp error: {0}")]
    Dsp(#[from] soundd_dsp::DspError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::Handle(HandleError::Stalled);
        assert!(err.to_string().contains("stalled"));
    }

    #[test]
    fn test_error_from_dsp() {
        let dsp_err = soundd_dsp::DspError::WindowTooShort(0);
        let engine_err: EngineError = dsp_err.into();
        assert!(matches!(engine_err, EngineError::Dsp(_)));
    }

    #[test]
    fn test_error_from_framer() {
        let framer_err = FramerError::UnsupportedVersion(9);
        let engine_err: EngineError = framer_err.into();
        assert!(matches!(engine_err, EngineError::Framer(_)));
    }
}
