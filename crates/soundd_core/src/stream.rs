//! Per-stream state machine: `UNCONFIGURED -> CREATING -> READY ->
//! (TERMINATED|FAILED)`. Owns one [`Handle`]; consumes stream messages
//! (connect, push, pull, close) and hands back the structured replies its
//! owning [`crate::context::ContextSession`] enqueues on the wire.

use std::sync::Arc;

use soundd_dsp::Sample;
use thiserror::Error;

use crate::constants::BASE_SAMPLE_RATE;
use crate::handle::{Handle, HandleError, ReadHandle, TransferReport, WriteHandle};
use crate::protocol::{ClientStreamOp, Configuration, Direction, ServerStreamOp};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("stream already configured")]
    AlreadyConfigured,

    #[error("operation {op} is not valid in state {state:?}")]
    InvalidState { state: SessionState, op: &'static str },

    #[error("configuration rejected: {0}")]
    Configuration(String),

    #[error("handle error: {0}")]
    Handle(#[from] HandleError),
}

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconfigured,
    Creating,
    Ready,
    Terminated,
    Failed,
}

/// Validates a client-declared configuration against the engine's fixed
/// contract: sample rate must equal the base rate, the client side of a
/// handle always carries exactly one channel (the engine itself fans out
/// to device channels). Format is always valid — wire formats are an
/// exhaustively-enumerated tag.
pub fn validate_configuration(configuration: &Configuration) -> SessionResult<()> {
    if configuration.sample_spec.sample_rate != BASE_SAMPLE_RATE {
        return Err(SessionError::Configuration(format!(
            "sample_rate {} != base rate {}",
            configuration.sample_spec.sample_rate, BASE_SAMPLE_RATE
        )));
    }
    if configuration.sample_spec.channels != 1 {
        return Err(SessionError::Configuration(format!(
            "channels {} != 1",
            configuration.sample_spec.channels
        )));
    }
    Ok(())
}

/// Supplies a fresh [`Handle`] for a validated configuration. Implemented
/// by the Audio Engine; kept as a trait here so `StreamSession` does not
/// need to depend on the engine's concrete type.
pub trait HandleSource {
    fn acquire_handle(&self, configuration: &Configuration) -> Arc<Handle>;
}

pub struct StreamSession {
    state: SessionState,
    configuration: Option<Configuration>,
    handle: Option<Arc<Handle>>,
}

impl Default for StreamSession {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Unconfigured,
            configuration: None,
            handle: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn configuration(&self) -> Option<&Configuration> {
        self.configuration.as_ref()
    }

    pub fn handle(&self) -> Option<&Arc<Handle>> {
        self.handle.as_ref()
    }

    /// Dispatch one inbound stream op, returning the structured reply to
    /// enqueue, if the op produces one beyond a bare ACK.
    pub fn on_client_op(
        &mut self,
        op: ClientStreamOp,
        handles: &dyn HandleSource,
    ) -> SessionResult<Option<ServerStreamOp>> {
        match op {
            ClientStreamOp::Connect { configuration } => {
                self.on_connect(configuration, handles).map(Some)
            }
            ClientStreamOp::Push { data, size } => self.on_push(&data, size as usize).map(|_| None),
            ClientStreamOp::Pull { size } => self.on_pull(size as usize).map(Some),
            ClientStreamOp::Close => {
                self.on_close();
                Ok(None)
            }
        }
    }

    fn on_connect(
        &mut self,
        configuration: Configuration,
        handles: &dyn HandleSource,
    ) -> SessionResult<ServerStreamOp> {
        if self.state != SessionState::Unconfigured {
            self.state = SessionState::Failed;
            return Err(SessionError::AlreadyConfigured);
        }
        self.state = SessionState::Creating;

        if let Err(e) = validate_configuration(&configuration) {
            self.state = SessionState::Failed;
            return Err(e);
        }

        let handle = handles.acquire_handle(&configuration);
        self.handle = Some(handle);
        self.configuration = Some(configuration.clone());
        self.state = SessionState::Ready;

        Ok(ServerStreamOp::ConnectConfirmal {
            opened: true,
            configuration,
        })
    }

    fn on_push(&mut self, data: &[u8], n_frames: usize) -> SessionResult<TransferReport> {
        if self.state != SessionState::Ready {
            return Err(SessionError::InvalidState {
                state: self.state,
                op: "push",
            });
        }
        let configuration = self.configuration.as_ref().expect("ready implies configured");
        if configuration.direction != Direction::Playback {
            self.state = SessionState::Failed;
            return Err(SessionError::Configuration(
                "push is only valid on a PLAYBACK stream".into(),
            ));
        }
        let handle = self.handle.as_ref().expect("ready implies handle acquired");
        match handle.client_write(data, n_frames) {
            Ok(report) => Ok(report),
            Err(e) => {
                self.state = SessionState::Failed;
                Err(e.into())
            }
        }
    }

    fn on_pull(&mut self, n_frames: usize) -> SessionResult<ServerStreamOp> {
        if self.state != SessionState::Ready {
            return Err(SessionError::InvalidState {
                state: self.state,
                op: "pull",
            });
        }
        let configuration = self.configuration.as_ref().expect("ready implies configured");
        if configuration.direction != Direction::Record {
            self.state = SessionState::Failed;
            return Err(SessionError::Configuration(
                "pull is only valid on a RECORD stream".into(),
            ));
        }
        let handle = self.handle.as_ref().expect("ready implies handle acquired");
        let sample_bytes = configuration.sample_spec.format.to_codec_format().sample_bytes();
        let mut dest = vec![0u8; n_frames * sample_bytes];
        let report = handle
            .client_read(&mut dest, n_frames)
            .map_err(SessionError::from)?;
        Ok(ServerStreamOp::Push {
            data: dest,
            size: report.frames as u32,
        })
    }

    fn on_close(&mut self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
        self.state = SessionState::Terminated;
    }
}

/// Engine-side helper mirroring the engine's own read off a Write Handle;
/// kept here because only `StreamSession`/`WriteHandle` need to agree on
/// the canonical-sample scratch shape.
pub fn engine_pull_canonical(
    handle: &WriteHandle,
    out: &mut [Sample],
) -> Result<TransferReport, HandleError> {
    let n = out.len();
    handle.read(out, n)
}

/// Engine-side helper for Read Handles: push captured canonical samples.
pub fn engine_push_canonical(handle: &ReadHandle, samples: &[Sample]) -> Result<TransferReport, HandleError> {
    handle.write(samples, samples.len())
}
