//! Message types carried on the control-plane channels between the Audio
//! Engine's owning thread and its realtime audio thread.
//!
//! Commands flow from the owning thread to the audio thread; events flow
//! back, mirroring the teacher's `Command`/`Event` split in spirit, pared
//! down to what this daemon's engine lifecycle actually needs (no EQ/UI
//! concerns survive into this spec).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub enum EngineCommand {
    Start,
    Stop,
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum EngineEvent {
    Started,
    Stopped,
    Error { message: String },
    Underrun { deficit: usize },
    Overrun { dropped: usize },
}

impl EngineEvent {
    pub fn error<E: std::fmt::Display>(err: E) -> Self {
        EngineEvent::Error {
            message: err.to_string(),
        }
    }
}
