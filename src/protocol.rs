//! JSON records exchanged with display consumers.
//!
//! Consumers send `{"cmd": ...}` records, the server answers with
//! `{"type": ...}` records. Anything that does not decode is dropped by the
//! caller without a reply.

use serde::{Deserialize, Serialize};

use crate::types::PositionState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    Calibrate,
    SetTotal {
        #[serde(default)]
        total: u32,
    },
    StartSim,
    StopSim,
    Reset,
    SetPosition {
        #[serde(default)]
        position: u32,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    State {
        position: u32,
        calibrated: bool,
        running: bool,
        total_chars: u32,
    },
    Calibrated {
        position: u32,
    },
    Position {
        position: u32,
    },
    Done,
}

impl From<PositionState> for ServerEvent {
    fn from(state: PositionState) -> Self {
        ServerEvent::State {
            position: state.position,
            calibrated: state.calibrated,
            running: state.running,
            total_chars: state.total_chars,
        }
    }
}

impl Command {
    pub fn decode(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl ServerEvent {
    pub fn decode(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
