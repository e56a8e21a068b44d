//! Execution unit snapshots, as reported by the execution-unit service.

use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactSlot;

/// Lifecycle state of an execution unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitState {
    Queued,
    Locked,
    Running,
    Complete,
    Cancelled,
}

impl UnitState {
    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Cancelled)
    }
}

/// What the execution-unit service reports about one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSnapshot {
    pub uuid: String,
    pub state: UnitState,
    /// Effective priority, derived from the requests bound to the unit.
    pub priority: i64,
    /// Content-address handle of the produced output, if any.
    #[serde(default)]
    pub output: Option<String>,
    /// Content-address handle of the produced log, if any.
    #[serde(default)]
    pub log: Option<String>,
    #[serde(default)]
    pub exit_code: Option<i32>,
}

impl UnitSnapshot {
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Content-address handle produced for an artifact slot.
    pub fn handle(&self, slot: ArtifactSlot) -> Option<&str> {
        match slot {
            ArtifactSlot::Log => self.log.as_deref(),
            ArtifactSlot::Output => self.output.as_deref(),
        }
    }
}
