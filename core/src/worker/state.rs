use serde::{Deserialize, Serialize};

use crate::error::ControlError;

/// Worker lifecycle state.
///
/// ```text
/// Idle -> Starting -> Running -> Stopping -> Idle
///            |           |
///            +-> Idle    +-> Idle   (spawn failure / crash)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Idle,
    Starting,
    Running,
    Stopping,
}

/// Events that drive state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    StartRequested,
    Spawned,
    SpawnFailed,
    StopRequested,
    Stopped,
    Crashed,
}

impl WorkerState {
    /// Apply a transition, returning the new state or a domain error if the
    /// transition is not valid from the current state.
    pub fn apply(self, transition: Transition) -> Result<WorkerState, ControlError> {
        match (self, transition) {
            (WorkerState::Idle, Transition::StartRequested) => Ok(WorkerState::Starting),
            (WorkerState::Starting, Transition::Spawned) => Ok(WorkerState::Running),
            (WorkerState::Starting, Transition::SpawnFailed) => Ok(WorkerState::Idle),
            (WorkerState::Running, Transition::StopRequested) => Ok(WorkerState::Stopping),
            (WorkerState::Running, Transition::Crashed) => Ok(WorkerState::Idle),
            (WorkerState::Stopping, Transition::Stopped) => Ok(WorkerState::Idle),
            (state, t) => Err(ControlError::Domain(format!(
                "invalid transition {:?} from {}",
                t,
                state.label()
            ))),
        }
    }

    pub fn is_running(self) -> bool {
        matches!(self, WorkerState::Running)
    }

    pub fn label(self) -> &'static str {
        match self {
            WorkerState::Idle => "idle",
            WorkerState::Starting => "starting",
            WorkerState::Running => "running",
            WorkerState::Stopping => "stopping",
        }
    }
}
