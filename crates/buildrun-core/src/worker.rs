//! Worker records as kept by the store.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Worker is heartbeating and accepting work.
    #[default]
    Running,
    /// Worker stopped heartbeating; it may come back.
    Stalled,
    /// Worker is draining before going away for a while.
    Landing,
    /// Worker has drained.
    Landed,
    /// Worker is draining before going away for good.
    Retiring,
    /// Worker is gone.
    Retired,
}

impl WorkerState {
    /// Returns true if calls to this worker should not be attempted.
    pub fn is_stalled(&self) -> bool {
        matches!(self, Self::Stalled)
    }
}

/// A registered worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRecord {
    /// Unique worker name.
    pub name: String,

    /// Network address (`host:port`) of the worker's container API.
    /// Absent for placeholder registrations not yet placed on a node.
    pub addr: Option<String>,

    pub state: WorkerState,
}

impl WorkerRecord {
    /// Create a running worker reachable at `addr`.
    pub fn new(name: impl Into<String>, addr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            addr: Some(addr.into()),
            state: WorkerState::Running,
        }
    }

    /// Builder method to set the state.
    pub fn with_state(mut self, state: WorkerState) -> Self {
        self.state = state;
        self
    }

    /// Builder method to drop the address.
    pub fn without_addr(mut self) -> Self {
        self.addr = None;
        self
    }
}
