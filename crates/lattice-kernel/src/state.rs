//! Kernel lifecycle state machine.
//!
//! ```text
//! Idle ──initialize──▶ Loading ──ready──▶ Ready ──run──▶ Running
//!                         │                   ▲              │
//!                         └──error──▶ Error   └──────────────┘
//! any ──restart──▶ Idle            Error accepts only restart.
//! ```

use serde::{Deserialize, Serialize};

/// Errors from the orchestrator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum KernelError {
    #[error("operation '{operation}' not valid in state {state}")]
    InvalidState { state: KernelStatus, operation: &'static str },
    #[error("worker unavailable: {0}")]
    WorkerUnavailable(String),
    #[error("worker crashed")]
    WorkerCrashed,
    #[error("cell not found: {0}")]
    CellNotFound(String),
    #[error("malformed worker reply: {0}")]
    MalformedReply(String),
}

/// Kernel lifecycle states.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum KernelStatus {
    /// No worker; the first run initializes lazily.
    #[default]
    Idle,
    /// Worker booting; runs enqueue instead of failing.
    Loading,
    /// Worker up, queue empty.
    Ready,
    /// An execution is in flight.
    Running,
    /// Worker failed; only restart() is accepted.
    Error(String),
}

impl KernelStatus {
    pub fn is_error(&self) -> bool {
        matches!(self, KernelStatus::Error(_))
    }

    /// Whether a run may be submitted (directly or via the queue).
    pub fn accepts_run(&self) -> bool {
        matches!(
            self,
            KernelStatus::Idle | KernelStatus::Loading | KernelStatus::Ready | KernelStatus::Running
        )
    }
}

impl std::fmt::Display for KernelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KernelStatus::Idle => write!(f, "idle"),
            KernelStatus::Loading => write!(f, "loading"),
            KernelStatus::Ready => write!(f, "ready"),
            KernelStatus::Running => write!(f, "running"),
            KernelStatus::Error(msg) => write!(f, "error({msg})"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
