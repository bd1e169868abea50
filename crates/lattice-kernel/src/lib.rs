//! # lattice-kernel
//!
//! The notebook execution orchestrator: an external-worker-backed Python
//! kernel with a run queue, a lifecycle state machine, per-execution output
//! streaming, on-demand package installation, and batch semantics
//! (Run All / Above / Below / Interrupt / Restart). The production worker
//! is a `python3` subprocess speaking newline-delimited JSON; tests drive
//! the orchestrator with an in-memory scripted worker.

pub mod apply;
pub mod orchestrator;
pub mod packages;
pub mod protocol;
pub mod state;
pub mod worker;

pub use apply::apply_message;
pub use orchestrator::{
    ExecHandle, ExecMessage, InterruptHandle, KernelEvent, Orchestrator, STREAM_LIMIT,
};
pub use packages::{PackageAction, PackageEvent, PackageResolver, classify, scan_imports};
pub use protocol::{WorkerReply, WorkerRequest};
pub use state::{KernelError, KernelStatus};
pub use worker::{
    KernelWorker, ScriptedSpawner, ScriptedWorker, SubprocessSpawner, SubprocessWorker,
    WorkerSpawner,
};
