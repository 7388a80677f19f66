// src/supervisor/mod.rs

//! Worker pool supervision.
//!
//! The [`Supervisor`] owns the worker table and decides when workers are
//! spawned, retired and replaced. Talking to actual processes goes through a
//! [`WorkerBackend`]; production uses
//! [`crate::worker::ProcessWorkerBackend`], tests use a fake that only
//! records calls.

pub mod pool;

pub use pool::{ExitHandling, Supervisor, SupervisorOptions};

use crate::errors::Result;
use crate::worker::protocol::MasterMessage;

/// Identifier of one worker process. Never reused within a master's lifetime.
pub type WorkerId = u32;

/// How the supervisor reaches worker processes.
///
/// All methods are synchronous and must not block: a backend queues the
/// work and reports exits and worker messages back to the master as
/// [`crate::coord::MasterEvent`]s.
pub trait WorkerBackend: Send {
    /// Launch a worker identified by `id`.
    fn spawn_worker(&mut self, id: WorkerId) -> Result<()>;

    /// Queue `message` for delivery to worker `id`.
    fn send(&mut self, id: WorkerId, message: MasterMessage) -> Result<()>;

    /// Ask worker `id` to exit. Its exit is still reported later.
    fn terminate(&mut self, id: WorkerId) -> Result<()>;

    /// Forget any resources held for worker `id` after it has exited.
    fn release(&mut self, _id: WorkerId) {}
}
