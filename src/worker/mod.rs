// src/worker/mod.rs

//! Worker processes.
//!
//! A worker is the `avian` binary re-executed with `--worker <id>`. The
//! master writes [`MasterMessage`]s to its stdin and reads
//! [`WorkerMessage`]s from its stdout, one JSON object per line. Worker logs
//! go to stderr, which is inherited from the master.

pub mod process;
pub mod protocol;
pub mod runner;

pub use process::{ProcessWorkerBackend, WorkerEnv};
pub use protocol::{MasterMessage, WorkerMessage};
pub use runner::{execute_job, run_worker};
