// src/coord/mod.rs

//! The master process.
//!
//! Everything the master reacts to arrives as a [`MasterEvent`] on one
//! channel:
//! - build lifecycle events from the pipeline loops
//! - messages and exits from worker processes
//! - scan / dispatch timer ticks
//! - shutdown requests (Ctrl-C)
//!
//! The build decisions live in the pure [`core::Coordinator`]; the async
//! shell that owns the supervisor and job dispatcher is
//! [`runtime::MasterRuntime`].

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::build::BuildEvent;
use crate::supervisor::WorkerId;
use crate::worker::protocol::WorkerMessage;

pub mod core;
pub mod runtime;

pub use self::core::{Coordinator, CoordinatorOptions, CoordinatorPhase, Decision, is_server_chunk};
pub use self::runtime::MasterRuntime;

/// Events flowing into the master loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MasterEvent {
    Build(BuildEvent),
    Worker {
        worker: WorkerId,
        message: WorkerMessage,
    },
    WorkerExited {
        worker: WorkerId,
        code: Option<i32>,
    },
    ScanTick,
    DispatchTick,
    ShutdownRequested,
}

/// Send `event` every `period` until the receiver goes away.
///
/// The first tick fires after one full period.
pub fn spawn_ticker(
    period: Duration,
    event: MasterEvent,
    tx: mpsc::Sender<MasterEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + period;
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if tx.send(event.clone()).await.is_err() {
                break;
            }
        }
    })
}
