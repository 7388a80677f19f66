// src/supervisor/pool.rs

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, error, info, warn};

use crate::errors::{AvianError, Result};
use crate::jobs::model::QueueEntry;
use crate::supervisor::{WorkerBackend, WorkerId};
use crate::worker::protocol::MasterMessage;

#[derive(Debug, Clone, Copy)]
pub struct SupervisorOptions {
    /// Workers per pool.
    pub pool_size: usize,
    /// Replace workers that exit on their own.
    pub auto_restart: bool,
}

#[derive(Debug, Default)]
struct WorkerSlot {
    pid: Option<u32>,
    ready: bool,
    in_flight: Vec<QueueEntry>,
}

impl WorkerSlot {
    fn is_idle(&self) -> bool {
        self.ready && self.in_flight.is_empty()
    }
}

/// What the supervisor did about an exited worker.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ExitHandling {
    /// The worker had been killed on purpose.
    pub was_retiring: bool,
    /// Replacement spawned for a crashed worker.
    pub replacement: Option<WorkerId>,
    /// Jobs the worker was running and never reported on.
    pub orphaned: Vec<QueueEntry>,
}

/// Owns the worker table.
///
/// Live workers sit in `workers`; workers killed on purpose move to
/// `retiring` until their exit arrives, so a planned kill is never mistaken
/// for a crash and never auto-restarted.
pub struct Supervisor<B: WorkerBackend> {
    backend: B,
    options: SupervisorOptions,
    workers: BTreeMap<WorkerId, WorkerSlot>,
    retiring: BTreeMap<WorkerId, WorkerSlot>,
    next_id: WorkerId,
    restart_in_progress: bool,
    shutting_down: bool,
    /// Last worker a job was dispatched to.
    cursor: Option<WorkerId>,
}

impl<B: WorkerBackend> fmt::Debug for Supervisor<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("options", &self.options)
            .field("workers", &self.workers.keys().collect::<Vec<_>>())
            .field("retiring", &self.retiring.keys().collect::<Vec<_>>())
            .field("restart_in_progress", &self.restart_in_progress)
            .finish_non_exhaustive()
    }
}

impl<B: WorkerBackend> Supervisor<B> {
    pub fn new(backend: B, options: SupervisorOptions) -> Self {
        Self {
            backend,
            options: SupervisorOptions {
                pool_size: options.pool_size.max(1),
                ..options
            },
            workers: BTreeMap::new(),
            retiring: BTreeMap::new(),
            next_id: 1,
            restart_in_progress: false,
            shutting_down: false,
            cursor: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn pool_size(&self) -> usize {
        self.options.pool_size
    }

    /// True iff any live (non-retiring) worker is tracked.
    pub fn is_running(&self) -> bool {
        !self.workers.is_empty()
    }

    pub fn worker_ids(&self) -> Vec<WorkerId> {
        self.workers.keys().copied().collect()
    }

    pub fn retiring_ids(&self) -> Vec<WorkerId> {
        self.retiring.keys().copied().collect()
    }

    pub fn restart_in_progress(&self) -> bool {
        self.restart_in_progress
    }

    pub fn set_auto_restart(&mut self, enabled: bool) {
        self.options.auto_restart = enabled;
    }

    /// Spawn a full pool. Returns the ids that came up.
    pub fn start_all(&mut self) -> Vec<WorkerId> {
        let mut started = Vec::with_capacity(self.options.pool_size);
        for _ in 0..self.options.pool_size {
            if let Some(id) = self.spawn_one() {
                started.push(id);
            }
        }
        info!(workers = started.len(), "worker pool started");
        started
    }

    /// Terminate every live worker. Returns whether there were any.
    pub fn kill_all(&mut self) -> bool {
        if self.workers.is_empty() {
            return false;
        }

        let workers = std::mem::take(&mut self.workers);
        info!(workers = workers.len(), "stopping worker pool");
        for (id, slot) in workers {
            if let Err(err) = self.backend.terminate(id) {
                warn!(worker = id, error = %err, "failed to signal worker");
            }
            self.retiring.insert(id, slot);
        }
        self.cursor = None;
        true
    }

    /// Raise the restart flag; exits seen while it is up never auto-restart.
    pub fn begin_restart(&mut self) {
        self.restart_in_progress = true;
    }

    pub fn finish_restart(&mut self) {
        self.restart_in_progress = false;
    }

    /// Kill the pool and start a fresh one.
    pub fn restart(&mut self) -> Vec<WorkerId> {
        self.begin_restart();
        self.kill_all();
        let started = self.start_all();
        self.finish_restart();
        started
    }

    /// Stop for good: kill every worker and never replace any.
    pub fn shutdown(&mut self) -> bool {
        self.shutting_down = true;
        self.kill_all()
    }

    pub fn mark_ready(&mut self, id: WorkerId, pid: u32) {
        match self.workers.get_mut(&id) {
            Some(slot) => {
                slot.ready = true;
                slot.pid = Some(pid);
                debug!(worker = id, pid, "worker ready");
            }
            None => debug!(worker = id, "ready message from untracked worker"),
        }
    }

    /// Handle a worker process exit.
    pub fn handle_exit(&mut self, id: WorkerId, code: Option<i32>) -> ExitHandling {
        self.backend.release(id);

        if let Some(slot) = self.retiring.remove(&id) {
            debug!(worker = id, ?code, "retired worker exited");
            return ExitHandling {
                was_retiring: true,
                replacement: None,
                orphaned: slot.in_flight,
            };
        }

        let Some(slot) = self.workers.remove(&id) else {
            debug!(worker = id, ?code, "exit from untracked worker");
            return ExitHandling::default();
        };

        warn!(worker = id, pid = ?slot.pid, ?code, "worker exited unexpectedly");

        let replacement = if self.options.auto_restart
            && !self.restart_in_progress
            && !self.shutting_down
        {
            let replacement = self.spawn_one();
            if let Some(new_id) = replacement {
                info!(worker = id, replacement = new_id, "replaced crashed worker");
            }
            replacement
        } else {
            None
        };

        ExitHandling {
            was_retiring: false,
            replacement,
            orphaned: slot.in_flight,
        }
    }

    /// Idle live workers, starting after the last one dispatched to and
    /// wrapping around.
    pub fn idle_workers_round_robin(&self) -> Vec<WorkerId> {
        let idle: Vec<WorkerId> = self
            .workers
            .iter()
            .filter(|(_, slot)| slot.is_idle())
            .map(|(id, _)| *id)
            .collect();

        let Some(cursor) = self.cursor else {
            return idle;
        };
        let split = idle.partition_point(|id| *id <= cursor);
        let (before, after) = idle.split_at(split);
        after.iter().chain(before).copied().collect()
    }

    /// Whether a job with this name is running on any worker.
    pub fn is_in_flight(&self, name: &str) -> bool {
        self.workers
            .values()
            .chain(self.retiring.values())
            .any(|slot| slot.in_flight.iter().any(|e| e.name() == name))
    }

    pub fn in_flight_on(&self, id: WorkerId) -> Vec<String> {
        self.workers
            .get(&id)
            .or_else(|| self.retiring.get(&id))
            .map(|slot| slot.in_flight.iter().map(|e| e.name().to_string()).collect())
            .unwrap_or_default()
    }

    /// Send `entry` to worker `id` and remember it as in flight there.
    pub fn dispatch(&mut self, id: WorkerId, entry: QueueEntry) -> Result<()> {
        let Some(slot) = self.workers.get_mut(&id) else {
            return Err(AvianError::Worker {
                worker: id,
                reason: "not a live worker".to_string(),
            });
        };

        self.backend.send(
            id,
            MasterMessage::RunJob {
                job: entry.job.clone(),
            },
        )?;

        slot.in_flight.push(entry);
        self.cursor = Some(id);
        Ok(())
    }

    /// A worker reported on a job. Returns the in-flight entry it refers to.
    pub fn complete_job(&mut self, id: WorkerId, name: &str) -> Option<QueueEntry> {
        let slot = self
            .workers
            .get_mut(&id)
            .or_else(|| self.retiring.get_mut(&id))?;
        let pos = slot.in_flight.iter().position(|e| e.name() == name)?;
        Some(slot.in_flight.remove(pos))
    }

    fn spawn_one(&mut self) -> Option<WorkerId> {
        let id = self.next_id;
        self.next_id += 1;

        match self.backend.spawn_worker(id) {
            Ok(()) => {
                debug!(worker = id, "spawned worker");
                self.workers.insert(id, WorkerSlot::default());
                Some(id)
            }
            Err(err) => {
                error!(worker = id, error = %err, "failed to spawn worker");
                None
            }
        }
    }
}
