use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use avian::coord::MasterEvent;
use avian::errors::{AvianError, Result};
use avian::jobs::CronJobResult;
use avian::supervisor::{WorkerBackend, WorkerId};
use avian::worker::{MasterMessage, WorkerMessage};

/// Everything a [`FakeWorkerBackend`] was asked to do.
#[derive(Debug, Clone, Default)]
pub struct FakeWorkerLog {
    pub spawned: Vec<WorkerId>,
    pub terminated: Vec<WorkerId>,
    pub released: Vec<WorkerId>,
    pub sent: Vec<(WorkerId, MasterMessage)>,
}

impl FakeWorkerLog {
    /// Names of jobs sent to `worker`, in order.
    pub fn jobs_sent_to(&self, worker: WorkerId) -> Vec<String> {
        self.sent
            .iter()
            .filter(|(id, _)| *id == worker)
            .filter_map(|(_, msg)| match msg {
                MasterMessage::RunJob { job } => Some(job.name.clone()),
                MasterMessage::Shutdown => None,
            })
            .collect()
    }

    /// `(worker, job name)` for every job sent.
    pub fn dispatches(&self) -> Vec<(WorkerId, String)> {
        self.sent
            .iter()
            .filter_map(|(id, msg)| match msg {
                MasterMessage::RunJob { job } => Some((*id, job.name.clone())),
                MasterMessage::Shutdown => None,
            })
            .collect()
    }
}

/// A worker backend that spawns nothing.
///
/// - records every call in a shared [`FakeWorkerLog`]
/// - with an event sender, behaves like well-mannered workers: reports
///   `Ready` on spawn, finishes every job immediately (successfully unless
///   scripted otherwise) and reports an exit when terminated.
pub struct FakeWorkerBackend {
    log: Arc<Mutex<FakeWorkerLog>>,
    events: Option<mpsc::Sender<MasterEvent>>,
    outcomes: HashMap<String, bool>,
    fail_spawns: bool,
    fail_jobs: bool,
}

impl FakeWorkerBackend {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(FakeWorkerLog::default())),
            events: None,
            outcomes: HashMap::new(),
            fail_spawns: false,
            fail_jobs: false,
        }
    }

    pub fn with_events(events: mpsc::Sender<MasterEvent>) -> Self {
        Self {
            events: Some(events),
            ..Self::new()
        }
    }

    /// Make runs of `job` report `success`.
    pub fn job_outcome(mut self, job: &str, success: bool) -> Self {
        self.outcomes.insert(job.to_string(), success);
        self
    }

    pub fn failing_spawns(mut self) -> Self {
        self.fail_spawns = true;
        self
    }

    /// Refuse every `RunJob` message, as if the worker's channel had closed.
    pub fn failing_sends(mut self) -> Self {
        self.fail_jobs = true;
        self
    }

    pub fn log(&self) -> Arc<Mutex<FakeWorkerLog>> {
        Arc::clone(&self.log)
    }

    pub fn snapshot(&self) -> FakeWorkerLog {
        self.log.lock().unwrap().clone()
    }

    fn emit(&self, event: MasterEvent) {
        if let Some(tx) = &self.events {
            tx.try_send(event).expect("fake worker event channel full");
        }
    }
}

impl Default for FakeWorkerBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerBackend for FakeWorkerBackend {
    fn spawn_worker(&mut self, id: WorkerId) -> Result<()> {
        if self.fail_spawns {
            return Err(AvianError::Worker {
                worker: id,
                reason: "spawn disabled".to_string(),
            });
        }
        self.log.lock().unwrap().spawned.push(id);
        self.emit(MasterEvent::Worker {
            worker: id,
            message: WorkerMessage::Ready { pid: 1000 + id },
        });
        Ok(())
    }

    fn send(&mut self, id: WorkerId, message: MasterMessage) -> Result<()> {
        if self.fail_jobs && matches!(message, MasterMessage::RunJob { .. }) {
            return Err(AvianError::Worker {
                worker: id,
                reason: "channel closed".to_string(),
            });
        }
        self.log.lock().unwrap().sent.push((id, message.clone()));
        if let MasterMessage::RunJob { job } = message {
            let success = self.outcomes.get(&job.name).copied().unwrap_or(true);
            self.emit(MasterEvent::Worker {
                worker: id,
                message: WorkerMessage::JobFinished(CronJobResult {
                    name: job.name,
                    success,
                }),
            });
        }
        Ok(())
    }

    fn terminate(&mut self, id: WorkerId) -> Result<()> {
        self.log.lock().unwrap().terminated.push(id);
        self.emit(MasterEvent::WorkerExited {
            worker: id,
            code: None,
        });
        Ok(())
    }

    fn release(&mut self, id: WorkerId) {
        self.log.lock().unwrap().released.push(id);
    }
}
