// src/coord/runtime.rs

use std::fmt;

use chrono::{Local, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::build::BuildEvent;
use crate::errors::Result;
use crate::jobs::JobDispatcher;
use crate::jobs::model::CronJobResult;
use crate::supervisor::{Supervisor, WorkerBackend, WorkerId};
use crate::worker::protocol::WorkerMessage;

use super::MasterEvent;
use super::core::{Coordinator, Decision};

/// The master's event loop.
///
/// Owns the coordinator, the supervisor and (outside bundle-only mode) the
/// job dispatcher, and applies every [`MasterEvent`] to them in arrival
/// order. All decisions about builds come from the pure [`Coordinator`];
/// this shell only carries them out.
pub struct MasterRuntime<B: WorkerBackend> {
    coordinator: Coordinator,
    supervisor: Supervisor<B>,
    jobs: Option<JobDispatcher>,
    event_rx: mpsc::Receiver<MasterEvent>,
}

impl<B: WorkerBackend> fmt::Debug for MasterRuntime<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterRuntime")
            .field("coordinator", &self.coordinator)
            .field("supervisor", &self.supervisor)
            .finish_non_exhaustive()
    }
}

impl<B: WorkerBackend> MasterRuntime<B> {
    pub fn new(
        coordinator: Coordinator,
        supervisor: Supervisor<B>,
        jobs: Option<JobDispatcher>,
        event_rx: mpsc::Receiver<MasterEvent>,
    ) -> Self {
        Self {
            coordinator,
            supervisor,
            jobs,
            event_rx,
        }
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn supervisor(&self) -> &Supervisor<B> {
        &self.supervisor
    }

    pub fn jobs_mut(&mut self) -> Option<&mut JobDispatcher> {
        self.jobs.as_mut()
    }

    /// Run until an exit decision, a shutdown request or until every sender
    /// is gone. Returns the process exit code.
    pub async fn run(mut self) -> Result<i32> {
        info!("avian master started");

        let code = loop {
            let Some(event) = self.event_rx.recv().await else {
                info!("master event channel closed; exiting");
                self.supervisor.shutdown();
                break 0;
            };

            debug!(?event, "master received event");

            if let Some(code) = self.handle_event(event).await {
                break code;
            }
        };

        info!(code, "avian master exiting");
        Ok(code)
    }

    /// Apply one event. Returns `Some(code)` when the master should exit.
    pub async fn handle_event(&mut self, event: MasterEvent) -> Option<i32> {
        match event {
            MasterEvent::Build(build) => {
                if let BuildEvent::Failed {
                    pipeline,
                    diagnostics,
                } = &build
                {
                    for d in diagnostics {
                        error!(pipeline = %pipeline, "{}", d);
                    }
                }
                let decision = self.coordinator.step(build, self.supervisor.is_running());
                self.apply(decision)
            }
            MasterEvent::Worker { worker, message } => {
                match message {
                    WorkerMessage::Ready { pid } => self.supervisor.mark_ready(worker, pid),
                    WorkerMessage::JobFinished(result) => self.on_job_finished(worker, result).await,
                }
                None
            }
            MasterEvent::WorkerExited { worker, code } => {
                let exit = self.supervisor.handle_exit(worker, code);
                if !exit.orphaned.is_empty() {
                    if let Some(jobs) = self.jobs.as_mut() {
                        if let Err(err) = jobs.requeue_orphans(exit.orphaned, Utc::now()).await {
                            warn!(worker, error = %err, "could not re-queue jobs of exited worker");
                        }
                    }
                }
                None
            }
            MasterEvent::ScanTick => {
                if let Some(jobs) = self.jobs.as_mut() {
                    match jobs.scan_tick(Local::now().naive_local()).await {
                        Ok(summary) => debug!(
                            declared = summary.declared,
                            installed = summary.installed,
                            enqueued = ?summary.enqueued,
                            "scan tick"
                        ),
                        Err(err) => warn!(error = %err, "scan tick abandoned"),
                    }
                }
                None
            }
            MasterEvent::DispatchTick => {
                if let Some(jobs) = self.jobs.as_mut() {
                    match jobs.dispatch_tick(&mut self.supervisor, Utc::now()).await {
                        Ok(dispatched) if !dispatched.is_empty() => {
                            debug!(?dispatched, "dispatch tick");
                        }
                        Ok(_) => {}
                        Err(err) => warn!(error = %err, "dispatch tick abandoned"),
                    }
                }
                None
            }
            MasterEvent::ShutdownRequested => {
                info!("shutdown requested; stopping workers");
                self.coordinator.shutdown();
                self.supervisor.shutdown();
                Some(0)
            }
        }
    }

    fn apply(&mut self, decision: Decision) -> Option<i32> {
        match decision {
            Decision::None => None,
            Decision::StartPool => {
                self.supervisor.start_all();
                None
            }
            Decision::RestartPool => {
                self.supervisor.restart();
                None
            }
            Decision::StopPool => {
                self.supervisor.kill_all();
                None
            }
            Decision::Exit(code) => {
                self.supervisor.shutdown();
                Some(code)
            }
        }
    }

    async fn on_job_finished(&mut self, worker: WorkerId, result: CronJobResult) {
        let Some(entry) = self.supervisor.complete_job(worker, &result.name) else {
            warn!(worker, job = %result.name, "result for a job that was not in flight");
            return;
        };
        let Some(jobs) = self.jobs.as_mut() else {
            return;
        };
        if let Err(err) = jobs.handle_result(entry, result.success, Utc::now()).await {
            warn!(worker, job = %result.name, error = %err, "could not record job result");
        }
    }
}
