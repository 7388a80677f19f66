// src/jobs/dispatch.rs

//! The master's side of the cron queue.
//!
//! The scan tick re-reads declarations and inserts due jobs; the dispatch
//! tick hands queued jobs to idle workers; results and crashed workers feed
//! jobs back in. Store errors abort the current tick only: the caller logs
//! them and the next tick starts over.
//!
//! An entry the store refused to take (a due job, a failed run, a job a
//! worker could not accept) is held by the dispatcher and written first on
//! the next tick, so an outage delays jobs instead of dropping them.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::jobs::model::QueueEntry;
use crate::jobs::queue::JobQueueStore;
use crate::jobs::retry::RetryPolicy;
use crate::jobs::scan::JobSource;
use crate::jobs::scheduler::CronScheduler;
use crate::supervisor::{Supervisor, WorkerBackend};

/// What a scan tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub declared: usize,
    pub installed: usize,
    pub due: Vec<String>,
    pub enqueued: Vec<String>,
}

/// Owns the job source, the installed triggers and the queue store.
pub struct JobDispatcher {
    source: JobSource,
    scheduler: CronScheduler,
    store: Box<dyn JobQueueStore>,
    retry: RetryPolicy,
    /// Entries not yet written because the store failed.
    unsaved: Vec<QueueEntry>,
}

impl std::fmt::Debug for JobDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDispatcher")
            .field("triggers", &self.scheduler.len())
            .field("retry", &self.retry)
            .field("unsaved", &self.unsaved.len())
            .finish_non_exhaustive()
    }
}

impl JobDispatcher {
    pub fn new(
        source: JobSource,
        scheduler: CronScheduler,
        store: Box<dyn JobQueueStore>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            source,
            scheduler,
            store,
            retry,
            unsaved: Vec::new(),
        }
    }

    pub fn scheduler(&self) -> &CronScheduler {
        &self.scheduler
    }

    pub fn store_mut(&mut self) -> &mut dyn JobQueueStore {
        self.store.as_mut()
    }

    /// Names of entries waiting for the store to come back.
    pub fn unsaved(&self) -> Vec<&str> {
        self.unsaved.iter().map(|e| e.name()).collect()
    }

    /// Write held entries back in order. Stops at the first store error and
    /// keeps that entry and the rest for the next attempt.
    ///
    /// Returns the names that were inserted.
    async fn flush_unsaved(&mut self) -> Result<Vec<String>> {
        let mut inserted = Vec::new();
        while let Some(entry) = self.unsaved.first().cloned() {
            let name = entry.name().to_string();
            if self.store.insert_if_absent(entry).await? {
                info!(job = %name, "queue store reachable again; queued held job");
                inserted.push(name);
            } else {
                debug!(job = %name, "held job already queued; dropping copy");
            }
            self.unsaved.remove(0);
        }
        Ok(inserted)
    }

    /// Insert `entry`, or hold it for the next tick if the store fails.
    async fn insert_or_hold(&mut self, entry: QueueEntry) -> Result<bool> {
        match self.store.insert_if_absent(entry.clone()).await {
            Ok(inserted) => Ok(inserted),
            Err(err) => {
                warn!(job = %entry.name(), error = %err, "queue store unavailable; holding job");
                self.unsaved.push(entry);
                Err(err)
            }
        }
    }

    /// Reload declarations, reinstall triggers and enqueue every job whose
    /// trigger fired since the previous scan (local time).
    ///
    /// A job that is already queued is left alone, so a trigger firing twice
    /// before dispatch still yields one entry.
    ///
    /// Due jobs the store fails to take are held and inserted ahead of
    /// anything else on the next tick; the fire itself is never re-evaluated.
    pub async fn scan_tick(&mut self, now: NaiveDateTime) -> Result<ScanSummary> {
        let report = self.source.scan();
        self.scheduler.install(&report.jobs);

        let due = self.scheduler.due(now);
        let mut summary = ScanSummary {
            declared: report.jobs.len(),
            installed: self.scheduler.len(),
            due: due.iter().map(|j| j.name.clone()).collect(),
            enqueued: Vec::new(),
        };

        let mut due = due.into_iter().map(QueueEntry::new);
        let flushed = match self.flush_unsaved().await {
            Ok(flushed) => flushed,
            Err(err) => {
                self.unsaved.extend(due);
                return Err(err);
            }
        };
        summary.enqueued.extend(flushed);

        while let Some(entry) = due.next() {
            let name = entry.name().to_string();
            match self.insert_or_hold(entry).await {
                Ok(true) => {
                    info!(job = %name, "cron job due; queued");
                    summary.enqueued.push(name);
                }
                Ok(false) => debug!(job = %name, "cron job due but already queued"),
                Err(err) => {
                    self.unsaved.extend(due);
                    return Err(err);
                }
            }
        }

        Ok(summary)
    }

    /// Hand queued, eligible jobs to idle workers, one job per worker,
    /// visiting workers in round-robin order.
    ///
    /// Returns the names dispatched.
    pub async fn dispatch_tick<B: WorkerBackend>(
        &mut self,
        supervisor: &mut Supervisor<B>,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let mut dispatched = Vec::new();
        self.flush_unsaved().await?;

        let idle = supervisor.idle_workers_round_robin();
        if idle.is_empty() {
            return Ok(dispatched);
        }

        let mut names = self.store.names().await?.into_iter();
        let mut workers = idle.into_iter();
        let mut worker = workers.next();

        while let Some(id) = worker {
            let Some(name) = names.next() else {
                break;
            };

            // Never run two copies of one job at the same time.
            if supervisor.is_in_flight(&name) {
                continue;
            }

            match self.store.get(name.clone()).await? {
                Some(entry) if entry.is_eligible(now) => {}
                _ => continue,
            }

            // Once taken, the entry either reaches the worker or goes back
            // into the store (or is held until the store takes it).
            let Some(entry) = self.store.take(name.clone()).await? else {
                continue;
            };

            match supervisor.dispatch(id, entry.clone()) {
                Ok(()) => {
                    info!(job = %name, worker = id, attempt = entry.attempts + 1, "dispatched cron job");
                    dispatched.push(name);
                    worker = workers.next();
                }
                Err(err) => {
                    warn!(job = %name, worker = id, error = %err, "dispatch failed; re-queueing");
                    self.insert_or_hold(entry).await?;
                    worker = workers.next();
                }
            }
        }

        Ok(dispatched)
    }

    /// Apply a worker's report for a job that was in flight.
    ///
    /// Returns whether the job went back into the queue.
    pub async fn handle_result(
        &mut self,
        entry: QueueEntry,
        success: bool,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if success {
            debug!(job = %entry.name(), "cron job succeeded");
            return Ok(false);
        }
        self.requeue_failed(entry, now).await
    }

    /// Put back jobs that were in flight on a worker that exited without
    /// reporting. A lost run counts as a failed attempt.
    ///
    /// Every entry is attempted; the first store error is returned after the
    /// rest have been inserted or held.
    pub async fn requeue_orphans(
        &mut self,
        entries: Vec<QueueEntry>,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let mut requeued = 0;
        let mut first_err = None;
        for entry in entries {
            warn!(job = %entry.name(), "worker exited while running cron job");
            match self.requeue_failed(entry, now).await {
                Ok(true) => requeued += 1,
                Ok(false) => {}
                Err(err) => {
                    first_err.get_or_insert(err);
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(requeued),
        }
    }

    async fn requeue_failed(&mut self, entry: QueueEntry, now: DateTime<Utc>) -> Result<bool> {
        let name = entry.name().to_string();
        let Some(retry) = self.retry.after_failure(entry, now) else {
            warn!(job = %name, "cron job failed; giving up after max attempts");
            return Ok(false);
        };

        let attempts = retry.attempts;
        let not_before = retry.not_before;
        let inserted = self.insert_or_hold(retry).await?;
        if inserted {
            info!(job = %name, attempts, ?not_before, "cron job failed; re-queued");
        } else {
            debug!(job = %name, "cron job failed but a newer run is already queued");
        }
        Ok(inserted)
    }
}
