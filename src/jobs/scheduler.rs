// src/jobs/scheduler.rs

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use crate::jobs::cron::CronSchedule;
use crate::jobs::model::CronJobDescriptor;

#[derive(Debug, Clone)]
struct InstalledTrigger {
    job: CronJobDescriptor,
    schedule: CronSchedule,
}

/// The set of installed cron triggers.
///
/// Triggers are reinstalled from every scan, so edits to job declarations
/// take effect without a restart. Firing is evaluated over the window since
/// the previous evaluation, so a trigger fires at most once per window no
/// matter how many of its fire times fell inside it.
#[derive(Debug)]
pub struct CronScheduler {
    triggers: BTreeMap<String, InstalledTrigger>,
    last_check: NaiveDateTime,
}

impl CronScheduler {
    /// Nothing fires for times at or before `start`.
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            triggers: BTreeMap::new(),
            last_check: start,
        }
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.triggers.contains_key(name)
    }

    /// Replace the installed triggers with the enabled jobs in `jobs`.
    ///
    /// Jobs with an invalid expression are logged and left uninstalled.
    pub fn install(&mut self, jobs: &[CronJobDescriptor]) {
        let mut next = BTreeMap::new();

        for job in jobs.iter().filter(|j| j.enabled) {
            // Keep the parsed schedule when the expression did not change.
            if let Some(existing) = self.triggers.get(&job.name) {
                if existing.schedule.expression() == job.expression.trim() {
                    next.insert(
                        job.name.clone(),
                        InstalledTrigger {
                            job: job.clone(),
                            schedule: existing.schedule.clone(),
                        },
                    );
                    continue;
                }
            }

            match CronSchedule::parse(&job.expression) {
                Ok(schedule) => {
                    debug!(job = %job.name, expression = %job.expression, "installed cron trigger");
                    next.insert(
                        job.name.clone(),
                        InstalledTrigger {
                            job: job.clone(),
                            schedule,
                        },
                    );
                }
                Err(err) => {
                    warn!(job = %job.name, error = %err, "not installing cron trigger");
                }
            }
        }

        let removed = self
            .triggers
            .keys()
            .filter(|name| !next.contains_key(*name))
            .count();
        if removed > 0 {
            info!(removed, "uninstalled cron triggers no longer declared or enabled");
        }

        self.triggers = next;
    }

    /// Jobs whose trigger fired in `(last evaluation, now]`.
    ///
    /// Moves the evaluation point to `now`, so each fire is reported once;
    /// the caller owns the returned jobs from here on.
    pub fn due(&mut self, now: NaiveDateTime) -> Vec<CronJobDescriptor> {
        if now <= self.last_check {
            return Vec::new();
        }

        let from = self.last_check;
        self.last_check = now;

        self.triggers
            .values()
            .filter(|t| t.schedule.fires_between(from, now))
            .map(|t| t.job.clone())
            .collect()
    }
}
