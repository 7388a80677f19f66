// src/jobs/model.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cron job as declared in a component's `*.config.json`:
///
/// ```json
/// {
///   "cronJobs": [
///     {
///       "name": "nightly-cleanup",
///       "command": "node",
///       "args": ["scripts/cleanup.js"],
///       "expression": "0 3 * * *",
///       "enabled": true,
///       "description": "Purge expired sessions"
///     }
///   ]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronJobDescriptor {
    /// Unique across all components; also the queue key.
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub expression: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub description: String,
}

fn default_enabled() -> bool {
    true
}

/// The part of a component config file the scanner cares about. Everything
/// else in the file belongs to the view and is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComponentJobsFile {
    #[serde(rename = "cronJobs", default)]
    pub cron_jobs: Vec<CronJobDescriptor>,
}

/// A due job waiting in the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub job: CronJobDescriptor,
    /// Failed runs so far.
    #[serde(default)]
    pub attempts: u32,
    /// Not eligible for dispatch before this instant (retry backoff).
    #[serde(default)]
    pub not_before: Option<DateTime<Utc>>,
}

impl QueueEntry {
    pub fn new(job: CronJobDescriptor) -> Self {
        Self {
            job,
            attempts: 0,
            not_before: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.job.name
    }

    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.not_before.is_none_or(|t| t <= now)
    }
}

/// Outcome of one job run, reported worker → master.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronJobResult {
    pub name: String,
    pub success: bool,
}
