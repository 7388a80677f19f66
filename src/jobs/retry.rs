// src/jobs/retry.rs

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::config::ConfigFile;
use crate::jobs::model::QueueEntry;

/// What to do with a job after a failed run.
///
/// The defaults (no attempt limit, no backoff) retry every failure on the
/// next dispatcher tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    pub max_attempts: Option<u32>,
    pub backoff: Option<Duration>,
    pub backoff_max: Option<Duration>,
}

impl RetryPolicy {
    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self {
            max_attempts: cfg.cron.max_attempts,
            backoff: cfg.timings.retry_backoff,
            backoff_max: cfg.timings.retry_backoff_max,
        }
    }

    /// Delay before retry number `attempts` (1-based): `backoff * 2^(attempts-1)`,
    /// capped at `backoff_max`.
    pub fn delay_for(&self, attempts: u32) -> Option<Duration> {
        let base = self.backoff?;
        let factor = 1u32.checked_shl(attempts.saturating_sub(1)).unwrap_or(u32::MAX);
        let delay = base.checked_mul(factor).unwrap_or(Duration::MAX);
        Some(match self.backoff_max {
            Some(max) => delay.min(max),
            None => delay,
        })
    }

    /// The entry to put back after a failed run, or `None` once the job has
    /// used up its attempts.
    pub fn after_failure(&self, entry: QueueEntry, now: DateTime<Utc>) -> Option<QueueEntry> {
        let attempts = entry.attempts.saturating_add(1);
        if self.max_attempts.is_some_and(|max| attempts >= max) {
            return None;
        }

        let not_before = self
            .delay_for(attempts)
            .and_then(|d| TimeDelta::from_std(d).ok())
            .and_then(|d| now.checked_add_signed(d));

        Some(QueueEntry {
            job: entry.job,
            attempts,
            not_before,
        })
    }
}
