// src/jobs/mod.rs

//! Cron job declarations, scheduling and the dispatch queue.
//!
//! - [`model`] holds the descriptor / queue entry / result types.
//! - [`cron`] parses cron expressions and finds fire times.
//! - [`scan`] discovers job declarations in per-component config files.
//! - [`scheduler`] keeps the installed triggers and reports due jobs.
//! - [`queue`] is the store-backed queue keyed by job name.
//! - [`retry`] decides what happens to a job after a failed run.
//! - [`dispatch`] glues queue, scheduler and worker pool together for the
//!   master's scan and dispatch ticks.

pub mod cron;
pub mod dispatch;
pub mod model;
pub mod queue;
pub mod retry;
pub mod scan;
pub mod scheduler;

pub use cron::CronSchedule;
pub use dispatch::{JobDispatcher, ScanSummary};
pub use model::{CronJobDescriptor, CronJobResult, QueueEntry};
pub use queue::{FileQueueStore, JobQueueStore, MemoryQueueStore, RedisQueueStore, open_store};
pub use retry::RetryPolicy;
pub use scan::{JobSource, ScanReport};
pub use scheduler::CronScheduler;
