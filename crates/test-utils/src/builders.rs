#![allow(dead_code)]

use avian::config::{ConfigFile, RawConfigFile};
use avian::jobs::{CronJobDescriptor, QueueEntry};
use avian::types::QueueStorageMode;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_workers(mut self, count: usize) -> Self {
        self.config.workers.count = Some(count);
        self
    }

    pub fn with_auto_restart(mut self, enabled: bool) -> Self {
        self.config.workers.auto_restart = enabled;
        self
    }

    pub fn with_server_chunk_marker(mut self, marker: &str) -> Self {
        self.config.build.server_chunk_marker = marker.to_string();
        self
    }

    pub fn with_components_cmd(mut self, cmd: &str) -> Self {
        self.config.pipeline.components.cmd = Some(cmd.to_string());
        self
    }

    pub fn with_services_cmd(mut self, cmd: &str) -> Self {
        self.config.pipeline.services.cmd = Some(cmd.to_string());
        self
    }

    pub fn with_storage(mut self, storage: QueueStorageMode) -> Self {
        self.config.cron.storage = storage;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.config.cron.max_attempts = Some(attempts);
        self
    }

    pub fn with_retry_backoff(mut self, backoff: &str) -> Self {
        self.config.cron.retry_backoff = Some(backoff.to_string());
        self
    }

    pub fn with_retry_backoff_max(mut self, max: &str) -> Self {
        self.config.cron.retry_backoff_max = Some(max.to_string());
        self
    }

    pub fn with_jobs_glob(mut self, glob: &str) -> Self {
        self.config.cron.jobs_glob = glob.to_string();
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `CronJobDescriptor`.
pub struct JobBuilder {
    job: CronJobDescriptor,
}

impl JobBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            job: CronJobDescriptor {
                name: name.to_string(),
                command: "true".to_string(),
                args: vec![],
                expression: "* * * * *".to_string(),
                enabled: true,
                description: String::new(),
            },
        }
    }

    pub fn command(mut self, command: &str) -> Self {
        self.job.command = command.to_string();
        self
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.job.args.push(arg.to_string());
        self
    }

    pub fn expression(mut self, expression: &str) -> Self {
        self.job.expression = expression.to_string();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.job.enabled = false;
        self
    }

    pub fn build(self) -> CronJobDescriptor {
        self.job
    }

    pub fn entry(self) -> QueueEntry {
        QueueEntry::new(self.job)
    }
}
