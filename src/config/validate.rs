// src/config/validate.rs

use std::time::Duration;

use globset::Glob;
use regex::Regex;

use crate::config::duration::parse_duration;
use crate::config::model::{ConfigFile, RawConfigFile, Timings};
use crate::errors::{AvianError, Result};
use crate::types::{PipelineKind, QueueStorageMode};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = AvianError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let timings = validate_raw_config(&raw)?;
        Ok(ConfigFile::from_parts(raw, timings))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<Timings> {
    validate_pipelines(cfg)?;
    let debounce = validate_build(cfg)?;
    validate_workers(cfg)?;
    let cron = validate_cron(cfg)?;
    Ok(Timings { debounce, ..cron })
}

fn config_err(msg: impl Into<String>) -> AvianError {
    AvianError::ConfigError(msg.into())
}

fn validate_pipelines(cfg: &RawConfigFile) -> Result<()> {
    for kind in PipelineKind::ALL {
        let pipeline = cfg.pipeline.get(kind);

        if pipeline.effective_cmd(kind).trim().is_empty() {
            return Err(config_err(format!("[pipeline.{kind}].cmd must not be empty")));
        }

        for pattern in [
            pipeline.effective_error_pattern(),
            pipeline.effective_warning_pattern(),
        ] {
            Regex::new(pattern).map_err(|e| {
                config_err(format!("[pipeline.{kind}] invalid pattern '{pattern}': {e}"))
            })?;
        }

        for glob in pipeline
            .effective_watch(kind)
            .iter()
            .chain(pipeline.effective_exclude().iter())
        {
            Glob::new(glob).map_err(|e| {
                config_err(format!("[pipeline.{kind}] invalid glob '{glob}': {e}"))
            })?;
        }
    }
    Ok(())
}

fn validate_build(cfg: &RawConfigFile) -> Result<Duration> {
    let debounce = parse_duration(&cfg.build.debounce)
        .map_err(|e| config_err(format!("[build].debounce: {e}")))?;

    if cfg.build.server_chunk_marker.trim().is_empty() {
        return Err(config_err("[build].server_chunk_marker must not be empty"));
    }
    Ok(debounce)
}

fn validate_workers(cfg: &RawConfigFile) -> Result<()> {
    if cfg.workers.count == Some(0) {
        return Err(config_err("[workers].count must be >= 1 (got 0)"));
    }
    Ok(())
}

/// Returns the cron timings; `debounce` is left zero for the caller to fill.
fn validate_cron(cfg: &RawConfigFile) -> Result<Timings> {
    let cron = &cfg.cron;

    let interval = |field: &str, value: &str| -> Result<Duration> {
        let dur = parse_duration(value).map_err(|e| config_err(format!("[cron].{field}: {e}")))?;
        if dur.is_zero() {
            return Err(config_err(format!("[cron].{field} must be greater than zero")));
        }
        Ok(dur)
    };
    let scan_interval = interval("scan_interval", &cron.scan_interval)?;
    let dispatch_interval = interval("dispatch_interval", &cron.dispatch_interval)?;

    let optional = |field: &str, value: Option<&str>| -> Result<Option<Duration>> {
        value
            .map(|v| parse_duration(v).map_err(|e| config_err(format!("[cron].{field}: {e}"))))
            .transpose()
    };
    let retry_backoff = optional("retry_backoff", cron.retry_backoff.as_deref())?;
    let retry_backoff_max = optional("retry_backoff_max", cron.retry_backoff_max.as_deref())?;

    if cron.max_attempts == Some(0) {
        return Err(config_err("[cron].max_attempts must be >= 1 when set (got 0)"));
    }

    Glob::new(&cron.jobs_glob)
        .map_err(|e| config_err(format!("[cron].jobs_glob '{}': {e}", cron.jobs_glob)))?;

    if cron.storage == QueueStorageMode::Redis && cron.redis_url.is_none() {
        return Err(config_err(
            "[cron].storage = \"redis\" requires [cron].redis_url",
        ));
    }

    Ok(Timings {
        debounce: Duration::ZERO,
        scan_interval,
        dispatch_interval,
        retry_backoff,
        retry_backoff_max,
    })
}
