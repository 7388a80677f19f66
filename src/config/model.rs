// src/config/model.rs

use std::time::Duration;

use serde::Deserialize;

use crate::types::{AppMode, PipelineKind, QueueStorageMode};

/// Top-level configuration as read from `Avian.toml`.
///
/// ```toml
/// [app]
/// name = "shop"
/// port = 8080
///
/// [pipeline.components]
/// cmd = "npx webpack --config webpack.components.js"
/// output_dir = "public"
///
/// [pipeline.services]
/// cmd = "npx webpack --config webpack.services.js"
/// output_dir = "private"
///
/// [workers]
/// count = 4
///
/// [cron]
/// storage = "redis"
/// redis_url = "redis://127.0.0.1:6379"
/// ```
///
/// All sections are optional; a project without `Avian.toml` runs on the
/// defaults below. The cron queue defaults to `storage = "file"`, so queued
/// and retrying jobs survive a master restart without Redis.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub app: AppSection,

    #[serde(default)]
    pub pipeline: PipelinesSection,

    #[serde(default)]
    pub build: BuildSection,

    #[serde(default)]
    pub workers: WorkersSection,

    #[serde(default)]
    pub cron: CronSection,
}

/// Validated configuration.
///
/// Only constructed through `TryFrom<RawConfigFile>`, so every duration,
/// pattern and storage setting in here is known to be usable.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub app: AppSection,
    pub pipeline: PipelinesSection,
    pub build: BuildSection,
    pub workers: WorkersSection,
    pub cron: CronSection,
    /// Duration strings from `[build]` and `[cron]`, parsed once during
    /// validation. Read these rather than re-parsing the section strings.
    pub timings: Timings,
}

/// Parsed form of every duration setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub debounce: Duration,
    pub scan_interval: Duration,
    pub dispatch_interval: Duration,
    pub retry_backoff: Option<Duration>,
    pub retry_backoff_max: Option<Duration>,
}

impl ConfigFile {
    pub(crate) fn from_parts(raw: RawConfigFile, timings: Timings) -> Self {
        Self {
            app: raw.app,
            pipeline: raw.pipeline,
            build: raw.build,
            workers: raw.workers,
            cron: raw.cron,
            timings,
        }
    }
}

/// `[app]` section. CLI flags and `AVIAN_APP_*` variables take precedence.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub mode: Option<AppMode>,
}

/// `[pipeline.components]` and `[pipeline.services]`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PipelinesSection {
    #[serde(default)]
    pub components: PipelineConfig,

    #[serde(default)]
    pub services: PipelineConfig,
}

impl PipelinesSection {
    pub fn get(&self, kind: PipelineKind) -> &PipelineConfig {
        match kind {
            PipelineKind::Components => &self.components,
            PipelineKind::Services => &self.services,
        }
    }
}

/// One pipeline. Unset fields fall back to per-pipeline defaults, see the
/// `effective_*` helpers.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PipelineConfig {
    /// Command that compiles the pipeline once and exits.
    #[serde(default)]
    pub cmd: Option<String>,

    /// Directory (relative to home) the compiler writes its chunks into.
    #[serde(default)]
    pub output_dir: Option<String>,

    /// Source globs that trigger a recompile in development mode.
    #[serde(default)]
    pub watch: Option<Vec<String>>,

    #[serde(default)]
    pub exclude: Option<Vec<String>>,

    /// File suffixes stripped from output file names to obtain chunk names,
    /// tried in order.
    #[serde(default)]
    pub chunk_suffixes: Option<Vec<String>>,

    /// Regex for compiler output lines that report an error.
    #[serde(default)]
    pub error_pattern: Option<String>,

    /// Regex for compiler output lines that report a warning.
    #[serde(default)]
    pub warning_pattern: Option<String>,
}

/// Default diagnostic patterns match webpack's `ERROR in <file> <line>:<col>`
/// style headers.
pub const DEFAULT_ERROR_PATTERN: &str =
    r"^ERROR in (?P<file>[^\s]+)(?:\s+(?P<line>\d+):\d+(?:-\d+)?)?\s*(?P<message>.*)$";
pub const DEFAULT_WARNING_PATTERN: &str =
    r"^WARNING in (?P<file>[^\s]+)(?:\s+(?P<line>\d+):\d+(?:-\d+)?)?\s*(?P<message>.*)$";

impl PipelineConfig {
    pub fn effective_cmd(&self, kind: PipelineKind) -> String {
        self.cmd.clone().unwrap_or_else(|| match kind {
            PipelineKind::Components => "npx webpack --config webpack.components.js".to_string(),
            PipelineKind::Services => "npx webpack --config webpack.services.js".to_string(),
        })
    }

    pub fn effective_output_dir(&self, kind: PipelineKind) -> String {
        self.output_dir.clone().unwrap_or_else(|| match kind {
            PipelineKind::Components => "public".to_string(),
            PipelineKind::Services => "private".to_string(),
        })
    }

    pub fn effective_watch(&self, kind: PipelineKind) -> Vec<String> {
        self.watch.clone().unwrap_or_else(|| match kind {
            PipelineKind::Components => vec!["components/**/*.client.*".to_string()],
            PipelineKind::Services => vec!["components/**/*.server.*".to_string()],
        })
    }

    pub fn effective_exclude(&self) -> Vec<String> {
        self.exclude.clone().unwrap_or_default()
    }

    pub fn effective_chunk_suffixes(&self, kind: PipelineKind) -> Vec<String> {
        self.chunk_suffixes.clone().unwrap_or_else(|| match kind {
            PipelineKind::Components => vec![".bundle.js".to_string(), ".js".to_string()],
            PipelineKind::Services => vec![".js".to_string()],
        })
    }

    pub fn effective_error_pattern(&self) -> &str {
        self.error_pattern.as_deref().unwrap_or(DEFAULT_ERROR_PATTERN)
    }

    pub fn effective_warning_pattern(&self) -> &str {
        self.warning_pattern.as_deref().unwrap_or(DEFAULT_WARNING_PATTERN)
    }
}

/// `[build]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildSection {
    /// Quiet period after the last source change before a recompile starts.
    #[serde(default = "default_debounce")]
    pub debounce: String,

    /// Dot/slash separated segment that marks a chunk as server-affecting,
    /// e.g. `index.server` or `admin/users.server.routes`.
    #[serde(default = "default_server_chunk_marker")]
    pub server_chunk_marker: String,
}

fn default_debounce() -> String {
    "300ms".to_string()
}

fn default_server_chunk_marker() -> String {
    "server".to_string()
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            debounce: default_debounce(),
            server_chunk_marker: default_server_chunk_marker(),
        }
    }
}

/// `[workers]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkersSection {
    /// Pool size; one worker per CPU core when unset.
    #[serde(default)]
    pub count: Option<usize>,

    /// Replace workers that exit unexpectedly.
    #[serde(default = "default_true")]
    pub auto_restart: bool,

    /// App-server command each worker runs for its lifetime.
    #[serde(default)]
    pub serve_cmd: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for WorkersSection {
    fn default() -> Self {
        Self {
            count: None,
            auto_restart: true,
            serve_cmd: None,
        }
    }
}

impl WorkersSection {
    pub fn effective_count(&self) -> usize {
        self.count.unwrap_or_else(num_cpus::get).max(1)
    }
}

/// `[cron]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct CronSection {
    /// How often job declarations are re-read and triggers evaluated.
    #[serde(default = "default_scan_interval")]
    pub scan_interval: String,

    /// How often queued jobs are handed to idle workers.
    #[serde(default = "default_dispatch_interval")]
    pub dispatch_interval: String,

    /// Glob (relative to home) of per-component files declaring `cronJobs`.
    #[serde(default = "default_jobs_glob")]
    pub jobs_glob: String,

    /// Queue backend; `file` unless set.
    #[serde(default)]
    pub storage: QueueStorageMode,

    #[serde(default)]
    pub redis_url: Option<String>,

    /// Give up on a job after this many failed runs. Unbounded when unset.
    #[serde(default)]
    pub max_attempts: Option<u32>,

    /// First retry delay; doubled per failed attempt. Retries on the next
    /// dispatcher tick when unset.
    #[serde(default)]
    pub retry_backoff: Option<String>,

    #[serde(default)]
    pub retry_backoff_max: Option<String>,
}

fn default_scan_interval() -> String {
    "5s".to_string()
}

fn default_dispatch_interval() -> String {
    "30s".to_string()
}

fn default_jobs_glob() -> String {
    "components/**/*.config.json".to_string()
}

impl Default for CronSection {
    fn default() -> Self {
        Self {
            scan_interval: default_scan_interval(),
            dispatch_interval: default_dispatch_interval(),
            jobs_glob: default_jobs_glob(),
            storage: QueueStorageMode::default(),
            redis_url: None,
            max_attempts: None,
            retry_backoff: None,
            retry_backoff_max: None,
        }
    }
}
