use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The two independent bundling targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineKind {
    /// Browser-facing bundle (`*.client.*` entries, served from `public/`).
    Components,
    /// Server-facing bundle (`*.server.*` entries, loaded by workers).
    Services,
}

impl PipelineKind {
    pub const ALL: [PipelineKind; 2] = [PipelineKind::Components, PipelineKind::Services];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineKind::Components => "components",
            PipelineKind::Services => "services",
        }
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "components" => Ok(PipelineKind::Components),
            // "serverFiles" is the older name for the server pipeline.
            "services" | "serverfiles" => Ok(PipelineKind::Services),
            other => Err(format!(
                "invalid pipeline: {other} (expected \"components\" or \"services\")"
            )),
        }
    }
}

/// How the master runs its pipelines.
///
/// - `Development`: watch both pipelines and rebuild on change.
/// - `Production`: compile each pipeline once, then serve without watching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AppMode {
    #[default]
    Development,
    Production,
}

impl fmt::Display for AppMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppMode::Development => f.write_str("development"),
            AppMode::Production => f.write_str("production"),
        }
    }
}

/// Backing store for the cron job queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStorageMode {
    /// In memory only (lost when the master exits).
    Memory,
    /// JSON file under `<home>/.avian/cron-queue.json`.
    #[default]
    File,
    /// Shared Redis instance (`cron.redis_url`).
    Redis,
}

/// Who the running app is, as handed to workers and their serve command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppIdentity {
    pub name: String,
    pub home: PathBuf,
    pub port: u16,
    pub mode: AppMode,
}

impl AppIdentity {
    pub const DEFAULT_NAME: &'static str = "localhost";
    pub const DEFAULT_PORT: u16 = 8080;

    /// `AVIAN_APP_*` variables describing this identity.
    pub fn env_vars(&self) -> Vec<(&'static str, String)> {
        vec![
            ("AVIAN_APP_NAME", self.name.clone()),
            ("AVIAN_APP_HOME", self.home.display().to_string()),
            ("AVIAN_APP_PORT", self.port.to_string()),
            ("AVIAN_APP_MODE", self.mode.to_string()),
        ]
    }
}
