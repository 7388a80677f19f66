// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::types::AppMode;

/// Command-line arguments for `avian`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "avian",
    version,
    about = "Build, supervise and schedule an Avian web application.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Avian.toml` in the application home. A missing default file
    /// means "all defaults"; a missing explicit file is an error.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Application home directory (default: current directory).
    #[arg(long, env = "AVIAN_APP_HOME", value_name = "DIR")]
    pub home: Option<PathBuf>,

    /// Application name (default: `localhost`).
    #[arg(long, env = "AVIAN_APP_NAME", value_name = "NAME")]
    pub name: Option<String>,

    /// Port the workers serve on (default: 8080).
    #[arg(long, env = "AVIAN_APP_PORT", value_name = "PORT")]
    pub port: Option<u16>,

    /// `development` watches and rebuilds; `production` builds once.
    #[arg(long, env = "AVIAN_APP_MODE", value_enum, value_name = "MODE")]
    pub mode: Option<AppMode>,

    /// Compile both pipelines once and exit without starting workers.
    #[arg(long)]
    pub bundle_only: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `AVIAN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Load config, print pipelines, worker settings and cron jobs, but
    /// don't start anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Run as worker process `ID`. Used by the master when spawning workers.
    #[arg(long, value_name = "ID", hide = true)]
    pub worker: Option<u32>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
