// src/lib.rs

pub mod build;
pub mod cli;
pub mod config;
pub mod coord;
pub mod errors;
pub mod fs;
pub mod jobs;
pub mod logging;
pub mod supervisor;
pub mod types;
pub mod worker;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::build::{Pipeline, PipelineSpec, start_watching};
use crate::cli::CliArgs;
use crate::config::{ConfigFile, default_config_path, load_and_validate, load_or_default};
use crate::coord::{Coordinator, CoordinatorOptions, MasterEvent, MasterRuntime, spawn_ticker};
use crate::fs::{FileSystem, RealFileSystem};
use crate::jobs::{CronSchedule, CronScheduler, JobDispatcher, JobSource, RetryPolicy, open_store};
use crate::supervisor::{Supervisor, SupervisorOptions};
use crate::types::{AppIdentity, AppMode, PipelineKind};
use crate::worker::{ProcessWorkerBackend, WorkerEnv, run_worker};

/// High-level entry point used by `main.rs`. Returns the process exit code.
///
/// The same binary runs as master or, with `--worker <id>`, as one of the
/// master's workers.
pub async fn run(args: CliArgs) -> Result<i32> {
    let cwd = std::env::current_dir().context("reading current directory")?;
    let home = resolve_home(&cwd, args.home.as_deref());

    let (config_path, cfg) = match &args.config {
        Some(path) => {
            let path = cwd.join(path);
            let cfg = load_and_validate(&path)
                .with_context(|| format!("loading config {}", path.display()))?;
            (path, cfg)
        }
        None => {
            let path = default_config_path(&home);
            let cfg = load_or_default(&path)?;
            (path, cfg)
        }
    };

    let identity = resolve_identity(&args, &cfg, home);

    if let Some(id) = args.worker {
        run_worker(id, &cfg, &identity).await?;
        return Ok(0);
    }

    if args.dry_run {
        print_dry_run(&args, &cfg, &identity)?;
        return Ok(0);
    }

    run_master(&args, cfg, identity, config_path).await
}

/// Wire pipelines, coordinator, supervisor, job queue and signals together
/// and run the master loop.
async fn run_master(
    args: &CliArgs,
    cfg: ConfigFile,
    identity: AppIdentity,
    config_path: PathBuf,
) -> Result<i32> {
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let watch = identity.mode == AppMode::Development && !args.bundle_only;

    info!(
        app = %identity.name,
        home = ?identity.home,
        mode = %identity.mode,
        bundle_only = args.bundle_only,
        "starting avian master"
    );

    let (tx, rx) = mpsc::channel::<MasterEvent>(256);

    let pipelines = PipelineKind::ALL
        .into_iter()
        .map(|kind| Pipeline::new(PipelineSpec::from_config(kind, &cfg, &identity.home), fs.clone()))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let coordinator = Coordinator::new(CoordinatorOptions {
        bundle_only: args.bundle_only,
        exit_on_failure: !watch,
        server_chunk_marker: cfg.build.server_chunk_marker.clone(),
    });

    let worker_config = config_path.exists().then_some(config_path);
    let worker_env = WorkerEnv {
        log_level: args.log_level,
        ..WorkerEnv::current_exe(worker_config, identity.clone())?
    };
    let backend = ProcessWorkerBackend::new(worker_env, tx.clone());
    let mut supervisor = Supervisor::new(
        backend,
        SupervisorOptions {
            pool_size: cfg.workers.effective_count(),
            auto_restart: false,
        },
    );
    supervisor.set_auto_restart(cfg.workers.auto_restart);

    // No workers in bundle-only mode, so no cron jobs either.
    let mut tickers = Vec::new();
    let jobs = if args.bundle_only {
        None
    } else {
        let source = JobSource::new(fs.clone(), &identity.home, &cfg.cron.jobs_glob)?;
        let store = open_store(
            cfg.cron.storage,
            &identity.home,
            cfg.cron.redis_url.as_deref(),
            fs.clone(),
        )
        .await?;
        tickers.push(spawn_ticker(
            cfg.timings.scan_interval,
            MasterEvent::ScanTick,
            tx.clone(),
        ));
        tickers.push(spawn_ticker(
            cfg.timings.dispatch_interval,
            MasterEvent::DispatchTick,
            tx.clone(),
        ));
        Some(JobDispatcher::new(
            source,
            CronScheduler::new(Local::now().naive_local()),
            store,
            RetryPolicy::from_config(&cfg),
        ))
    };

    let watcher = start_watching(
        &identity.home,
        pipelines,
        watch,
        cfg.timings.debounce,
        tx.clone(),
    )?;

    // Ctrl-C → graceful shutdown.
    {
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(MasterEvent::ShutdownRequested).await;
        });
    }
    drop(tx);

    let runtime = MasterRuntime::new(coordinator, supervisor, jobs, rx);
    let code = runtime.run().await?;

    drop(watcher);
    for ticker in tickers {
        ticker.abort();
    }

    Ok(code)
}

fn resolve_home(cwd: &Path, home: Option<&Path>) -> PathBuf {
    let home = match home {
        Some(home) => cwd.join(home),
        None => cwd.to_path_buf(),
    };
    home.canonicalize().unwrap_or(home)
}

/// Name, port and mode resolve CLI/env first, then `[app]`, then defaults.
pub fn resolve_identity(args: &CliArgs, cfg: &ConfigFile, home: PathBuf) -> AppIdentity {
    AppIdentity {
        name: args
            .name
            .clone()
            .or_else(|| cfg.app.name.clone())
            .unwrap_or_else(|| AppIdentity::DEFAULT_NAME.to_string()),
        home,
        port: args.port.or(cfg.app.port).unwrap_or(AppIdentity::DEFAULT_PORT),
        mode: args.mode.or(cfg.app.mode).unwrap_or_default(),
    }
}

/// Print what would run, without starting anything.
fn print_dry_run(args: &CliArgs, cfg: &ConfigFile, identity: &AppIdentity) -> Result<()> {
    println!("avian dry-run");
    println!("  app.name = {}", identity.name);
    println!("  app.home = {}", identity.home.display());
    println!("  app.port = {}", identity.port);
    println!("  app.mode = {}", identity.mode);
    println!("  bundle_only = {}", args.bundle_only);
    println!();

    println!("pipelines:");
    for kind in PipelineKind::ALL {
        let spec = PipelineSpec::from_config(kind, cfg, &identity.home);
        println!("  - {kind}");
        println!("      cmd: {}", spec.cmd);
        println!("      output_dir: {}", spec.output_dir.display());
        println!("      watch: {:?}", spec.watch);
        if !spec.exclude.is_empty() {
            println!("      exclude: {:?}", spec.exclude);
        }
        println!("      chunk_suffixes: {:?}", spec.chunk_suffixes);
    }
    println!();

    println!("workers:");
    println!("  count: {}", cfg.workers.effective_count());
    println!("  auto_restart: {}", cfg.workers.auto_restart);
    if let Some(cmd) = &cfg.workers.serve_cmd {
        println!("  serve_cmd: {cmd}");
    }
    println!();

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let source = JobSource::new(fs, &identity.home, &cfg.cron.jobs_glob)?;
    let report = source.scan();
    let now = Local::now().naive_local();

    println!(
        "cron ({} jobs, storage {:?}, scan every {}, dispatch every {}):",
        report.jobs.len(),
        cfg.cron.storage,
        cfg.cron.scan_interval,
        cfg.cron.dispatch_interval
    );
    for job in &report.jobs {
        println!("  - {}", job.name);
        println!("      command: {} {}", job.command, job.args.join(" "));
        println!("      expression: {}", job.expression);
        if !job.enabled {
            println!("      enabled: false");
        }
        match CronSchedule::parse(&job.expression) {
            Ok(schedule) => {
                if let Some(next) = schedule.next_after(now) {
                    println!("      next: {next}");
                }
            }
            Err(err) => println!("      invalid: {err}"),
        }
    }
    for (path, err) in &report.errors {
        println!("  ! {}: {err}", path.display());
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
