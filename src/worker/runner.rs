// src/worker/runner.rs

//! The worker side: the loop a `--worker` process runs.

use std::path::Path;
use std::process::{ExitStatus, Stdio};

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ConfigFile;
use crate::jobs::model::{CronJobDescriptor, CronJobResult};
use crate::supervisor::WorkerId;
use crate::types::AppIdentity;
use crate::worker::protocol::{MasterMessage, WorkerMessage, decode_line, encode_line};

/// Run as worker `id` until the master says stop.
///
/// The worker exits cleanly on a `shutdown` message, on EOF on stdin (the
/// master went away) or on SIGTERM. If `workers.serve_cmd` is set, the
/// command runs for the worker's whole life and its exit ends the worker
/// with an error, which the master sees as a crash.
pub async fn run_worker(id: WorkerId, cfg: &ConfigFile, identity: &AppIdentity) -> Result<()> {
    let pid = std::process::id();
    info!(worker = id, pid, "worker started");

    let mut stdout = tokio::io::stdout();
    write_message(&mut stdout, &WorkerMessage::Ready { pid }).await?;

    let mut serve = match &cfg.workers.serve_cmd {
        Some(cmd) => Some(spawn_serve(cmd, id, identity)?),
        None => None,
    };

    let mut terminate = shutdown_signal()?;
    let (result_tx, mut result_rx) = mpsc::unbounded_channel::<CronJobResult>();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("reading from master")? else {
                    info!(worker = id, "master closed the channel; exiting");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match decode_line::<MasterMessage>(&line) {
                    Ok(MasterMessage::RunJob { job }) => {
                        let tx = result_tx.clone();
                        let home = identity.home.clone();
                        tokio::spawn(async move {
                            let result = execute_job(&job, &home).await;
                            let _ = tx.send(result);
                        });
                    }
                    Ok(MasterMessage::Shutdown) => {
                        info!(worker = id, "shutdown requested by master");
                        break;
                    }
                    Err(err) => warn!(worker = id, error = %err, "ignoring malformed message"),
                }
            }
            Some(result) = result_rx.recv() => {
                write_message(&mut stdout, &WorkerMessage::JobFinished(result)).await?;
            }
            status = wait_serve(&mut serve) => {
                let status = status.context("waiting for serve command")?;
                bail!("serve command exited ({status})");
            }
            Some(()) = terminate.recv() => {
                info!(worker = id, "terminated");
                break;
            }
            Ok(()) = tokio::signal::ctrl_c() => {
                // The terminal delivers Ctrl-C to the whole process group;
                // the master decides when workers stop.
                debug!(worker = id, "ignoring interrupt");
            }
        }
    }

    Ok(())
}

/// Run one cron job to completion. Exit code 0 is success; a job that cannot
/// be started counts as failed.
pub async fn execute_job(job: &CronJobDescriptor, home: &Path) -> CronJobResult {
    info!(job = %job.name, command = %job.command, args = ?job.args, "running cron job");

    let output = Command::new(&job.command)
        .args(&job.args)
        .current_dir(home)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await;

    let success = match output {
        Ok(output) => {
            let text = String::from_utf8_lossy(&output.stdout);
            for line in text.lines() {
                debug!(job = %job.name, "stdout: {}", line);
            }
            let text = String::from_utf8_lossy(&output.stderr);
            for line in text.lines() {
                debug!(job = %job.name, "stderr: {}", line);
            }

            if output.status.success() {
                info!(job = %job.name, "cron job finished");
            } else {
                warn!(job = %job.name, exit_code = ?output.status.code(), "cron job failed");
            }
            output.status.success()
        }
        Err(err) => {
            warn!(job = %job.name, error = %err, "could not start cron job");
            false
        }
    };

    CronJobResult {
        name: job.name.clone(),
        success,
    }
}

async fn write_message<W: AsyncWrite + Unpin>(out: &mut W, message: &WorkerMessage) -> Result<()> {
    let line = encode_line(message)?;
    out.write_all(line.as_bytes())
        .await
        .context("writing to master")?;
    out.flush().await.context("flushing to master")?;
    Ok(())
}

/// Start the serve command. Its stdout is forwarded to our log because our
/// own stdout belongs to the protocol.
fn spawn_serve(cmd: &str, id: WorkerId, identity: &AppIdentity) -> Result<Child> {
    let mut command = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    };

    command
        .current_dir(&identity.home)
        .envs(identity.env_vars())
        .env("AVIAN_WORKER_ID", id.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .with_context(|| format!("spawning serve command '{cmd}'"))?;

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(worker = id, "serve: {}", line);
            }
        });
    }

    info!(worker = id, cmd = %cmd, "serve command started");
    Ok(child)
}

async fn wait_serve(child: &mut Option<Child>) -> std::io::Result<ExitStatus> {
    match child {
        Some(child) => child.wait().await,
        None => std::future::pending().await,
    }
}

fn shutdown_signal() -> Result<mpsc::Receiver<()>> {
    let (tx, rx) = mpsc::channel(1);

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
        tokio::spawn(async move {
            term.recv().await;
            let _ = tx.send(()).await;
        });
    }

    // Without signals the master stops workers by closing stdin.
    #[cfg(not(unix))]
    drop(tx);

    Ok(rx)
}
