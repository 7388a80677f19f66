// src/worker/process.rs

//! Real worker processes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::LogLevel;
use crate::coord::MasterEvent;
use crate::errors::{AvianError, Result};
use crate::supervisor::{WorkerBackend, WorkerId};
use crate::types::AppIdentity;
use crate::worker::protocol::{MasterMessage, WorkerMessage, decode_line, encode_line};

/// What every worker is launched with.
#[derive(Debug, Clone)]
pub struct WorkerEnv {
    /// Binary to run; normally the current executable.
    pub program: PathBuf,
    /// Passed as `--config`; without it workers fall back to the home's
    /// default config like the master did.
    pub config_path: Option<PathBuf>,
    pub identity: AppIdentity,
    /// The master's `--log-level`, repeated for every worker.
    pub log_level: Option<LogLevel>,
}

impl WorkerEnv {
    pub fn current_exe(config_path: Option<PathBuf>, identity: AppIdentity) -> Result<Self> {
        Ok(Self {
            program: std::env::current_exe()?,
            config_path,
            identity,
            log_level: None,
        })
    }
}

struct WorkerChannel {
    pid: Option<u32>,
    tx: mpsc::UnboundedSender<MasterMessage>,
}

/// Spawns `avian --worker <id>` children and wires their pipes to the
/// master's event channel.
///
/// Per worker, one task writes queued messages to stdin and one task reads
/// stdout until EOF, then reaps the process and reports the exit. Reading to
/// EOF before reaping keeps a worker's last result ahead of its exit event.
pub struct ProcessWorkerBackend {
    env: WorkerEnv,
    events: mpsc::Sender<MasterEvent>,
    workers: HashMap<WorkerId, WorkerChannel>,
}

impl std::fmt::Debug for ProcessWorkerBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessWorkerBackend")
            .field("program", &self.env.program)
            .field("workers", &self.workers.len())
            .finish_non_exhaustive()
    }
}

impl ProcessWorkerBackend {
    pub fn new(env: WorkerEnv, events: mpsc::Sender<MasterEvent>) -> Self {
        Self {
            env,
            events,
            workers: HashMap::new(),
        }
    }

    fn command(&self, id: WorkerId) -> Command {
        let mut cmd = Command::new(&self.env.program);
        cmd.arg("--worker").arg(id.to_string());
        if let Some(path) = &self.env.config_path {
            cmd.arg("--config").arg(path);
        }
        if let Some(level) = self.env.log_level {
            cmd.arg("--log-level").arg(level.as_str());
        }
        cmd.current_dir(&self.env.identity.home)
            .envs(self.env.identity.env_vars())
            .env("AVIAN_WORKER_ID", id.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        cmd
    }
}

impl WorkerBackend for ProcessWorkerBackend {
    fn spawn_worker(&mut self, id: WorkerId) -> Result<()> {
        let mut child = self.command(id).spawn().map_err(|e| AvianError::Worker {
            worker: id,
            reason: format!("spawning worker process: {e}"),
        })?;

        let pid = child.id();
        let (tx, rx) = mpsc::unbounded_channel();

        if let Some(stdin) = child.stdin.take() {
            tokio::spawn(write_messages(id, stdin, rx));
        }
        let stdout = child.stdout.take();
        tokio::spawn(monitor(id, child, stdout, self.events.clone()));

        info!(worker = id, ?pid, "worker process spawned");
        self.workers.insert(id, WorkerChannel { pid, tx });
        Ok(())
    }

    fn send(&mut self, id: WorkerId, message: MasterMessage) -> Result<()> {
        let channel = self.workers.get(&id).ok_or_else(|| AvianError::Worker {
            worker: id,
            reason: "no such worker process".to_string(),
        })?;
        channel.tx.send(message).map_err(|_| AvianError::Worker {
            worker: id,
            reason: "worker stdin closed".to_string(),
        })
    }

    fn terminate(&mut self, id: WorkerId) -> Result<()> {
        // Dropping the channel closes stdin, which a worker also treats as
        // a request to exit.
        let Some(channel) = self.workers.remove(&id) else {
            return Ok(());
        };
        let _ = channel.tx.send(MasterMessage::Shutdown);
        match channel.pid {
            Some(pid) => signal_terminate(id, pid),
            None => Ok(()),
        }
    }

    fn release(&mut self, id: WorkerId) {
        self.workers.remove(&id);
    }
}

async fn write_messages(
    id: WorkerId,
    mut stdin: ChildStdin,
    mut rx: mpsc::UnboundedReceiver<MasterMessage>,
) {
    while let Some(message) = rx.recv().await {
        let line = match encode_line(&message) {
            Ok(line) => line,
            Err(err) => {
                warn!(worker = id, error = %err, "could not encode message for worker");
                continue;
            }
        };
        if let Err(err) = stdin.write_all(line.as_bytes()).await {
            debug!(worker = id, error = %err, "worker stdin closed");
            break;
        }
        if stdin.flush().await.is_err() {
            break;
        }
    }
}

async fn monitor(
    id: WorkerId,
    mut child: Child,
    stdout: Option<ChildStdout>,
    events: mpsc::Sender<MasterEvent>,
) {
    if let Some(stdout) = stdout {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match decode_line::<WorkerMessage>(&line) {
                Ok(message) => {
                    let event = MasterEvent::Worker {
                        worker: id,
                        message,
                    };
                    if events.send(event).await.is_err() {
                        return;
                    }
                }
                Err(_) => debug!(worker = id, "stdout: {}", line),
            }
        }
    }

    let code = match child.wait().await {
        Ok(status) => status.code(),
        Err(err) => {
            warn!(worker = id, error = %err, "failed to wait for worker process");
            None
        }
    };
    let _ = events.send(MasterEvent::WorkerExited { worker: id, code }).await;
}

#[cfg(unix)]
fn signal_terminate(id: WorkerId, pid: u32) -> Result<()> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(|_| AvianError::Worker {
        worker: id,
        reason: format!("pid {pid} out of range"),
    })?;
    match kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) => Ok(()),
        // Already gone; its exit is on the way.
        Err(nix::errno::Errno::ESRCH) => Ok(()),
        Err(err) => Err(AvianError::Worker {
            worker: id,
            reason: format!("sending SIGTERM: {err}"),
        }),
    }
}

#[cfg(not(unix))]
fn signal_terminate(_id: WorkerId, _pid: u32) -> Result<()> {
    Ok(())
}
