// src/build/watcher.rs

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::build::BuildEvent;
use crate::build::diagnostics::Diagnostic;
use crate::build::patterns::SourceWatchProfile;
use crate::build::pipeline::{CompileOutcome, Pipeline};
use crate::coord::MasterEvent;
use crate::fs::relative_str;

/// Handle for the pipeline watchers.
///
/// Keeps the underlying `RecommendedWatcher` alive; dropping the handle
/// stops file watching and aborts the pipeline loops.
pub struct WatcherHandle {
    _inner: Option<RecommendedWatcher>,
    tasks: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle")
            .field("watching", &self._inner.is_some())
            .field("pipelines", &self.tasks.len())
            .finish()
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Start one compile loop per pipeline.
///
/// Every pipeline compiles once immediately. With `watch = true` a recursive
/// `notify` watcher on `home` then recompiles a pipeline whenever one of its
/// source globs sees a change, after `debounce` of quiet. Compiles of the
/// same pipeline never overlap, so its events are strictly ordered; the two
/// pipelines run independently of each other.
///
/// Returns once the watcher is armed; never waits for a compile.
pub fn start_watching(
    home: impl Into<PathBuf>,
    pipelines: Vec<Pipeline>,
    watch: bool,
    debounce: Duration,
    master_tx: mpsc::Sender<MasterEvent>,
) -> Result<WatcherHandle> {
    let home = home.into();
    let home = home.canonicalize().unwrap_or_else(|_| home.clone());

    let mut tasks = Vec::with_capacity(pipelines.len() + 1);
    let mut routes: Vec<(SourceWatchProfile, mpsc::UnboundedSender<()>)> = Vec::new();

    for pipeline in pipelines {
        let trigger_rx = if watch {
            let spec = pipeline.spec();
            let profile = SourceWatchProfile::new(spec.kind, &spec.watch, &spec.exclude)?;
            let (trigger_tx, trigger_rx) = mpsc::unbounded_channel::<()>();
            routes.push((profile, trigger_tx));
            Some(trigger_rx)
        } else {
            None
        };

        let tx = master_tx.clone();
        tasks.push(tokio::spawn(run_pipeline_loop(
            pipeline, trigger_rx, debounce, tx,
        )));
    }

    if !watch {
        return Ok(WatcherHandle {
            _inner: None,
            tasks,
        });
    }

    // Channel from the blocking notify callback into the async world.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if let Err(err) = event_tx.send(event) {
                    // No tracing from the notify thread; fall back to stderr.
                    eprintln!("avian: failed to forward notify event: {err}");
                }
            }
            Err(err) => {
                eprintln!("avian: file watch error: {err}");
            }
        },
        Config::default(),
    )?;

    watcher.watch(&home, RecursiveMode::Recursive)?;

    info!(home = ?home, pipelines = routes.len(), "pipeline watchers armed");

    let router_home = home.clone();
    tasks.push(tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if event.kind.is_access() {
                continue;
            }
            for path in &event.paths {
                let Some(rel) = relative_str(&router_home, path) else {
                    continue;
                };
                for (profile, trigger_tx) in &routes {
                    if profile.matches(&rel) {
                        debug!(pipeline = %profile.pipeline(), path = %rel, "source changed");
                        let _ = trigger_tx.send(());
                    }
                }
            }
        }
        debug!("watcher event loop finished");
    }));

    Ok(WatcherHandle {
        _inner: Some(watcher),
        tasks,
    })
}

async fn run_pipeline_loop(
    mut pipeline: Pipeline,
    mut trigger_rx: Option<mpsc::UnboundedReceiver<()>>,
    debounce: Duration,
    master_tx: mpsc::Sender<MasterEvent>,
) {
    let kind = pipeline.kind();

    loop {
        let started = BuildEvent::Started { pipeline: kind };
        if master_tx.send(MasterEvent::Build(started)).await.is_err() {
            break;
        }

        let finished = match pipeline.compile().await {
            Ok(CompileOutcome::Succeeded { changed, .. }) => BuildEvent::Completed {
                pipeline: kind,
                changed,
            },
            Ok(CompileOutcome::Failed { diagnostics, .. }) => BuildEvent::Failed {
                pipeline: kind,
                diagnostics,
            },
            Err(err) => {
                error!(pipeline = %kind, error = %err, "could not run compiler");
                BuildEvent::Failed {
                    pipeline: kind,
                    diagnostics: vec![Diagnostic::error(err.to_string())],
                }
            }
        };

        if master_tx.send(MasterEvent::Build(finished)).await.is_err() {
            break;
        }

        let Some(rx) = trigger_rx.as_mut() else {
            break;
        };
        if !wait_for_change(rx, debounce).await {
            break;
        }
    }

    debug!(pipeline = %kind, "pipeline loop finished");
}

/// Wait for a source change, then for `debounce` without further changes.
///
/// Returns false once the trigger channel is closed.
async fn wait_for_change(rx: &mut mpsc::UnboundedReceiver<()>, debounce: Duration) -> bool {
    if rx.recv().await.is_none() {
        return false;
    }
    loop {
        match tokio::time::timeout(debounce, rx.recv()).await {
            Ok(Some(())) => continue,
            Ok(None) => return false,
            Err(_elapsed) => return true,
        }
    }
}
