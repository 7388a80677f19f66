// src/coord/core.rs

//! Pure build coordinator.
//!
//! Consumes [`BuildEvent`]s and decides what happens to the worker pool. It
//! owns no channels, processes or timers, so every transition can be tested
//! directly.
//!
//! Per pipeline it tracks whether a compile is running and whether the last
//! compile failed. Once no pipeline is running (quiescence) it decides, in
//! order:
//! - bundle-only: exit (`0`, or `1` if anything failed);
//! - a pipeline is broken: nothing, wait for a fixed recompile;
//! - no pool running: start one;
//! - a server-affecting chunk changed: restart the pool;
//! - otherwise: nothing.
//!
//! The pending change-set is cleared whenever a decision is made.
//!
//! A failed compile is a fatal stop and does not wait for quiescence: the
//! pool is stopped at once (or the master exits when it is not watching).

use tracing::{debug, info, warn};

use crate::build::BuildEvent;
use crate::types::PipelineKind;

#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Exit after the first build instead of starting workers.
    pub bundle_only: bool,
    /// Exit on a failed compile instead of waiting for a fix. Set when
    /// nothing is watching for fixes.
    pub exit_on_failure: bool,
    /// Segment that marks a chunk name as server-affecting.
    pub server_chunk_marker: String,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            bundle_only: false,
            exit_on_failure: false,
            server_chunk_marker: "server".to_string(),
        }
    }
}

/// What the runtime should do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    None,
    StartPool,
    RestartPool,
    StopPool,
    Exit(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorPhase {
    /// Nothing has been built yet.
    BothIdleInit,
    /// At least one pipeline is compiling.
    Building,
    /// Neither pipeline is compiling.
    Quiescent,
    Shutdown,
}

#[derive(Debug, Clone, Copy, Default)]
struct PipelineState {
    running: bool,
    failed: bool,
    built: bool,
}

#[derive(Debug)]
pub struct Coordinator {
    components: PipelineState,
    services: PipelineState,
    pending: Vec<String>,
    options: CoordinatorOptions,
    shutdown: bool,
}

impl Coordinator {
    pub fn new(options: CoordinatorOptions) -> Self {
        Self {
            components: PipelineState::default(),
            services: PipelineState::default(),
            pending: Vec::new(),
            options,
            shutdown: false,
        }
    }

    pub fn phase(&self) -> CoordinatorPhase {
        if self.shutdown {
            CoordinatorPhase::Shutdown
        } else if self.components.running || self.services.running {
            CoordinatorPhase::Building
        } else if !self.components.built && !self.services.built {
            CoordinatorPhase::BothIdleInit
        } else {
            CoordinatorPhase::Quiescent
        }
    }

    pub fn is_building(&self, pipeline: PipelineKind) -> bool {
        self.state(pipeline).running
    }

    pub fn is_failed(&self, pipeline: PipelineKind) -> bool {
        self.state(pipeline).failed
    }

    pub fn is_quiescent(&self) -> bool {
        !self.components.running && !self.services.running
    }

    /// Changed chunk names collected since the last decision.
    pub fn pending(&self) -> &[String] {
        &self.pending
    }

    /// Enter the terminal state; later events are ignored.
    pub fn shutdown(&mut self) {
        self.shutdown = true;
        self.pending.clear();
    }

    /// Apply one build event. `pool_running` is the supervisor's current
    /// view of the pool.
    pub fn step(&mut self, event: BuildEvent, pool_running: bool) -> Decision {
        if self.shutdown {
            return Decision::None;
        }

        match event {
            BuildEvent::Started { pipeline } => {
                let state = self.state_mut(pipeline);
                state.running = true;
                debug!(pipeline = %pipeline, "build started");
                Decision::None
            }
            BuildEvent::Completed { pipeline, changed } => {
                let state = self.state_mut(pipeline);
                state.running = false;
                state.failed = false;
                state.built = true;
                debug!(pipeline = %pipeline, changed = ?changed, "build completed");
                self.pending.extend(changed);
                self.decide(pool_running)
            }
            BuildEvent::Failed {
                pipeline,
                diagnostics,
            } => {
                let state = self.state_mut(pipeline);
                state.running = false;
                state.failed = true;
                state.built = true;
                warn!(pipeline = %pipeline, errors = diagnostics.len(), "build failed");
                self.pending.clear();

                if self.options.bundle_only || self.options.exit_on_failure {
                    self.shutdown = true;
                    Decision::Exit(1)
                } else if pool_running {
                    Decision::StopPool
                } else {
                    Decision::None
                }
            }
        }
    }

    fn decide(&mut self, pool_running: bool) -> Decision {
        if !self.is_quiescent() {
            return Decision::None;
        }

        let changed = std::mem::take(&mut self.pending);
        let any_failed = self.components.failed || self.services.failed;

        if self.options.bundle_only {
            self.shutdown = true;
            let code = if any_failed { 1 } else { 0 };
            info!(code, "bundle complete");
            return Decision::Exit(code);
        }

        if any_failed {
            info!("quiescent with a failed pipeline; waiting for a fix");
            return Decision::None;
        }

        if !pool_running {
            info!("build quiescent; starting worker pool");
            return Decision::StartPool;
        }

        let marker = self.options.server_chunk_marker.as_str();
        if let Some(chunk) = changed.iter().find(|c| is_server_chunk(c, marker)) {
            info!(chunk = %chunk, changed = changed.len(), "server chunk changed; restarting workers");
            return Decision::RestartPool;
        }

        debug!(changed = changed.len(), "no server chunk changed; keeping workers");
        Decision::None
    }

    fn state(&self, pipeline: PipelineKind) -> &PipelineState {
        match pipeline {
            PipelineKind::Components => &self.components,
            PipelineKind::Services => &self.services,
        }
    }

    fn state_mut(&mut self, pipeline: PipelineKind) -> &mut PipelineState {
        match pipeline {
            PipelineKind::Components => &mut self.components,
            PipelineKind::Services => &mut self.services,
        }
    }
}

/// Whether `chunk` affects the server: one of its `.`/`/` separated segments
/// equals `marker`. With the default marker `index.server` and
/// `admin/users.server.routes` are server chunks, `main` and `observer` are
/// not.
pub fn is_server_chunk(chunk: &str, marker: &str) -> bool {
    chunk
        .split(['.', '/', '\\'])
        .any(|segment| segment == marker)
}
