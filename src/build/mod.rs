// src/build/mod.rs

//! Pipeline watching and change detection.
//!
//! This module is responsible for:
//! - Compiling each pipeline's `watch` / `exclude` source globs.
//! - Running the pipeline's compiler and classifying its output into
//!   diagnostics.
//! - Hashing output chunks to work out which ones actually changed.
//! - Wiring a `notify` watcher that recompiles a pipeline when its sources
//!   change and reports the result as a [`BuildEvent`].
//!
//! It does **not** decide anything about workers; that is the coordinator's
//! job.

pub mod chunks;
pub mod diagnostics;
pub mod patterns;
pub mod pipeline;
pub mod watcher;

pub use chunks::{ChunkVersionTable, chunk_name, compute_file_hash, scan_chunks};
pub use diagnostics::{Diagnostic, DiagnosticMatcher, Severity};
pub use patterns::SourceWatchProfile;
pub use pipeline::{CompileOutcome, Pipeline, PipelineSpec};
pub use watcher::{WatcherHandle, start_watching};

use crate::types::PipelineKind;

/// Build lifecycle events, one stream per pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    /// A compile of `pipeline` has begun.
    Started { pipeline: PipelineKind },
    /// A compile succeeded. `changed` lists chunk names whose content hash
    /// differs from the previous compile; it may be empty.
    Completed {
        pipeline: PipelineKind,
        changed: Vec<String>,
    },
    /// The compiler exited non-zero or reported errors.
    Failed {
        pipeline: PipelineKind,
        diagnostics: Vec<Diagnostic>,
    },
}

impl BuildEvent {
    pub fn pipeline(&self) -> PipelineKind {
        match self {
            BuildEvent::Started { pipeline }
            | BuildEvent::Completed { pipeline, .. }
            | BuildEvent::Failed { pipeline, .. } => *pipeline,
        }
    }
}
