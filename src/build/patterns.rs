// src/build/patterns.rs

use std::fmt;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::types::PipelineKind;

/// Compiled source globs for a single pipeline.
///
/// Patterns are relative to the application home; the watcher passes
/// relative paths such as `"components/index/index.server.ts"` into
/// [`matches`](Self::matches).
#[derive(Clone)]
pub struct SourceWatchProfile {
    pipeline: PipelineKind,
    watch_set: GlobSet,
    exclude_set: Option<GlobSet>,
}

impl fmt::Debug for SourceWatchProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceWatchProfile")
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

impl SourceWatchProfile {
    pub fn new(pipeline: PipelineKind, watch: &[String], exclude: &[String]) -> Result<Self> {
        let watch_set = build_globset(watch)
            .with_context(|| format!("building watch globset for pipeline {pipeline}"))?;

        let exclude_set = if exclude.is_empty() {
            None
        } else {
            Some(
                build_globset(exclude)
                    .with_context(|| format!("building exclude globset for pipeline {pipeline}"))?,
            )
        };

        Ok(Self {
            pipeline,
            watch_set,
            exclude_set,
        })
    }

    pub fn pipeline(&self) -> PipelineKind {
        self.pipeline
    }

    pub fn matches(&self, rel_path: &str) -> bool {
        if !self.watch_set.is_match(rel_path) {
            return false;
        }
        if let Some(exclude) = &self.exclude_set {
            if exclude.is_match(rel_path) {
                return false;
            }
        }
        true
    }
}

/// Build a GlobSet from simple string patterns.
pub fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}
