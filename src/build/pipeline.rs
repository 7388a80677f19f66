// src/build/pipeline.rs

//! One compile of one pipeline.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use anyhow::Context;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::build::chunks::{ChunkVersionTable, scan_chunks};
use crate::build::diagnostics::{Diagnostic, DiagnosticMatcher, Severity};
use crate::config::ConfigFile;
use crate::errors::Result;
use crate::fs::FileSystem;
use crate::types::PipelineKind;

/// Fully resolved settings for one pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSpec {
    pub kind: PipelineKind,
    pub cmd: String,
    pub home: PathBuf,
    /// Absolute (home-joined) directory the compiler writes chunks into.
    pub output_dir: PathBuf,
    pub watch: Vec<String>,
    pub exclude: Vec<String>,
    pub chunk_suffixes: Vec<String>,
    pub error_pattern: String,
    pub warning_pattern: String,
}

impl PipelineSpec {
    pub fn from_config(kind: PipelineKind, cfg: &ConfigFile, home: &Path) -> Self {
        let p = cfg.pipeline.get(kind);
        Self {
            kind,
            cmd: p.effective_cmd(kind),
            home: home.to_path_buf(),
            output_dir: home.join(p.effective_output_dir(kind)),
            watch: p.effective_watch(kind),
            exclude: p.effective_exclude(),
            chunk_suffixes: p.effective_chunk_suffixes(kind),
            error_pattern: p.effective_error_pattern().to_string(),
            warning_pattern: p.effective_warning_pattern().to_string(),
        }
    }
}

/// Result of a single compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileOutcome {
    Succeeded {
        changed: Vec<String>,
        warnings: Vec<Diagnostic>,
    },
    Failed {
        exit_code: Option<i32>,
        diagnostics: Vec<Diagnostic>,
    },
}

/// A pipeline together with its chunk version table.
#[derive(Debug)]
pub struct Pipeline {
    spec: PipelineSpec,
    matcher: DiagnosticMatcher,
    chunks: ChunkVersionTable,
    fs: Arc<dyn FileSystem>,
}

impl Pipeline {
    pub fn new(spec: PipelineSpec, fs: Arc<dyn FileSystem>) -> Result<Self> {
        let matcher = DiagnosticMatcher::new(&spec.error_pattern, &spec.warning_pattern)?;
        Ok(Self {
            spec,
            matcher,
            chunks: ChunkVersionTable::new(),
            fs,
        })
    }

    pub fn kind(&self) -> PipelineKind {
        self.spec.kind
    }

    pub fn spec(&self) -> &PipelineSpec {
        &self.spec
    }

    pub fn chunks(&self) -> &ChunkVersionTable {
        &self.chunks
    }

    /// Run the compiler to completion and evaluate what it produced.
    ///
    /// Only a failure to launch the compiler is an `Err`; a compiler that
    /// runs and fails is a [`CompileOutcome::Failed`].
    pub async fn compile(&mut self) -> Result<CompileOutcome> {
        info!(pipeline = %self.spec.kind, cmd = %self.spec.cmd, "compiling pipeline");

        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.spec.cmd);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.spec.cmd);
            c
        };

        cmd.current_dir(&self.spec.home)
            .env("AVIAN_PIPELINE", self.spec.kind.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = cmd
            .output()
            .await
            .with_context(|| format!("running compiler for pipeline '{}'", self.spec.kind))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push('\n');
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            debug!(pipeline = %self.spec.kind, "compiler: {}", line);
        }

        let outcome = self.evaluate(output.status.success(), output.status.code(), &text)?;

        match &outcome {
            CompileOutcome::Succeeded { changed, warnings } => {
                for w in warnings {
                    warn!(pipeline = %self.spec.kind, "{}", w);
                }
                info!(
                    pipeline = %self.spec.kind,
                    changed = changed.len(),
                    warnings = warnings.len(),
                    "pipeline compiled"
                );
            }
            CompileOutcome::Failed { exit_code, diagnostics } => {
                warn!(
                    pipeline = %self.spec.kind,
                    ?exit_code,
                    errors = diagnostics.len(),
                    "pipeline compile failed"
                );
            }
        }

        Ok(outcome)
    }

    /// Turn a finished compiler run into an outcome.
    ///
    /// Any error diagnostic fails the compile even when the compiler exited
    /// zero. The chunk table is only touched on success, so a failed compile
    /// never hides changes from the next good one.
    pub fn evaluate(
        &mut self,
        success: bool,
        exit_code: Option<i32>,
        output: &str,
    ) -> Result<CompileOutcome> {
        let diagnostics = self.matcher.scan(output.lines());
        let (errors, warnings): (Vec<_>, Vec<_>) = diagnostics
            .into_iter()
            .partition(|d| d.severity == Severity::Error);

        if !success || !errors.is_empty() {
            let diagnostics = if errors.is_empty() {
                vec![Diagnostic::error(match exit_code {
                    Some(code) => format!("compiler exited with code {code}"),
                    None => "compiler terminated by signal".to_string(),
                })]
            } else {
                errors
            };
            return Ok(CompileOutcome::Failed {
                exit_code,
                diagnostics,
            });
        }

        let current = scan_chunks(self.fs.as_ref(), &self.spec.output_dir, &self.spec.chunk_suffixes)?;
        let changed = self.chunks.record(current);

        Ok(CompileOutcome::Succeeded { changed, warnings })
    }
}
