// src/jobs/scan.rs

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use globset::{Glob, GlobMatcher};
use tracing::{debug, warn};

use crate::errors::{AvianError, Result};
use crate::fs::{FileSystem, relative_str, walk_files};
use crate::jobs::model::{ComponentJobsFile, CronJobDescriptor};

/// Everything one scan found.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Declared jobs, first declaration wins for duplicate names.
    pub jobs: Vec<CronJobDescriptor>,
    /// Files that could not be read or parsed, with the reason.
    pub errors: Vec<(PathBuf, String)>,
}

/// Where job declarations live: every file under `home` matching the
/// configured glob (`components/**/*.config.json` by default).
#[derive(Debug, Clone)]
pub struct JobSource {
    fs: Arc<dyn FileSystem>,
    home: PathBuf,
    matcher: GlobMatcher,
    base: PathBuf,
}

impl JobSource {
    pub fn new(fs: Arc<dyn FileSystem>, home: impl Into<PathBuf>, pattern: &str) -> Result<Self> {
        let home = home.into();
        let matcher = Glob::new(pattern)
            .map_err(|e| AvianError::ConfigError(format!("invalid jobs glob '{pattern}': {e}")))?
            .compile_matcher();
        let base = home.join(glob_base(pattern));
        Ok(Self {
            fs,
            home,
            matcher,
            base,
        })
    }

    /// Re-read every declaration file from disk.
    ///
    /// A file that fails to parse is logged and skipped; it never aborts the
    /// scan of the others.
    pub fn scan(&self) -> ScanReport {
        let mut report = ScanReport::default();

        let files = match walk_files(self.fs.as_ref(), &self.base) {
            Ok(files) => files,
            Err(err) => {
                warn!(dir = ?self.base, error = %err, "could not list job declaration files");
                report.errors.push((self.base.clone(), err.to_string()));
                return report;
            }
        };

        let mut seen = HashSet::new();
        for path in files {
            let Some(rel) = relative_str(&self.home, &path) else {
                continue;
            };
            if !self.matcher.is_match(&rel) {
                continue;
            }

            match self.read_file(&path) {
                Ok(jobs) => {
                    debug!(file = %rel, jobs = jobs.len(), "read job declarations");
                    for job in jobs {
                        if seen.insert(job.name.clone()) {
                            report.jobs.push(job);
                        } else {
                            warn!(job = %job.name, file = %rel, "duplicate cron job name; ignoring");
                        }
                    }
                }
                Err(err) => {
                    warn!(file = %rel, error = %err, "skipping malformed job declaration file");
                    report.errors.push((path, err));
                }
            }
        }

        report
    }

    fn read_file(&self, path: &Path) -> std::result::Result<Vec<CronJobDescriptor>, String> {
        let contents = self.fs.read_to_string(path).map_err(|e| e.to_string())?;
        let file: ComponentJobsFile =
            serde_json::from_str(&contents).map_err(|e| e.to_string())?;
        Ok(file.cron_jobs)
    }
}

/// Longest leading run of path segments without glob syntax, excluding the
/// final (file name) segment. `components/**/*.config.json` → `components`.
fn glob_base(pattern: &str) -> PathBuf {
    let segments: Vec<&str> = pattern.split('/').collect();
    let dirs = &segments[..segments.len().saturating_sub(1)];
    dirs.iter()
        .take_while(|s| !s.contains(['*', '?', '[', '{']))
        .collect()
}
