// src/build/diagnostics.rs

use std::fmt;

use regex::{Captures, Regex};

use crate::errors::{AvianError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// A single compiler-reported problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub message: String,
}

impl Diagnostic {
    /// A diagnostic that did not come from a compiler line, e.g. a non-zero
    /// exit without any recognisable error output.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            file: None,
            line: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, "{file}:{line}: {}", self.message),
            (Some(file), None) => write!(f, "{file}: {}", self.message),
            _ => f.write_str(&self.message),
        }
    }
}

/// Classifies compiler output lines into diagnostics.
///
/// Both patterns may use the named groups `file`, `line` and `message`; a
/// pattern without `message` uses the whole line.
#[derive(Debug, Clone)]
pub struct DiagnosticMatcher {
    error: Regex,
    warning: Regex,
}

impl DiagnosticMatcher {
    pub fn new(error_pattern: &str, warning_pattern: &str) -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| {
                AvianError::ConfigError(format!("invalid diagnostic pattern '{pattern}': {e}"))
            })
        };
        Ok(Self {
            error: compile(error_pattern)?,
            warning: compile(warning_pattern)?,
        })
    }

    pub fn classify(&self, line: &str) -> Option<Diagnostic> {
        let line = line.trim_end();
        if let Some(caps) = self.error.captures(line) {
            return Some(from_captures(Severity::Error, line, &caps));
        }
        if let Some(caps) = self.warning.captures(line) {
            return Some(from_captures(Severity::Warning, line, &caps));
        }
        None
    }

    /// Classify every line of the compiler's output.
    pub fn scan<'a, I>(&self, lines: I) -> Vec<Diagnostic>
    where
        I: IntoIterator<Item = &'a str>,
    {
        lines.into_iter().filter_map(|l| self.classify(l)).collect()
    }
}

fn from_captures(severity: Severity, line: &str, caps: &Captures<'_>) -> Diagnostic {
    let message = caps
        .name("message")
        .map(|m| m.as_str().trim())
        .filter(|m| !m.is_empty())
        .unwrap_or(line)
        .to_string();

    Diagnostic {
        severity,
        file: caps.name("file").map(|m| m.as_str().to_string()),
        line: caps.name("line").and_then(|m| m.as_str().parse().ok()),
        message,
    }
}
