#![allow(dead_code)]

pub use avian_test_utils::builders;
pub use avian_test_utils::failing_store;
pub use avian_test_utils::fake_workers;
pub use avian_test_utils::{init_tracing, with_timeout};

use avian::build::{BuildEvent, Diagnostic};
use avian::types::PipelineKind;

pub fn started(pipeline: PipelineKind) -> BuildEvent {
    BuildEvent::Started { pipeline }
}

pub fn completed(pipeline: PipelineKind, changed: &[&str]) -> BuildEvent {
    BuildEvent::Completed {
        pipeline,
        changed: changed.iter().map(|s| s.to_string()).collect(),
    }
}

pub fn failed(pipeline: PipelineKind, message: &str) -> BuildEvent {
    BuildEvent::Failed {
        pipeline,
        diagnostics: vec![Diagnostic::error(message)],
    }
}
