// tests/build_outputs.rs

mod common;
use crate::common::builders::ConfigFileBuilder;
use crate::common::init_tracing;

use std::collections::BTreeMap;
use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use avian::build::{
    ChunkVersionTable, CompileOutcome, Diagnostic, DiagnosticMatcher, Pipeline, PipelineSpec,
    Severity, SourceWatchProfile, chunk_name, scan_chunks,
};
use avian::config::model::{DEFAULT_ERROR_PATTERN, DEFAULT_WARNING_PATTERN};
use avian::fs::mock::MockFileSystem;
use avian::types::PipelineKind;

type TestResult = Result<(), Box<dyn Error>>;

fn suffixes(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn hashes(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn default_pipeline(kind: PipelineKind, fs: MockFileSystem) -> Result<Pipeline, Box<dyn Error>> {
    let cfg = ConfigFileBuilder::new().build();
    let spec = PipelineSpec::from_config(kind, &cfg, Path::new("."));
    Ok(Pipeline::new(spec, Arc::new(fs))?)
}

#[test]
fn chunk_name_strips_first_matching_suffix() {
    let s = suffixes(&[".bundle.js", ".js"]);
    assert_eq!(
        chunk_name("admin/index.client.bundle.js", &s).as_deref(),
        Some("admin/index.client")
    );
    assert_eq!(chunk_name("vendor.js", &s).as_deref(), Some("vendor"));
    assert_eq!(chunk_name("vendor.js.map", &s), None);
    assert_eq!(chunk_name(".js", &s), None);
}

#[test]
fn first_record_reports_every_chunk() {
    let mut table = ChunkVersionTable::new();
    let changed = table.record(hashes(&[("index.server", "h1"), ("admin.server", "h2")]));
    assert_eq!(changed, ["admin.server", "index.server"]);
    assert_eq!(table.len(), 2);
    assert_eq!(table.hash_of("index.server"), Some("h1"));
}

#[test]
fn record_reports_only_new_or_changed_hashes() {
    let mut table = ChunkVersionTable::new();
    table.record(hashes(&[("a", "1"), ("b", "2"), ("c", "3")]));

    let changed = table.record(hashes(&[("a", "1"), ("b", "20"), ("d", "4")]));
    assert_eq!(changed, ["b", "d"]);

    // "c" vanished: forgotten, and reported again if it comes back.
    assert_eq!(table.hash_of("c"), None);
    assert_eq!(table.record(hashes(&[("a", "1"), ("b", "20"), ("c", "3"), ("d", "4")])), ["c"]);

    assert!(table.record(hashes(&[("a", "1"), ("b", "20"), ("c", "3"), ("d", "4")])).is_empty());
}

#[test]
fn scan_chunks_hashes_files_below_output_dir() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_file("./private/index/index.server.js", "module.exports = 1");
    fs.add_file("./private/index/index.server.js.map", "{}");
    fs.add_file("./private/admin.server.routes.js", "module.exports = 2");

    let chunks = scan_chunks(&fs, Path::new("./private"), &suffixes(&[".js"]))?;
    let names: Vec<_> = chunks.keys().map(String::as_str).collect();
    assert_eq!(names, ["admin.server.routes", "index/index.server"]);
    assert_ne!(chunks["admin.server.routes"], chunks["index/index.server"]);
    Ok(())
}

#[test]
fn scan_chunks_of_missing_output_dir_is_empty() -> TestResult {
    let fs = MockFileSystem::new();
    assert!(scan_chunks(&fs, Path::new("./public"), &suffixes(&[".js"]))?.is_empty());
    Ok(())
}

#[test]
fn source_profile_applies_excludes() -> TestResult {
    let profile = SourceWatchProfile::new(
        PipelineKind::Services,
        &suffixes(&["components/**/*.server.*"]),
        &suffixes(&["components/legacy/**"]),
    )?;

    assert_eq!(profile.pipeline(), PipelineKind::Services);
    assert!(profile.matches("components/index/index.server.ts"));
    assert!(!profile.matches("components/index/index.client.ts"));
    assert!(!profile.matches("components/legacy/old.server.ts"));
    Ok(())
}

#[test]
fn default_matcher_reads_webpack_headers() -> TestResult {
    let matcher = DiagnosticMatcher::new(DEFAULT_ERROR_PATTERN, DEFAULT_WARNING_PATTERN)?;

    let err = matcher
        .classify("ERROR in ./components/a.server.ts 3:7-12 Module not found")
        .expect("error line");
    assert_eq!(err.severity, Severity::Error);
    assert_eq!(err.file.as_deref(), Some("./components/a.server.ts"));
    assert_eq!(err.line, Some(3));
    assert_eq!(err.message, "Module not found");
    assert_eq!(err.to_string(), "./components/a.server.ts:3: Module not found");

    let warn = matcher
        .classify("WARNING in ./components/b.client.ts")
        .expect("warning line");
    assert_eq!(warn.severity, Severity::Warning);
    assert_eq!(warn.line, None);
    assert_eq!(warn.message, "WARNING in ./components/b.client.ts");

    assert_eq!(matcher.classify("asset index.js 1.2 KiB [emitted]"), None);
    Ok(())
}

#[test]
fn invalid_diagnostic_pattern_is_rejected() {
    assert!(DiagnosticMatcher::new("(unclosed", DEFAULT_WARNING_PATTERN).is_err());
}

#[test]
fn successful_compile_reports_changed_chunks() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_file("./private/index.server.js", "v1");
    fs.add_file("./private/admin.server.js", "v1");
    let mut pipeline = default_pipeline(PipelineKind::Services, fs.clone())?;

    let first = pipeline.evaluate(true, Some(0), "asset index.server.js emitted")?;
    assert_eq!(
        first,
        CompileOutcome::Succeeded {
            changed: vec!["admin.server".into(), "index.server".into()],
            warnings: vec![],
        }
    );

    // Rebuild with identical output: nothing changed.
    let second = pipeline.evaluate(true, Some(0), "")?;
    assert_eq!(
        second,
        CompileOutcome::Succeeded {
            changed: vec![],
            warnings: vec![],
        }
    );

    fs.add_file("./private/index.server.js", "v2");
    let third = pipeline.evaluate(true, Some(0), "")?;
    assert!(matches!(third, CompileOutcome::Succeeded { changed, .. } if changed == ["index.server"]));
    Ok(())
}

#[test]
fn error_output_fails_compile_even_with_zero_exit() -> TestResult {
    let fs = MockFileSystem::new();
    fs.add_file("./public/index.client.bundle.js", "v1");
    let mut pipeline = default_pipeline(PipelineKind::Components, fs)?;

    let outcome = pipeline.evaluate(
        true,
        Some(0),
        "WARNING in ./a.ts\nERROR in ./b.ts 1:1 Unexpected token",
    )?;
    match outcome {
        CompileOutcome::Failed { diagnostics, .. } => {
            assert_eq!(diagnostics.len(), 1);
            assert_eq!(diagnostics[0].message, "Unexpected token");
        }
        other => panic!("expected failure, got {other:?}"),
    }

    // The failed compile did not record chunks, so the next success still
    // reports them.
    assert!(pipeline.chunks().is_empty());
    let next = pipeline.evaluate(true, Some(0), "")?;
    assert!(matches!(next, CompileOutcome::Succeeded { changed, .. } if changed == ["index.client"]));
    Ok(())
}

#[test]
fn non_zero_exit_without_errors_still_fails() -> TestResult {
    let mut pipeline = default_pipeline(PipelineKind::Services, MockFileSystem::new())?;

    let outcome = pipeline.evaluate(false, Some(2), "something went wrong")?;
    assert_eq!(
        outcome,
        CompileOutcome::Failed {
            exit_code: Some(2),
            diagnostics: vec![Diagnostic::error("compiler exited with code 2")],
        }
    );
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn compile_runs_the_configured_command() -> TestResult {
    use avian::fs::RealFileSystem;

    init_tracing();
    let dir = tempfile::tempdir()?;
    let cfg = ConfigFileBuilder::new()
        .with_services_cmd("mkdir -p private && printf 'module.exports = 1' > private/index.server.js")
        .build();
    let spec = PipelineSpec::from_config(PipelineKind::Services, &cfg, dir.path());
    let mut pipeline = Pipeline::new(spec, Arc::new(RealFileSystem))?;

    let outcome = pipeline.compile().await?;
    assert!(matches!(outcome, CompileOutcome::Succeeded { changed, .. } if changed == ["index.server"]));

    let cfg = ConfigFileBuilder::new().with_services_cmd("exit 3").build();
    let spec = PipelineSpec::from_config(PipelineKind::Services, &cfg, dir.path());
    let mut failing = Pipeline::new(spec, Arc::new(RealFileSystem))?;
    assert!(matches!(
        failing.compile().await?,
        CompileOutcome::Failed { exit_code: Some(3), .. }
    ));
    Ok(())
}
