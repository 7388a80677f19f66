// tests/job_scan.rs

mod common;
use crate::common::init_tracing;

use std::error::Error;
use std::fs;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use tempfile::tempdir;

use avian::fs::RealFileSystem;
use avian::fs::mock::MockFileSystem;
use avian::jobs::{CronScheduler, JobSource};

type TestResult = Result<(), Box<dyn Error>>;

const GLOB: &str = "components/**/*.config.json";

fn at(h: u32, mi: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 3, 2)
        .and_then(|d| d.and_hms_opt(h, mi, s))
        .expect("valid test timestamp")
}

#[test]
fn scans_cron_jobs_from_component_configs() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_file(
        "./components/admin/admin.config.json",
        r#"{
            "route": "/admin",
            "cronJobs": [
                {"name": "nightly-cleanup", "command": "node", "args": ["cleanup.js"], "expression": "0 3 * * *"},
                {"name": "report", "command": "node", "expression": "0 8 * * 1", "enabled": false}
            ]
        }"#,
    );
    fs.add_file("./components/index/index.config.json", r#"{"route": "/"}"#);
    fs.add_file("./components/index/index.server.ts", "export {}");

    let source = JobSource::new(Arc::new(fs), ".", GLOB)?;
    let report = source.scan();

    assert!(report.errors.is_empty());
    let names: Vec<_> = report.jobs.iter().map(|j| j.name.as_str()).collect();
    assert_eq!(names, ["nightly-cleanup", "report"]);
    assert_eq!(report.jobs[0].args, ["cleanup.js"]);
    assert!(report.jobs[0].enabled);
    assert!(!report.jobs[1].enabled);
    Ok(())
}

#[test]
fn malformed_file_does_not_stop_the_scan() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_file("./components/a/a.config.json", "{ not json");
    fs.add_file(
        "./components/b/b.config.json",
        r#"{"cronJobs": [{"name": "b-job", "command": "true", "expression": "* * * * *"}]}"#,
    );

    let report = JobSource::new(Arc::new(fs), ".", GLOB)?.scan();

    assert_eq!(report.jobs.len(), 1);
    assert_eq!(report.jobs[0].name, "b-job");
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].0.ends_with("a.config.json"));
    Ok(())
}

#[test]
fn duplicate_names_keep_first_declaration() -> TestResult {
    let fs = MockFileSystem::new();
    fs.add_file(
        "./components/a/a.config.json",
        r#"{"cronJobs": [{"name": "dup", "command": "first", "expression": "* * * * *"}]}"#,
    );
    fs.add_file(
        "./components/b/b.config.json",
        r#"{"cronJobs": [{"name": "dup", "command": "second", "expression": "* * * * *"}]}"#,
    );

    let report = JobSource::new(Arc::new(fs), ".", GLOB)?.scan();
    assert_eq!(report.jobs.len(), 1);
    assert_eq!(report.jobs[0].command, "first");
    Ok(())
}

#[test]
fn missing_components_dir_yields_nothing() -> TestResult {
    let report = JobSource::new(Arc::new(MockFileSystem::new()), ".", GLOB)?.scan();
    assert!(report.jobs.is_empty());
    assert!(report.errors.is_empty());
    Ok(())
}

#[test]
fn scans_real_directory_and_picks_up_edits() -> TestResult {
    let dir = tempdir()?;
    let component = dir.path().join("components").join("shop");
    fs::create_dir_all(&component)?;
    let config = component.join("shop.config.json");
    fs::write(
        &config,
        r#"{"cronJobs": [{"name": "sync", "command": "true", "expression": "*/5 * * * *"}]}"#,
    )?;

    let source = JobSource::new(Arc::new(RealFileSystem), dir.path(), GLOB)?;
    assert_eq!(source.scan().jobs[0].expression, "*/5 * * * *");

    fs::write(
        &config,
        r#"{"cronJobs": [{"name": "sync", "command": "true", "expression": "0 * * * *"}]}"#,
    )?;
    assert_eq!(source.scan().jobs[0].expression, "0 * * * *");
    Ok(())
}

#[test]
fn scheduler_installs_enabled_jobs_and_reports_due_once_per_window() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_file(
        "./components/a/a.config.json",
        r#"{"cronJobs": [
            {"name": "nightly-cleanup", "command": "true", "expression": "0 3 * * *"},
            {"name": "off", "command": "true", "expression": "* * * * *", "enabled": false},
            {"name": "broken", "command": "true", "expression": "not cron"}
        ]}"#,
    );
    let report = JobSource::new(Arc::new(fs), ".", GLOB)?.scan();

    let mut scheduler = CronScheduler::new(at(2, 59, 50));
    scheduler.install(&report.jobs);
    assert!(scheduler.is_installed("nightly-cleanup"));
    assert!(!scheduler.is_installed("off"));
    assert!(!scheduler.is_installed("broken"));

    assert!(scheduler.due(at(2, 59, 55)).is_empty());
    let due = scheduler.due(at(3, 0, 0));
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].name, "nightly-cleanup");
    // Same window again: nothing new.
    assert!(scheduler.due(at(3, 0, 0)).is_empty());
    assert!(scheduler.due(at(3, 0, 5)).is_empty());
    Ok(())
}

#[test]
fn disabling_a_job_uninstalls_its_trigger() -> TestResult {
    use avian_test_utils::builders::JobBuilder;

    let mut scheduler = CronScheduler::new(at(0, 0, 0));
    scheduler.install(&[JobBuilder::new("a").build(), JobBuilder::new("b").build()]);
    assert_eq!(scheduler.len(), 2);

    scheduler.install(&[JobBuilder::new("a").disabled().build(), JobBuilder::new("b").build()]);
    assert_eq!(scheduler.len(), 1);
    assert!(!scheduler.is_installed("a"));

    let due: Vec<_> = scheduler.due(at(0, 1, 0)).into_iter().map(|j| j.name).collect();
    assert_eq!(due, ["b"]);
    Ok(())
}
