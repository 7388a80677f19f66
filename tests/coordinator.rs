// tests/coordinator.rs

mod common;
use crate::common::{completed, failed, init_tracing, started};

use avian::coord::{Coordinator, CoordinatorOptions, CoordinatorPhase, Decision, is_server_chunk};
use avian::types::PipelineKind::{Components, Services};

fn dev() -> Coordinator {
    Coordinator::new(CoordinatorOptions::default())
}

fn bundle_only() -> Coordinator {
    Coordinator::new(CoordinatorOptions {
        bundle_only: true,
        exit_on_failure: true,
        ..CoordinatorOptions::default()
    })
}

#[test]
fn cold_start_starts_pool_once_both_pipelines_complete() {
    init_tracing();
    let mut c = dev();
    assert_eq!(c.phase(), CoordinatorPhase::BothIdleInit);

    assert_eq!(c.step(started(Components), false), Decision::None);
    assert_eq!(c.step(started(Services), false), Decision::None);
    assert_eq!(c.phase(), CoordinatorPhase::Building);

    assert_eq!(
        c.step(completed(Components, &["main", "index.client"]), false),
        Decision::None,
        "services still building"
    );
    assert_eq!(
        c.step(completed(Services, &["index.server"]), false),
        Decision::StartPool
    );
    assert_eq!(c.phase(), CoordinatorPhase::Quiescent);
    assert!(c.pending().is_empty());
}

#[test]
fn components_only_rebuild_keeps_running_pool() {
    let mut c = dev();
    c.step(started(Components), false);
    c.step(started(Services), false);
    c.step(completed(Components, &["main"]), false);
    c.step(completed(Services, &["index.server"]), false);

    c.step(started(Components), true);
    assert_eq!(c.step(completed(Components, &["main"]), true), Decision::None);
    assert!(c.pending().is_empty());
}

#[test]
fn server_chunk_change_restarts_running_pool() {
    let mut c = dev();
    c.step(started(Services), true);
    assert_eq!(
        c.step(completed(Services, &["admin/users.server.routes"]), true),
        Decision::RestartPool
    );
}

#[test]
fn empty_change_set_is_valid_and_changes_nothing() {
    let mut c = dev();
    c.step(started(Services), true);
    assert_eq!(c.step(completed(Services, &[]), true), Decision::None);
}

#[test]
fn server_chunk_reported_while_other_pipeline_builds_is_kept_until_quiescence() {
    let mut c = dev();
    c.step(started(Services), true);
    c.step(started(Components), true);

    assert_eq!(c.step(completed(Services, &["index.server"]), true), Decision::None);
    assert_eq!(c.pending(), ["index.server".to_string()]);

    assert_eq!(c.step(completed(Components, &["main"]), true), Decision::RestartPool);
    assert!(c.pending().is_empty());
}

#[test]
fn started_is_a_flag_not_a_counter() {
    let mut c = dev();
    c.step(started(Components), true);
    c.step(started(Components), true);
    assert_eq!(c.step(completed(Components, &["x.server"]), true), Decision::RestartPool);
}

#[test]
fn failed_compile_stops_pool_and_waits_for_fix() {
    init_tracing();
    let mut c = dev();
    c.step(started(Services), true);
    assert_eq!(c.step(failed(Services, "boom"), true), Decision::StopPool);
    assert!(c.is_failed(Services));

    // Components rebuilding alone must not bring the pool back.
    c.step(started(Components), false);
    assert_eq!(c.step(completed(Components, &["main"]), false), Decision::None);

    // The fix arrives.
    c.step(started(Services), false);
    assert_eq!(c.step(completed(Services, &[]), false), Decision::StartPool);
    assert!(!c.is_failed(Services));
}

#[test]
fn failed_compile_without_pool_decides_nothing() {
    let mut c = dev();
    c.step(started(Components), false);
    assert_eq!(c.step(failed(Components, "syntax error"), false), Decision::None);
}

#[test]
fn bundle_only_exits_zero_after_both_builds() {
    let mut c = bundle_only();
    c.step(started(Components), false);
    c.step(started(Services), false);
    c.step(completed(Components, &["main"]), false);
    assert_eq!(c.step(completed(Services, &["index.server"]), false), Decision::Exit(0));
    assert_eq!(c.phase(), CoordinatorPhase::Shutdown);
}

#[test]
fn bundle_only_failure_exits_non_zero() {
    let mut c = bundle_only();
    c.step(started(Components), false);
    c.step(started(Services), false);
    assert_eq!(c.step(failed(Services, "boom"), false), Decision::Exit(1));
    assert_eq!(c.phase(), CoordinatorPhase::Shutdown);

    // Terminal: later events are ignored.
    assert_eq!(c.step(completed(Components, &["main"]), false), Decision::None);
}

#[test]
fn shutdown_ignores_later_builds() {
    let mut c = dev();
    c.shutdown();
    c.step(started(Components), false);
    assert_eq!(c.step(completed(Components, &["main"]), false), Decision::None);
    assert_eq!(c.phase(), CoordinatorPhase::Shutdown);
}

#[test]
fn custom_marker_is_used() {
    let mut c = Coordinator::new(CoordinatorOptions {
        server_chunk_marker: "ssr".to_string(),
        ..CoordinatorOptions::default()
    });
    c.step(started(Services), true);
    assert_eq!(c.step(completed(Services, &["index.server"]), true), Decision::None);
    c.step(started(Services), true);
    assert_eq!(c.step(completed(Services, &["page.ssr"]), true), Decision::RestartPool);
}

#[test]
fn server_chunk_naming_convention() {
    assert!(is_server_chunk("index.server", "server"));
    assert!(is_server_chunk("admin/users.server.routes", "server"));
    assert!(is_server_chunk("server/main", "server"));
    assert!(!is_server_chunk("main", "server"));
    assert!(!is_server_chunk("observer", "server"));
    assert!(!is_server_chunk("index.client", "server"));
    assert!(!is_server_chunk("serverless.client", "server"));
}
