// tests/supervisor.rs

mod common;
use crate::common::builders::JobBuilder;
use crate::common::fake_workers::FakeWorkerBackend;
use crate::common::init_tracing;

use std::error::Error;

use avian::supervisor::{ExitHandling, Supervisor, SupervisorOptions};

type TestResult = Result<(), Box<dyn Error>>;

fn pool(size: usize, auto_restart: bool) -> Supervisor<FakeWorkerBackend> {
    Supervisor::new(
        FakeWorkerBackend::new(),
        SupervisorOptions {
            pool_size: size,
            auto_restart,
        },
    )
}

#[test]
fn start_all_spawns_pool_size_workers() {
    init_tracing();
    let mut sup = pool(4, true);
    assert!(!sup.is_running());

    assert_eq!(sup.start_all(), [1, 2, 3, 4]);
    assert!(sup.is_running());
    assert_eq!(sup.backend().snapshot().spawned, [1, 2, 3, 4]);
}

#[test]
fn pool_size_is_at_least_one() {
    let mut sup = pool(0, true);
    assert_eq!(sup.pool_size(), 1);
    assert_eq!(sup.start_all(), [1]);
}

#[test]
fn kill_all_retires_every_worker() {
    let mut sup = pool(2, true);
    sup.start_all();

    assert!(sup.kill_all());
    assert!(!sup.is_running());
    assert_eq!(sup.retiring_ids(), [1, 2]);
    assert_eq!(sup.backend().snapshot().terminated, [1, 2]);

    // Nothing left to kill.
    assert!(!sup.kill_all());
}

#[test]
fn crashed_worker_is_replaced_with_a_new_id() {
    init_tracing();
    let mut sup = pool(2, true);
    sup.start_all();

    let exit = sup.handle_exit(1, Some(1));
    assert!(!exit.was_retiring);
    assert_eq!(exit.replacement, Some(3));
    assert_eq!(sup.worker_ids(), [2, 3]);
    assert_eq!(sup.backend().snapshot().released, [1]);
}

#[test]
fn crashed_worker_stays_down_without_auto_restart() {
    let mut sup = pool(2, false);
    sup.start_all();

    let exit = sup.handle_exit(2, None);
    assert_eq!(exit.replacement, None);
    assert_eq!(sup.worker_ids(), [1]);
}

#[test]
fn retired_worker_exit_is_not_replaced() {
    let mut sup = pool(2, true);
    sup.start_all();
    sup.kill_all();

    for id in [1, 2] {
        let exit = sup.handle_exit(id, None);
        assert!(exit.was_retiring);
        assert_eq!(exit.replacement, None);
    }
    assert!(sup.retiring_ids().is_empty());
    assert!(!sup.is_running());
    assert_eq!(sup.backend().snapshot().spawned, [1, 2]);
}

#[test]
fn restart_leaves_exactly_one_fresh_pool() {
    init_tracing();
    let mut sup = pool(3, true);
    sup.start_all();

    let fresh = sup.restart();
    assert_eq!(fresh, [4, 5, 6]);
    assert!(!sup.restart_in_progress());
    assert_eq!(sup.worker_ids(), [4, 5, 6]);
    assert_eq!(sup.retiring_ids(), [1, 2, 3]);

    // Old workers exiting afterwards must not add replacements.
    for id in [1, 2, 3] {
        assert_eq!(sup.handle_exit(id, Some(0)).replacement, None);
    }
    assert_eq!(sup.worker_ids(), [4, 5, 6]);
    assert_eq!(sup.backend().snapshot().spawned.len(), 6);
}

#[test]
fn exit_during_restart_window_is_not_replaced() {
    let mut sup = pool(2, true);
    sup.start_all();

    sup.begin_restart();
    assert_eq!(sup.handle_exit(1, Some(1)).replacement, None);
    sup.finish_restart();

    assert_eq!(sup.handle_exit(2, Some(1)).replacement, Some(3));
}

#[test]
fn shutdown_suppresses_replacements() {
    let mut sup = pool(2, true);
    sup.start_all();

    assert!(sup.shutdown());
    assert!(!sup.is_running());
    assert_eq!(sup.handle_exit(1, None).replacement, None);
    assert_eq!(sup.handle_exit(2, None).replacement, None);
    assert_eq!(sup.backend().snapshot().spawned, [1, 2]);
}

#[test]
fn exit_of_unknown_worker_is_ignored() {
    let mut sup = pool(1, true);
    sup.start_all();

    assert_eq!(sup.handle_exit(42, Some(1)), ExitHandling::default());
    assert_eq!(sup.worker_ids(), [1]);
}

#[test]
fn failed_spawns_leave_the_pool_empty() {
    init_tracing();
    let mut sup = Supervisor::new(
        FakeWorkerBackend::new().failing_spawns(),
        SupervisorOptions {
            pool_size: 3,
            auto_restart: true,
        },
    );

    assert!(sup.start_all().is_empty());
    assert!(!sup.is_running());
}

#[test]
fn only_ready_workers_without_jobs_are_idle() -> TestResult {
    let mut sup = pool(3, true);
    sup.start_all();
    assert!(sup.idle_workers_round_robin().is_empty());

    sup.mark_ready(1, 1001);
    sup.mark_ready(3, 1003);
    assert_eq!(sup.idle_workers_round_robin(), [1, 3]);

    sup.dispatch(1, JobBuilder::new("a").entry())?;
    assert_eq!(sup.idle_workers_round_robin(), [3]);
    assert!(sup.is_in_flight("a"));
    assert_eq!(sup.in_flight_on(1), ["a"]);
    Ok(())
}

#[test]
fn dispatch_to_unknown_worker_fails() {
    let mut sup = pool(1, true);
    sup.start_all();

    assert!(sup.dispatch(9, JobBuilder::new("a").entry()).is_err());
    assert!(sup.backend().snapshot().sent.is_empty());
}

#[test]
fn complete_job_returns_the_in_flight_entry() -> TestResult {
    let mut sup = pool(1, true);
    sup.start_all();
    sup.mark_ready(1, 1001);
    sup.dispatch(1, JobBuilder::new("a").entry())?;

    let entry = sup.complete_job(1, "a").expect("a is in flight");
    assert_eq!(entry.name(), "a");
    assert!(!sup.is_in_flight("a"));
    assert_eq!(sup.complete_job(1, "a"), None);
    assert_eq!(sup.idle_workers_round_robin(), [1]);
    Ok(())
}

#[test]
fn job_on_retiring_worker_can_still_complete() -> TestResult {
    let mut sup = pool(1, true);
    sup.start_all();
    sup.mark_ready(1, 1001);
    sup.dispatch(1, JobBuilder::new("a").entry())?;
    sup.kill_all();

    assert!(sup.is_in_flight("a"));
    assert!(sup.complete_job(1, "a").is_some());
    assert!(sup.handle_exit(1, Some(0)).orphaned.is_empty());
    Ok(())
}

#[test]
fn crash_hands_back_unfinished_jobs() -> TestResult {
    let mut sup = pool(1, true);
    sup.start_all();
    sup.mark_ready(1, 1001);
    sup.dispatch(1, JobBuilder::new("a").entry())?;

    let exit = sup.handle_exit(1, Some(137));
    assert_eq!(exit.orphaned, [JobBuilder::new("a").entry()]);
    assert_eq!(exit.replacement, Some(2));
    Ok(())
}
