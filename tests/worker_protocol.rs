// tests/worker_protocol.rs

mod common;
use crate::common::builders::JobBuilder;
use crate::common::init_tracing;

use std::error::Error;

use avian::jobs::CronJobResult;
use avian::worker::protocol::{decode_line, encode_line};
use avian::worker::{MasterMessage, WorkerMessage, execute_job};

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn messages_are_single_tagged_json_lines() -> TestResult {
    let line = encode_line(&WorkerMessage::Ready { pid: 4242 })?;
    assert_eq!(line, "{\"type\":\"ready\",\"pid\":4242}\n");

    let line = encode_line(&WorkerMessage::JobFinished(CronJobResult {
        name: "nightly-cleanup".into(),
        success: false,
    }))?;
    assert_eq!(line.matches('\n').count(), 1);
    assert!(line.contains("\"type\":\"job_finished\""));

    assert_eq!(encode_line(&MasterMessage::Shutdown)?, "{\"type\":\"shutdown\"}\n");
    Ok(())
}

#[test]
fn run_job_carries_the_full_descriptor() -> TestResult {
    let job = JobBuilder::new("report")
        .command("node")
        .arg("scripts/report.js")
        .expression("0 8 * * 1")
        .build();

    let line = encode_line(&MasterMessage::RunJob { job: job.clone() })?;
    let decoded: MasterMessage = decode_line(&line)?;
    assert_eq!(decoded, MasterMessage::RunJob { job });
    Ok(())
}

#[test]
fn decode_reads_lines_written_by_hand() -> TestResult {
    let msg: WorkerMessage =
        decode_line("  {\"type\":\"job_finished\",\"name\":\"a\",\"success\":true}\r\n")?;
    assert_eq!(
        msg,
        WorkerMessage::JobFinished(CronJobResult {
            name: "a".into(),
            success: true,
        })
    );
    Ok(())
}

#[test]
fn non_protocol_lines_do_not_decode() {
    assert!(decode_line::<WorkerMessage>("listening on :8080").is_err());
    assert!(decode_line::<WorkerMessage>("{\"type\":\"bogus\"}").is_err());
    assert!(decode_line::<MasterMessage>("{\"type\":\"run_job\"}").is_err());
}

#[cfg(unix)]
#[tokio::test]
async fn execute_job_reports_exit_status() {
    init_tracing();
    let home = std::env::temp_dir();

    let ok = JobBuilder::new("ok").command("sh").arg("-c").arg("echo hi").build();
    assert_eq!(
        execute_job(&ok, &home).await,
        CronJobResult {
            name: "ok".into(),
            success: true,
        }
    );

    let failing = JobBuilder::new("nightly-cleanup")
        .command("sh")
        .arg("-c")
        .arg("exit 1")
        .build();
    assert!(!execute_job(&failing, &home).await.success);
}

#[tokio::test]
async fn execute_job_with_missing_command_fails() {
    let job = JobBuilder::new("ghost")
        .command("avian-test-command-that-does-not-exist")
        .build();
    let result = execute_job(&job, &std::env::temp_dir()).await;
    assert_eq!(result.name, "ghost");
    assert!(!result.success);
}
