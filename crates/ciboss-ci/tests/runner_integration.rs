//! Integration tests for the test command runner against real subprocesses.
#![cfg(unix)]

use ciboss_ci::{CommandRunner, TestCommand, TestOutcome, MAX_LOG_CHARS};
use std::time::Instant;

#[tokio::test]
async fn test_stderr_is_merged_after_stdout() {
    let command = TestCommand::shell("merge", "echo out; echo err 1>&2; exit 1");
    let report = CommandRunner::new(command).run().await;

    assert_eq!(report.outcome, TestOutcome::Failed { exit_code: Some(1) });
    let out_at = report.logs.find("out").expect("stdout captured");
    let err_at = report.logs.find("err").expect("stderr captured");
    assert!(out_at < err_at, "stdout should precede stderr");
    assert!(report.logs.contains("--- STDERR ---"));
}

#[tokio::test]
async fn test_long_output_truncated_to_exact_budget() {
    let command = TestCommand::shell("flood", "yes x | head -c 50000");
    let report = CommandRunner::new(command).run().await;

    assert!(report.passed());
    assert_eq!(report.logs.chars().count(), MAX_LOG_CHARS);
}

#[tokio::test]
async fn test_timeout_kills_child_and_marks_logs() {
    let command = TestCommand::shell("slow", "echo started; sleep 30").with_timeout_secs(1);
    let start = Instant::now();
    let report = CommandRunner::new(command).run().await;

    assert!(start.elapsed().as_secs() < 10, "runner must not wait for the child");
    assert_eq!(report.outcome, TestOutcome::TimedOut { after_secs: 1 });
    assert!(report.logs.ends_with("[ciboss] test execution timed out after 1s"));
    assert!(!report.passed());
}

#[tokio::test]
async fn test_missing_executable_is_failure() {
    let command = TestCommand::argv(
        "missing",
        vec!["ciboss-definitely-not-installed".to_string()],
    );
    let report = CommandRunner::new(command).run().await;

    assert!(matches!(report.outcome, TestOutcome::ExecutionError { .. }));
    assert!(report
        .logs
        .starts_with("[ciboss] failed to execute test command:"));
}

#[tokio::test]
async fn test_working_directory_is_respected() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("marker.txt"), "present").expect("write marker");

    let command = TestCommand::shell("cwd", "cat marker.txt").with_working_dir(dir.path());
    let report = CommandRunner::new(command).run().await;

    assert!(report.passed());
    assert!(report.logs.contains("present"));
}

#[tokio::test]
async fn test_timeout_kills_grandchildren() {
    let dir = tempfile::tempdir().expect("tempdir");
    let late = dir.path().join("late.txt");
    let line = format!("sh -c 'sleep 3; touch {}'; true", late.display());
    let command = TestCommand::shell("nested", line).with_timeout_secs(1);

    let report = CommandRunner::new(command).run().await;
    assert_eq!(report.outcome, TestOutcome::TimedOut { after_secs: 1 });

    tokio::time::sleep(std::time::Duration::from_secs(4)).await;
    assert!(!late.exists(), "nested process outlived the timeout");
}

#[tokio::test]
async fn test_flooding_output_is_drained_and_capped() {
    let command = TestCommand::shell("flood", "head -c 20000000 /dev/zero | tr '\\0' x");
    let report = CommandRunner::new(command).run().await;

    assert!(report.passed());
    assert_eq!(report.logs.chars().count(), MAX_LOG_CHARS);
    assert!(report.logs.chars().all(|c| c == 'x'));
}
