//! Test Executor seam and the `test_runner` node.

use async_trait::async_trait;
use ciboss_ci::{truncate_chars, CommandRunner, TestOutcome, TestReport, MAX_LOG_CHARS};
use tracing::{info, warn};

use crate::domain::error::{CiError, Result};
use crate::domain::run_state::{NextAction, RunState, TestStatus};

/// Something that can run the test suite for a run.
#[async_trait]
pub trait TestExecutor: Send + Sync {
    /// Command type used in issue titles (e.g. "Playwright").
    fn command_name(&self) -> &str;

    /// Run the suite. Implementations never fail: every problem is reported
    /// through [`TestReport::outcome`].
    async fn execute(&self, state: &RunState) -> TestReport;
}

#[async_trait]
impl TestExecutor for CommandRunner {
    fn command_name(&self) -> &str {
        &self.command().name
    }

    async fn execute(&self, _state: &RunState) -> TestReport {
        self.run().await
    }
}

/// One pass of the `test_runner` node.
///
/// Only valid when the planner chose `run_tests` and the commit SHA is known;
/// otherwise the state is left untouched and an error is returned.
pub async fn run_test_cycle(
    executor: &dyn TestExecutor,
    state: &mut RunState,
) -> Result<TestReport> {
    if state.next_action != Some(NextAction::RunTests) {
        return Err(CiError::InvalidTransition(format!(
            "test runner invoked with next_action {:?}",
            state.next_action.map(NextAction::as_str)
        )));
    }
    let Some(sha) = state.commit_sha().map(str::to_string) else {
        return Err(CiError::InvalidTransition(
            "test runner invoked without a commit SHA".to_string(),
        ));
    };

    state.begin_test_cycle();
    info!(
        run_id = %state.run_id,
        sha = %sha,
        cycle = state.test_runs(),
        command = executor.command_name(),
        "Running tests"
    );

    let mut report = executor.execute(state).await;
    report.logs = truncate_chars(&report.logs, MAX_LOG_CHARS);

    let status = if report.passed() {
        TestStatus::Passed
    } else {
        TestStatus::Failed
    };
    let soft_error = match &report.outcome {
        TestOutcome::Passed | TestOutcome::Failed { .. } => None,
        TestOutcome::TimedOut { after_secs } => Some(CiError::TestExecutionTimeout {
            after_secs: *after_secs,
        }),
        TestOutcome::ExecutionError { message } => Some(CiError::TestExecution(message.clone())),
    };
    if let Some(e) = soft_error {
        warn!(run_id = %state.run_id, error = %e, "Test run did not complete");
    }
    state.finish_test_cycle(status, report.logs.clone())?;

    info!(
        run_id = %state.run_id,
        status = %status,
        duration_ms = report.duration_ms,
        log_chars = report.logs.chars().count(),
        "Test cycle finished"
    );
    Ok(report)
}
