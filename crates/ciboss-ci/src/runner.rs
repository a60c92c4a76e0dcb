//! Test command execution.

use crate::command::TestCommand;
use crate::error::ExecError;
use crate::logs::{combine_streams, fit_with_marker, truncate_chars, MAX_LOG_CHARS};
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// How a test execution ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TestOutcome {
    /// Exit code 0.
    Passed,

    /// Non-zero exit, or killed by a signal (`exit_code` is `None`).
    Failed { exit_code: Option<i32> },

    /// The wall-clock ceiling expired and the child was killed.
    TimedOut { after_secs: u64 },

    /// The command could not be run at all.
    ExecutionError { message: String },
}

/// Result of one test execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestReport {
    /// Command type that produced this report.
    pub command_name: String,

    /// How the execution ended.
    pub outcome: TestOutcome,

    /// Combined, truncated output (at most `MAX_LOG_CHARS` characters).
    pub logs: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl TestReport {
    /// Whether the tests passed (exit code 0).
    pub fn passed(&self) -> bool {
        self.outcome == TestOutcome::Passed
    }

    /// Build a report from an exit code and raw output, applying the same
    /// truncation as a real execution.
    pub fn from_exit(command_name: impl Into<String>, exit_code: i32, output: &str) -> Self {
        let outcome = if exit_code == 0 {
            TestOutcome::Passed
        } else {
            TestOutcome::Failed {
                exit_code: Some(exit_code),
            }
        };
        Self {
            command_name: command_name.into(),
            outcome,
            logs: truncate_chars(output, MAX_LOG_CHARS),
            duration_ms: 0,
        }
    }
}

/// Literal appended to the logs when a run hits its timeout.
pub fn timeout_marker(after_secs: u64) -> String {
    format!("[ciboss] test execution timed out after {after_secs}s")
}

/// Literal appended to the logs when the command could not be run.
pub fn execution_error_marker(error: &dyn std::fmt::Display) -> String {
    format!("[ciboss] failed to execute test command: {error}")
}

/// Bytes kept per stream; the rest is read and discarded.
pub const MAX_CAPTURE_BYTES: usize = MAX_LOG_CHARS * 4;

/// Raw output of a child that exited on its own.
struct RawOutput {
    exit_code: Option<i32>,
    success: bool,
    stdout: String,
    stderr: String,
}

/// Runs a configured test command as a subprocess.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    command: TestCommand,
}

impl CommandRunner {
    pub fn new(command: TestCommand) -> Self {
        Self { command }
    }

    pub fn command(&self) -> &TestCommand {
        &self.command
    }

    /// Execute the command and map the result to a [`TestReport`].
    ///
    /// Never fails: timeouts and spawn errors become failed outcomes with a
    /// marker appended to the logs.
    pub async fn run(&self) -> TestReport {
        let start = Instant::now();
        info!(
            command = %self.command.display_line(),
            working_dir = ?self.command.working_dir,
            timeout_secs = self.command.timeout_secs,
            "Running test command"
        );

        let (outcome, logs) = match self.execute().await {
            Ok(raw) => {
                let combined = combine_streams(&raw.stdout, &raw.stderr);
                let logs = truncate_chars(&combined, MAX_LOG_CHARS);
                if raw.success {
                    info!("Test command passed");
                    (TestOutcome::Passed, logs)
                } else {
                    warn!(exit_code = ?raw.exit_code, "Test command failed");
                    (
                        TestOutcome::Failed {
                            exit_code: raw.exit_code,
                        },
                        logs,
                    )
                }
            }
            Err(ExecError::TimedOut {
                after_secs,
                partial_output,
            }) => {
                warn!(after_secs, "Test command timed out");
                let logs = fit_with_marker(
                    &partial_output,
                    &timeout_marker(after_secs),
                    MAX_LOG_CHARS,
                );
                (TestOutcome::TimedOut { after_secs }, logs)
            }
            Err(e) => {
                warn!(error = %e, "Test command could not be executed");
                let logs = fit_with_marker("", &execution_error_marker(&e), MAX_LOG_CHARS);
                (
                    TestOutcome::ExecutionError {
                        message: e.to_string(),
                    },
                    logs,
                )
            }
        };

        TestReport {
            command_name: self.command.name.clone(),
            outcome,
            logs,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn execute(&self) -> Result<RawOutput, ExecError> {
        let (exe, args) = self
            .command
            .program
            .split_first()
            .ok_or(ExecError::EmptyCommand)?;

        let mut std_cmd = std::process::Command::new(exe);
        std_cmd
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.command.working_dir {
            std_cmd.current_dir(dir);
        }
        // Own process group, so a timeout also reaches the shell's children.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            std_cmd.process_group(0);
        }
        let mut cmd = Command::from(std_cmd);
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
            program: exe.clone(),
            source,
        })?;
        let pid = child.id();

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        let after_secs = self.command.timeout_secs.max(1);
        let waited = tokio::time::timeout(Duration::from_secs(after_secs), async {
            futures::try_join!(
                read_bounded(stdout_pipe.as_mut(), &mut stdout, MAX_CAPTURE_BYTES),
                read_bounded(stderr_pipe.as_mut(), &mut stderr, MAX_CAPTURE_BYTES),
                child.wait(),
            )
        })
        .await;

        match waited {
            Ok(joined) => {
                let (_, _, status) = joined?;
                Ok(RawOutput {
                    exit_code: status.code(),
                    success: status.success(),
                    stdout: String::from_utf8_lossy(&stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&stderr).into_owned(),
                })
            }
            Err(_) => {
                if let Some(pid) = pid {
                    kill_process_group(pid);
                }
                if let Err(e) = child.kill().await {
                    debug!(error = %e, "Child already exited before kill");
                }
                let partial = combine_streams(
                    &String::from_utf8_lossy(&stdout),
                    &String::from_utf8_lossy(&stderr),
                );
                Err(ExecError::TimedOut {
                    after_secs,
                    partial_output: partial,
                })
            }
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: killpg has no memory-safety preconditions; the group was
    // created for this child by `process_group(0)`.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        debug!(
            pgid,
            error = %std::io::Error::last_os_error(),
            "Process group already gone"
        );
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

/// Read `pipe` to EOF, keeping at most `cap` bytes in `buf`.
///
/// Draining continues past the cap so the child never blocks on a full pipe.
async fn read_bounded<R>(
    pipe: Option<&mut R>,
    buf: &mut Vec<u8>,
    cap: usize,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let Some(pipe) = pipe else {
        return Ok(());
    };
    let mut chunk = [0u8; 8192];
    loop {
        let n = pipe.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        let room = cap.saturating_sub(buf.len());
        buf.extend_from_slice(&chunk[..n.min(room)]);
    }
}
