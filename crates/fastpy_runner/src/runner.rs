//! Command runner trait and types.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::RunnerResult;

/// Default per-command timeout.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// How a command's execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitCondition {
    /// The process exited on its own.
    Exited,
    /// Killed after exceeding its timeout.
    TimedOut,
    /// Killed because the session was cancelled.
    Cancelled,
    /// The process could not be started.
    SpawnFailed,
}

impl std::fmt::Display for ExitCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exited => write!(f, "exited"),
            Self::TimedOut => write!(f, "timed out"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::SpawnFailed => write!(f, "failed to start"),
        }
    }
}

/// Result of one command execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// The argv that was run
    pub argv: Vec<String>,
    /// Exit code, if the process exited normally
    pub exit_code: Option<i32>,
    pub condition: ExitCondition,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
    /// Execution start time
    pub started_at: DateTime<Utc>,
    /// Execution end time
    pub finished_at: DateTime<Utc>,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// A result for a command that never started.
    pub fn spawn_failed(argv: &[String], message: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            argv: argv.to_vec(),
            exit_code: None,
            condition: ExitCondition::SpawnFailed,
            stdout: String::new(),
            stderr: message.into(),
            started_at: now,
            finished_at: now,
            duration_ms: 0,
        }
    }

    /// Check if execution was successful (exited with code 0).
    pub fn success(&self) -> bool {
        self.condition == ExitCondition::Exited && self.exit_code == Some(0)
    }

    /// Get combined output (stdout + stderr).
    pub fn combined_output(&self) -> String {
        if self.stdout.is_empty() {
            self.stderr.clone()
        } else if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }

    /// Short human-readable status, e.g. `exit code 1` or `timed out`.
    pub fn status_line(&self) -> String {
        match (self.condition, self.exit_code) {
            (ExitCondition::Exited, Some(code)) => format!("exit code {}", code),
            (ExitCondition::Exited, None) => "terminated by signal".to_string(),
            (condition, _) => condition.to_string(),
        }
    }
}

/// Per-command execution options.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub timeout: Duration,
    /// Echo output lines to the terminal as they arrive
    pub stream_output: bool,
    /// Spawn this file instead of resolving argv[0] on `PATH`
    pub executable: Option<PathBuf>,
    pub working_dir: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_COMMAND_TIMEOUT,
            stream_output: true,
            executable: None,
            working_dir: None,
        }
    }
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn quiet(mut self) -> Self {
        self.stream_output = false;
        self
    }

    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// Runs one command as a direct child process.
///
/// Implementations never route argv through a shell.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        argv: &[String],
        options: &RunOptions,
        cancel: &CancellationToken,
    ) -> RunnerResult<ExecutionResult>;
}
