//! Mock command runner for testing.
//!
//! Captures every call and returns scripted responses, so execution can be
//! tested without spawning processes.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::{RunnerError, RunnerResult};
use crate::runner::{CommandRunner, ExecutionResult, ExitCondition, RunOptions};

/// Predefined mock response for a command execution.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub exit_code: Option<i32>,
    pub condition: ExitCondition,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl MockResponse {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            condition: ExitCondition::Exited,
            stdout: stdout.into(),
            stderr: String::new(),
            duration_ms: 100,
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            condition: ExitCondition::Exited,
            stdout: String::new(),
            stderr: stderr.into(),
            duration_ms: 100,
        }
    }

    pub fn timed_out() -> Self {
        Self {
            exit_code: None,
            condition: ExitCondition::TimedOut,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 300_000,
        }
    }

    pub fn with_duration(mut self, ms: u64) -> Self {
        self.duration_ms = ms;
        self
    }
}

/// Captured call information for verification.
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub argv: Vec<String>,
    pub timeout: Duration,
    pub executable: Option<String>,
}

/// Mock command runner for testing.
#[derive(Clone, Default)]
pub struct MockRunner {
    /// Predefined responses, used in order and then cycled.
    responses: Arc<RwLock<Vec<MockResponse>>>,
    /// Index of next response to return.
    response_index: Arc<AtomicUsize>,
    /// Captured calls for verification.
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
    /// Call positions (0-based) at which the caller's token gets cancelled.
    cancel_on: Arc<RwLock<HashSet<usize>>>,
    /// Simulated runner failure message.
    simulate_failure: Arc<RwLock<Option<String>>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mock response for the next run call.
    pub fn add_response(self, response: MockResponse) -> Self {
        self.responses.write().push(response);
        self
    }

    /// Set multiple responses.
    pub fn with_responses(self, responses: Vec<MockResponse>) -> Self {
        *self.responses.write() = responses;
        self
    }

    /// Simulate a user interrupt arriving while call `position` is running.
    pub fn cancel_during(self, position: usize) -> Self {
        self.cancel_on.write().insert(position);
        self
    }

    /// Make every call fail at the runner level.
    pub fn simulate_failure(self, message: impl Into<String>) -> Self {
        *self.simulate_failure.write() = Some(message.into());
        self
    }

    /// Get all captured calls.
    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.captured_calls.read().len()
    }

    /// Subcommands run so far, in order.
    pub fn subcommands(&self) -> Vec<String> {
        self.captured_calls
            .read()
            .iter()
            .filter_map(|c| c.argv.get(1).cloned())
            .collect()
    }

    fn next_response(&self) -> MockResponse {
        let responses = self.responses.read();
        if responses.is_empty() {
            return MockResponse::success("");
        }
        let index = self.response_index.fetch_add(1, Ordering::SeqCst);
        responses
            .get(index % responses.len())
            .cloned()
            .unwrap_or_else(|| MockResponse::success(""))
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(
        &self,
        argv: &[String],
        options: &RunOptions,
        cancel: &CancellationToken,
    ) -> RunnerResult<ExecutionResult> {
        if argv.is_empty() {
            return Err(RunnerError::EmptyCommand);
        }
        let position = self.captured_calls.read().len();
        self.captured_calls.write().push(CapturedCall {
            argv: argv.to_vec(),
            timeout: options.timeout,
            executable: options
                .executable
                .as_ref()
                .map(|p| p.to_string_lossy().to_string()),
        });

        if let Some(message) = self.simulate_failure.read().clone() {
            return Err(RunnerError::ExecutionFailed(message));
        }

        let started_at = Utc::now();
        let mut response = self.next_response();
        if self.cancel_on.read().contains(&position) {
            cancel.cancel();
            response = MockResponse {
                exit_code: None,
                condition: ExitCondition::Cancelled,
                ..response
            };
        }

        Ok(ExecutionResult {
            argv: argv.to_vec(),
            exit_code: response.exit_code,
            condition: response.condition,
            stdout: response.stdout,
            stderr: response.stderr,
            started_at,
            finished_at: started_at + chrono::Duration::milliseconds(response.duration_ms as i64),
            duration_ms: response.duration_ms,
        })
    }
}
