//! The execution engine: runs approved commands in order, one at a time.

use std::sync::Arc;

use fastpy_core::{BlockReason, ParsedCommand, ValidationVerdict};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::runner::{CommandRunner, ExecutionResult, ExitCondition, RunOptions};

/// What happened to one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommandStatus {
    /// Rejected by the safety validator; never run.
    Blocked { reason: BlockReason, detail: String },
    /// Dry run: would have been executed.
    WouldRun,
    Executed { result: ExecutionResult },
    /// Skipped because execution halted earlier.
    NotRun,
}

impl CommandStatus {
    pub fn result(&self) -> Option<&ExecutionResult> {
        match self {
            Self::Executed { result } => Some(result),
            _ => None,
        }
    }

    /// Executed and exited with code 0.
    pub fn succeeded(&self) -> bool {
        self.result().is_some_and(ExecutionResult::success)
    }

    pub fn label(&self) -> String {
        match self {
            Self::Blocked { reason, .. } => format!("blocked ({})", reason),
            Self::WouldRun => "would run".to_string(),
            Self::Executed { result } if result.success() => "succeeded".to_string(),
            Self::Executed { result } => format!("failed ({})", result.status_line()),
            Self::NotRun => "not run".to_string(),
        }
    }
}

/// Outcome for one command, in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub index: usize,
    pub command: String,
    pub status: CommandStatus,
}

/// Why execution stopped before the end of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum HaltReason {
    /// Command `index` failed with stop-on-failure set.
    StopOnFailure { index: usize },
    Cancelled,
}

/// Full result of one engine run. Blocked commands are always included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub outcomes: Vec<CommandOutcome>,
    pub halted: Option<HaltReason>,
}

impl ExecutionReport {
    pub fn outcome(&self, index: usize) -> Option<&CommandOutcome> {
        self.outcomes.iter().find(|o| o.index == index)
    }

    pub fn executed(&self) -> impl Iterator<Item = (&CommandOutcome, &ExecutionResult)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.status.result().map(|r| (o, r)))
    }

    pub fn failed_count(&self) -> usize {
        self.executed().filter(|(_, r)| !r.success()).count()
    }

    pub fn succeeded_count(&self) -> usize {
        self.executed().filter(|(_, r)| r.success()).count()
    }

    pub fn would_run_count(&self) -> usize {
        self.count(|s| matches!(s, CommandStatus::WouldRun))
    }

    pub fn blocked_count(&self) -> usize {
        self.count(|s| matches!(s, CommandStatus::Blocked { .. }))
    }

    pub fn not_run_count(&self) -> usize {
        self.count(|s| matches!(s, CommandStatus::NotRun))
    }

    pub fn was_cancelled(&self) -> bool {
        self.halted == Some(HaltReason::Cancelled)
    }

    fn count(&self, pred: impl Fn(&CommandStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

/// Engine options.
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Report what would run without spawning anything.
    pub dry_run: bool,
    /// Skip the rest of the queue after the first failure.
    pub stop_on_failure: bool,
    pub run: RunOptions,
}

impl EngineOptions {
    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn stop_on_failure(mut self, enabled: bool) -> Self {
        self.stop_on_failure = enabled;
        self
    }

    pub fn with_run_options(mut self, run: RunOptions) -> Self {
        self.run = run;
        self
    }
}

/// Runs allowed commands sequentially through a [`CommandRunner`].
#[derive(Clone)]
pub struct ExecutionEngine {
    runner: Arc<dyn CommandRunner>,
    options: EngineOptions,
}

impl ExecutionEngine {
    pub fn new(runner: Arc<dyn CommandRunner>, options: EngineOptions) -> Self {
        Self { runner, options }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// A copy of this engine with different options.
    pub fn with_options(&self, options: EngineOptions) -> Self {
        Self {
            runner: self.runner.clone(),
            options,
        }
    }

    /// Execute the queue in index order.
    ///
    /// Never runs two commands at once; a later command may depend on files
    /// or database state produced by an earlier one.
    pub async fn execute(
        &self,
        queue: &[(ParsedCommand, ValidationVerdict)],
        cancel: &CancellationToken,
    ) -> ExecutionReport {
        let mut ordered: Vec<&(ParsedCommand, ValidationVerdict)> = queue.iter().collect();
        ordered.sort_by_key(|(command, _)| command.index);

        let mut report = ExecutionReport::default();
        for (command, verdict) in ordered {
            let status = match verdict {
                ValidationVerdict::Blocked { reason, detail } => CommandStatus::Blocked {
                    reason: *reason,
                    detail: detail.clone(),
                },
                ValidationVerdict::Allowed if report.halted.is_some() => CommandStatus::NotRun,
                ValidationVerdict::Allowed if self.options.dry_run => {
                    info!("Dry run: would execute {}", command.display());
                    CommandStatus::WouldRun
                }
                ValidationVerdict::Allowed if cancel.is_cancelled() => {
                    report.halted = Some(HaltReason::Cancelled);
                    CommandStatus::NotRun
                }
                ValidationVerdict::Allowed => {
                    let result = self.run_one(command, cancel).await;
                    if result.condition == ExitCondition::Cancelled {
                        report.halted = Some(HaltReason::Cancelled);
                    } else if !result.success() && self.options.stop_on_failure {
                        warn!(
                            "Command {} failed ({}), skipping the rest",
                            command.index,
                            result.status_line()
                        );
                        report.halted = Some(HaltReason::StopOnFailure {
                            index: command.index,
                        });
                    }
                    CommandStatus::Executed { result }
                }
            };

            report.outcomes.push(CommandOutcome {
                index: command.index,
                command: command.display(),
                status,
            });
        }
        report
    }

    async fn run_one(&self, command: &ParsedCommand, cancel: &CancellationToken) -> ExecutionResult {
        match self.runner.run(&command.argv, &self.options.run, cancel).await {
            Ok(result) => {
                info!("Command {} {}", command.index, result.status_line());
                result
            }
            Err(e) => {
                warn!("Command {} could not be run: {}", command.index, e);
                ExecutionResult::spawn_failed(&command.argv, e.to_string())
            }
        }
    }
}
