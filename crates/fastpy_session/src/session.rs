//! The generation session: everything one run of the pipeline produced.

use chrono::{DateTime, Utc};
use fastpy_core::{ParsedCommand, Prompt, PromptContext, ValidationVerdict};
use fastpy_runner::{CommandStatus, ExecutionResult, HaltReason};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::{SessionError, SessionResult};
use crate::followup::FollowUp;
use crate::state::{SessionFailure, SessionState};

/// Process exit codes.
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const FATAL_ERROR: u8 = 1;
    pub const NO_ALLOWED_COMMANDS: u8 = 2;
    pub const EXECUTION_HALTED: u8 = 3;
    pub const CANCELLED: u8 = 130;
}

/// How approved commands are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Ask before executing.
    #[default]
    Confirm,
    AutoExecute,
    DryRun,
}

/// One parsed command with its verdict and, once known, its outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub command: ParsedCommand,
    pub verdict: ValidationVerdict,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<CommandStatus>,
}

impl CommandRecord {
    pub fn new(command: ParsedCommand, verdict: ValidationVerdict) -> Self {
        Self {
            command,
            verdict,
            status: None,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.verdict.is_allowed()
    }

    pub fn succeeded(&self) -> bool {
        self.status.as_ref().is_some_and(CommandStatus::succeeded)
    }

    pub fn result(&self) -> Option<&ExecutionResult> {
        self.status.as_ref().and_then(CommandStatus::result)
    }
}

/// Backend metadata for the response that produced the commands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationInfo {
    pub backend: String,
    pub model: String,
    pub attempts: u32,
    pub latency_ms: u64,
    /// Raw completion text, kept for manual inspection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

/// A failure recorded on the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionErrorInfo {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidance: Option<String>,
}

/// One end-to-end run of the pipeline for a single prompt.
///
/// Owned by the coordinator while it runs; frozen once terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSession {
    pub id: Uuid,
    pub prompt: String,
    pub context: PromptContext,
    pub mode: ExecutionMode,
    pub state: SessionState,
    /// Every state the session passed through, in order.
    pub history: Vec<SessionState>,
    pub generation: GenerationInfo,
    pub records: Vec<CommandRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halted: Option<HaltReason>,
    /// The user declined execution at the confirmation step.
    #[serde(default)]
    pub declined: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SessionErrorInfo>,
    pub follow_ups: Vec<FollowUp>,
    /// Nested runs started by accepting a follow-up.
    pub follow_up_sessions: Vec<GenerationSession>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl GenerationSession {
    pub fn new(prompt: &Prompt, mode: ExecutionMode) -> Self {
        Self::with_text(prompt.text(), prompt.context().clone(), mode)
    }

    /// A session for text that is not a model prompt, such as a follow-up command.
    pub fn with_text(text: impl Into<String>, context: PromptContext, mode: ExecutionMode) -> Self {
        Self {
            id: Uuid::new_v4(),
            prompt: text.into(),
            context,
            mode,
            state: SessionState::Created,
            history: vec![SessionState::Created],
            generation: GenerationInfo::default(),
            records: Vec::new(),
            halted: None,
            declined: false,
            error: None,
            follow_ups: Vec::new(),
            follow_up_sessions: Vec::new(),
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow.
    pub fn transition(&mut self, next: SessionState) -> SessionResult<()> {
        if !self.state.can_transition_to(&next) {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        debug!("Session {}: {} -> {}", self.id, self.state, next);
        self.state = next;
        self.history.push(next);
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// End the session as failed, recording why.
    pub fn fail(
        &mut self,
        failure: SessionFailure,
        message: impl Into<String>,
        guidance: Option<String>,
    ) {
        let message = message.into();
        if let Err(e) = self.transition(SessionState::Failed(failure)) {
            error!("{}", e);
            self.force_internal_failure();
        }
        self.error = Some(SessionErrorInfo { message, guidance });
    }

    /// Record an internal error (an invalid transition) and stop.
    pub(crate) fn force_internal_failure(&mut self) {
        let failed = SessionState::Failed(SessionFailure::Internal);
        if !self.state.is_terminal() {
            self.state = failed;
            self.history.push(failed);
            self.finished_at = Some(Utc::now());
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn failure(&self) -> Option<SessionFailure> {
        match self.state {
            SessionState::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn was_cancelled(&self) -> bool {
        self.failure() == Some(SessionFailure::Cancelled)
    }

    pub fn allowed_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_allowed()).count()
    }

    pub fn blocked_count(&self) -> usize {
        self.records.len() - self.allowed_count()
    }

    /// Records that ran and exited with code 0.
    pub fn succeeded(&self) -> impl Iterator<Item = &CommandRecord> {
        self.records.iter().filter(|r| r.succeeded())
    }

    pub fn failed_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.result().is_some_and(|result| !result.success()))
            .count()
    }

    /// Apply execution outcomes to the matching records.
    pub fn apply_statuses(&mut self, outcomes: impl IntoIterator<Item = (usize, CommandStatus)>) {
        for (index, status) in outcomes {
            if let Some(record) = self.records.iter_mut().find(|r| r.command.index == index) {
                record.status = Some(status);
            }
        }
    }

    /// Exit code for this session.
    pub fn exit_code(&self) -> u8 {
        match self.state {
            SessionState::Done if matches!(self.halted, Some(HaltReason::StopOnFailure { .. })) => {
                ExitCodes::EXECUTION_HALTED
            }
            SessionState::Done => ExitCodes::SUCCESS,
            SessionState::Failed(SessionFailure::Cancelled) => ExitCodes::CANCELLED,
            SessionState::Failed(SessionFailure::NoAllowedCommands) => {
                ExitCodes::NO_ALLOWED_COMMANDS
            }
            _ => ExitCodes::FATAL_ERROR,
        }
    }

    pub fn to_json(&self) -> SessionResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fastpy_core::BlockReason;

    fn session() -> GenerationSession {
        let prompt = Prompt::new("Create a blog", PromptContext::new()).unwrap();
        GenerationSession::new(&prompt, ExecutionMode::AutoExecute)
    }

    fn walk(session: &mut GenerationSession, states: &[SessionState]) {
        for state in states {
            session.transition(*state).unwrap();
        }
    }

    #[test]
    fn test_new_session() {
        let session = session();
        assert_eq!(session.state, SessionState::Created);
        assert_eq!(session.history, vec![SessionState::Created]);
        assert!(!session.is_terminal());
        assert!(session.finished_at.is_none());
    }

    #[test]
    fn test_invalid_transition_is_rejected() {
        let mut session = session();
        let err = session.transition(SessionState::Executing).unwrap_err();
        assert!(err.to_string().contains("created -> executing"));
        assert_eq!(session.state, SessionState::Created);
    }

    #[test]
    fn test_exit_codes() {
        let mut done = session();
        walk(
            &mut done,
            &[
                SessionState::Generating,
                SessionState::Parsing,
                SessionState::Validating,
                SessionState::Executing,
                SessionState::Done,
            ],
        );
        assert_eq!(done.exit_code(), ExitCodes::SUCCESS);
        assert!(done.finished_at.is_some());

        done.halted = Some(HaltReason::StopOnFailure { index: 0 });
        assert_eq!(done.exit_code(), ExitCodes::EXECUTION_HALTED);

        let mut cancelled = session();
        cancelled.fail(SessionFailure::Cancelled, "interrupted", None);
        assert_eq!(cancelled.exit_code(), 130);

        let mut empty = session();
        walk(
            &mut empty,
            &[SessionState::Generating, SessionState::Parsing, SessionState::Validating],
        );
        empty.fail(SessionFailure::NoAllowedCommands, "all blocked", None);
        assert_eq!(empty.exit_code(), 2);

        let mut auth = session();
        auth.transition(SessionState::Generating).unwrap();
        auth.fail(
            SessionFailure::Backend(fastpy_ai::FailureKind::AuthInvalid),
            "Invalid API key",
            Some("export ANTHROPIC_API_KEY=your-key".to_string()),
        );
        assert_eq!(auth.exit_code(), 1);
        assert_eq!(
            auth.error.as_ref().and_then(|e| e.guidance.as_deref()),
            Some("export ANTHROPIC_API_KEY=your-key")
        );
    }

    #[test]
    fn test_invalid_failure_becomes_internal() {
        let mut session = session();
        session.fail(SessionFailure::Parse, "no commands", None);
        assert_eq!(session.failure(), Some(SessionFailure::Internal));
        assert_eq!(session.exit_code(), 1);
    }

    #[test]
    fn test_counts_and_statuses() {
        let mut session = session();
        let command = |i: usize, sub: &str| {
            ParsedCommand::new(i, vec!["fastpy".into(), sub.into()], format!("fastpy {}", sub))
        };
        session.records = vec![
            CommandRecord::new(command(0, "make:model"), ValidationVerdict::Allowed),
            CommandRecord::new(
                command(1, "ai"),
                ValidationVerdict::blocked(BlockReason::UnrecognizedCommand, "ai"),
            ),
        ];
        session.apply_statuses(vec![(0, CommandStatus::WouldRun)]);

        assert_eq!(session.allowed_count(), 1);
        assert_eq!(session.blocked_count(), 1);
        assert_eq!(session.records[0].status, Some(CommandStatus::WouldRun));
        assert!(session.records[1].status.is_none());
        assert_eq!(session.succeeded().count(), 0);
    }

    #[test]
    fn test_json_report() {
        let session = session();
        let json: serde_json::Value = serde_json::from_str(&session.to_json().unwrap()).unwrap();
        assert_eq!(json["prompt"], "Create a blog");
        assert_eq!(json["mode"], "auto_execute");
        assert_eq!(json["state"]["state"], "created");
    }
}
