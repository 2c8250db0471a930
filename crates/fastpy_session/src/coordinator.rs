//! The session coordinator: drives one prompt through generation, parsing,
//! validation, confirmation, execution and follow-up analysis.

use std::sync::Arc;

use fastpy_ai::{Backend, CallError, RetryOrchestrator};
use fastpy_core::{BackendProfile, ParsedCommand, Prompt, ResponseParser, ValidationVerdict};
use fastpy_policy::SafetyValidator;
use fastpy_runner::{CommandStatus, EngineOptions, ExecutionEngine, HaltReason};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::confirm::Confirmer;
use crate::error::SessionResult;
use crate::followup::{analyze, FollowUp};
use crate::session::{CommandRecord, ExecutionMode, GenerationSession, SessionErrorInfo};
use crate::state::{SessionFailure, SessionState};

/// Coordinator options.
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    pub mode: ExecutionMode,
    pub stop_on_failure: bool,
    /// Treat "every command blocked" as a failed session.
    pub fail_on_empty: bool,
    /// Offer follow-up suggestions after real execution.
    pub offer_follow_ups: bool,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Confirm,
            stop_on_failure: false,
            fail_on_empty: true,
            offer_follow_ups: true,
        }
    }
}

impl CoordinatorOptions {
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn stop_on_failure(mut self, enabled: bool) -> Self {
        self.stop_on_failure = enabled;
        self
    }

    pub fn fail_on_empty(mut self, enabled: bool) -> Self {
        self.fail_on_empty = enabled;
        self
    }

    pub fn offer_follow_ups(mut self, enabled: bool) -> Self {
        self.offer_follow_ups = enabled;
        self
    }
}

/// Owns one session at a time and moves it through its states.
pub struct Coordinator {
    backend: Arc<dyn Backend>,
    profile: BackendProfile,
    orchestrator: RetryOrchestrator,
    parser: ResponseParser,
    validator: SafetyValidator,
    engine: ExecutionEngine,
    confirmer: Arc<dyn Confirmer>,
    options: CoordinatorOptions,
}

/// Whether the pipeline continues after a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    /// The session already reached a terminal state.
    Finished,
}

type Stage = SessionResult<Flow>;

impl Coordinator {
    pub fn new(
        backend: Arc<dyn Backend>,
        profile: BackendProfile,
        validator: SafetyValidator,
        engine: ExecutionEngine,
        confirmer: Arc<dyn Confirmer>,
    ) -> Self {
        Self {
            backend,
            profile,
            orchestrator: RetryOrchestrator::new(),
            parser: ResponseParser::default(),
            validator,
            engine,
            confirmer,
            options: CoordinatorOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CoordinatorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_orchestrator(mut self, orchestrator: RetryOrchestrator) -> Self {
        self.orchestrator = orchestrator;
        self
    }

    pub fn with_parser(mut self, parser: ResponseParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn options(&self) -> &CoordinatorOptions {
        &self.options
    }

    /// Run the whole pipeline for one prompt.
    ///
    /// Never fails: every outcome is recorded on the returned session, which
    /// is always terminal.
    pub async fn run(&self, prompt: &Prompt, cancel: &CancellationToken) -> GenerationSession {
        let mut session = GenerationSession::new(prompt, self.options.mode);
        info!("Session {} started with {}", session.id, self.profile.name);

        if let Err(e) = self.drive(&mut session, prompt, cancel).await {
            error!("Session {} aborted: {}", session.id, e);
            session.fail(SessionFailure::Internal, e.to_string(), None);
        }
        if !session.is_terminal() {
            session.fail(SessionFailure::Internal, "pipeline stopped early", None);
        }
        info!("Session {} finished: {}", session.id, session.state);
        session
    }

    async fn drive(
        &self,
        session: &mut GenerationSession,
        prompt: &Prompt,
        cancel: &CancellationToken,
    ) -> SessionResult<()> {
        if self.generate(session, prompt, cancel).await? == Flow::Finished {
            return Ok(());
        }
        let raw = session.generation.raw_response.clone().unwrap_or_default();
        let commands = match self.parse(session, &raw)? {
            Some(commands) => commands,
            None => return Ok(()),
        };
        if self.validate(session, commands)? == Flow::Finished {
            return Ok(());
        }
        if self.confirm(session, cancel).await? == Flow::Finished {
            return Ok(());
        }
        if self.execute(session, cancel).await? == Flow::Finished {
            return Ok(());
        }
        self.follow_up(session, cancel).await
    }

    async fn generate(
        &self,
        session: &mut GenerationSession,
        prompt: &Prompt,
        cancel: &CancellationToken,
    ) -> Stage {
        session.transition(SessionState::Generating)?;
        session.generation.backend = self.profile.name.clone();
        session.generation.model = self.profile.model.clone();

        let outcome = self
            .orchestrator
            .call(self.backend.as_ref(), prompt, &self.profile.retry, cancel)
            .await;

        match outcome {
            Ok(response) => {
                info!(
                    "{} answered in {}ms (attempt {})",
                    response.backend, response.latency_ms, response.attempt
                );
                session.generation.backend = response.backend;
                session.generation.model = response.model;
                session.generation.attempts = response.attempt;
                session.generation.latency_ms = response.latency_ms;
                session.generation.raw_response = Some(response.text);
                Ok(Flow::Continue)
            }
            Err(CallError::Cancelled { attempts }) => {
                session.generation.attempts = attempts;
                cancelled(session)?;
                Ok(Flow::Finished)
            }
            Err(CallError::Fatal { failure, attempts }) => {
                session.generation.attempts = attempts;
                let guidance = failure.guidance(&self.profile);
                session.fail(
                    SessionFailure::Backend(failure.kind),
                    failure.to_string(),
                    Some(guidance),
                );
                Ok(Flow::Finished)
            }
        }
    }

    fn parse(
        &self,
        session: &mut GenerationSession,
        raw: &str,
    ) -> SessionResult<Option<Vec<ParsedCommand>>> {
        session.transition(SessionState::Parsing)?;
        match self.parser.parse(raw) {
            Ok(commands) => {
                info!("Parsed {} command(s)", commands.len());
                Ok(Some(commands))
            }
            Err(e) => {
                warn!("{}", e);
                session.fail(
                    SessionFailure::Parse,
                    e.to_string(),
                    Some("Review the raw response below and run the commands manually.".to_string()),
                );
                Ok(None)
            }
        }
    }

    fn validate(&self, session: &mut GenerationSession, commands: Vec<ParsedCommand>) -> Stage {
        session.transition(SessionState::Validating)?;
        let verdicts = self.validator.validate_all(&commands);
        session.records = commands
            .into_iter()
            .zip(verdicts)
            .map(|(command, verdict)| CommandRecord::new(command, verdict))
            .collect();
        self.confirmer.show_plan(session);

        if session.allowed_count() > 0 {
            return Ok(Flow::Continue);
        }

        mark_unexecuted(session);
        if self.options.fail_on_empty {
            warn!("All {} command(s) were blocked", session.records.len());
            session.fail(
                SessionFailure::NoAllowedCommands,
                "No commands passed the safety policy",
                None,
            );
        } else {
            session.transition(SessionState::Done)?;
        }
        Ok(Flow::Finished)
    }

    async fn confirm(&self, session: &mut GenerationSession, cancel: &CancellationToken) -> Stage {
        if session.mode != ExecutionMode::Confirm {
            return Ok(Flow::Continue);
        }
        session.transition(SessionState::AwaitingConfirmation)?;

        let approved = tokio::select! {
            _ = cancel.cancelled() => None,
            approved = self.confirmer.confirm_execution(session) => Some(approved),
        };
        match approved {
            None => {
                mark_unexecuted(session);
                cancelled(session)?;
                Ok(Flow::Finished)
            }
            Some(false) => {
                info!("Execution declined");
                session.declined = true;
                mark_unexecuted(session);
                session.transition(SessionState::Done)?;
                Ok(Flow::Finished)
            }
            Some(true) => Ok(Flow::Continue),
        }
    }

    async fn execute(&self, session: &mut GenerationSession, cancel: &CancellationToken) -> Stage {
        session.transition(SessionState::Executing)?;

        let dry_run = session.mode == ExecutionMode::DryRun;
        let engine = self.engine.with_options(EngineOptions {
            dry_run,
            stop_on_failure: self.options.stop_on_failure,
            run: self.engine.options().run.clone(),
        });

        let queue: Vec<(ParsedCommand, ValidationVerdict)> = session
            .records
            .iter()
            .map(|r| (r.command.clone(), r.verdict.clone()))
            .collect();
        let report = engine.execute(&queue, cancel).await;

        session.halted = report.halted;
        session.apply_statuses(report.outcomes.into_iter().map(|o| (o.index, o.status)));

        if session.halted == Some(HaltReason::Cancelled) {
            cancelled(session)?;
            return Ok(Flow::Finished);
        }
        if dry_run {
            session.transition(SessionState::Done)?;
            return Ok(Flow::Finished);
        }
        Ok(Flow::Continue)
    }

    async fn follow_up(&self, session: &mut GenerationSession, cancel: &CancellationToken) -> SessionResult<()> {
        session.transition(SessionState::AnalyzingFollowUp)?;
        if !self.options.offer_follow_ups {
            return session.transition(SessionState::Done);
        }
        if let Some(HaltReason::StopOnFailure { index }) = session.halted {
            debug!("Halted at command {}; no follow-ups offered", index + 1);
            return session.transition(SessionState::Done);
        }

        for suggestion in analyze(session) {
            session.follow_ups.push(suggestion.clone());

            let accepted = tokio::select! {
                _ = cancel.cancelled() => None,
                accepted = self.confirmer.confirm_follow_up(&suggestion) => Some(accepted),
            };
            let Some(accepted) = accepted else {
                return cancelled(session);
            };
            if !accepted {
                continue;
            }

            let nested = self.run_follow_up(session, &suggestion, cancel).await;
            let nested_cancelled = nested.was_cancelled();
            session.follow_up_sessions.push(nested);
            if nested_cancelled {
                return cancelled(session);
            }
        }
        session.transition(SessionState::Done)
    }

    /// Run one accepted follow-up as a nested session scoped to its command.
    ///
    /// The nested run skips generation and confirmation and never offers
    /// further follow-ups.
    pub async fn run_follow_up(
        &self,
        parent: &GenerationSession,
        follow_up: &FollowUp,
        cancel: &CancellationToken,
    ) -> GenerationSession {
        let mut nested = GenerationSession::with_text(
            follow_up.command.clone(),
            parent.context.clone(),
            ExecutionMode::AutoExecute,
        );
        info!("Running follow-up: {}", follow_up.command);
        if let Err(e) = self.drive_follow_up(&mut nested, cancel).await {
            error!("Follow-up session {} aborted: {}", nested.id, e);
            nested.fail(SessionFailure::Internal, e.to_string(), None);
        }
        nested
    }

    async fn drive_follow_up(
        &self,
        session: &mut GenerationSession,
        cancel: &CancellationToken,
    ) -> SessionResult<()> {
        let text = session.prompt.clone();
        let commands = match self.parse(session, &text)? {
            Some(commands) => commands,
            None => return Ok(()),
        };
        if self.validate(session, commands)? == Flow::Finished {
            return Ok(());
        }
        if self.execute(session, cancel).await? == Flow::Finished {
            return Ok(());
        }
        session.transition(SessionState::AnalyzingFollowUp)?;
        session.transition(SessionState::Done)
    }
}

/// Mark every record without an outcome as blocked or not run.
fn mark_unexecuted(session: &mut GenerationSession) {
    for record in session.records.iter_mut().filter(|r| r.status.is_none()) {
        record.status = Some(match &record.verdict {
            ValidationVerdict::Blocked { reason, detail } => CommandStatus::Blocked {
                reason: *reason,
                detail: detail.clone(),
            },
            ValidationVerdict::Allowed => CommandStatus::NotRun,
        });
    }
}

fn cancelled(session: &mut GenerationSession) -> SessionResult<()> {
    warn!("Session {} cancelled in state {}", session.id, session.state);
    session.transition(SessionState::Failed(SessionFailure::Cancelled))?;
    session.error = Some(SessionErrorInfo {
        message: "Cancelled by user".to_string(),
        guidance: None,
    });
    Ok(())
}
