//! Ai command - Generate fastpy commands from a prompt and run them safely.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use fastpy_ai::BackendRegistry;
use fastpy_core::{FastpyConfig, Prompt, PromptContext};
use fastpy_policy::SafetyValidator;
use fastpy_runner::{CommandStatus, EngineOptions, ExecutionEngine, HaltReason, ProcessRunner, RunOptions};
use fastpy_session::{
    Coordinator, CoordinatorOptions, ExecutionMode, ExitCodes, GenerationSession, SessionFailure,
    SessionState,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::confirm::TerminalConfirmer;

#[derive(Args, Debug)]
pub struct AiArgs {
    /// What to build, in plain language
    #[arg(required = true, num_args = 1.., value_name = "PROMPT")]
    prompt: Vec<String>,

    /// AI backend to use (anthropic, openai, google, groq, ollama)
    #[arg(short, long)]
    provider: Option<String>,

    /// Run allowed commands without asking
    #[arg(short, long, conflicts_with = "dry_run")]
    execute: bool,

    /// Show what would run without running anything
    #[arg(short, long)]
    dry_run: bool,

    /// Stop at the first failing command
    #[arg(long)]
    stop_on_failure: bool,

    /// Resource that already exists in the project (repeatable)
    #[arg(long = "existing", value_name = "NAME")]
    existing: Vec<String>,

    /// Do not offer follow-up commands
    #[arg(long)]
    no_follow_ups: bool,

    /// Print the session as JSON instead of a summary
    #[arg(long)]
    json: bool,
}

impl AiArgs {
    pub fn prompt_text(&self) -> String {
        self.prompt.join(" ")
    }

    pub fn mode(&self) -> ExecutionMode {
        if self.execute {
            ExecutionMode::AutoExecute
        } else if self.dry_run {
            ExecutionMode::DryRun
        } else {
            ExecutionMode::Confirm
        }
    }

    pub fn context(&self) -> PromptContext {
        self.existing
            .iter()
            .fold(PromptContext::new(), |context, name| context.with_resource(name.clone()))
    }
}

pub async fn execute(args: AiArgs, config: &FastpyConfig) -> Result<u8> {
    let profile = config.profile(args.provider.as_deref())?;
    let prompt = Prompt::new(args.prompt_text(), args.context())?;

    let backend = match BackendRegistry::standard().build(&profile) {
        Ok(backend) => backend,
        Err(e) => {
            eprintln!("❌ {}", e);
            if let Some(hint) = e.guidance() {
                eprintln!("💡 {}", hint);
            }
            return Ok(ExitCodes::FATAL_ERROR);
        }
    };

    let mut run = RunOptions::new().with_timeout(config.command_timeout());
    if let Some(executable) = &config.ai.executable {
        run = run.with_executable(executable);
    }
    if args.json {
        run = run.quiet();
    }
    let engine = ExecutionEngine::new(
        Arc::new(ProcessRunner::new()),
        EngineOptions::default().with_run_options(run),
    );

    let options = CoordinatorOptions::default()
        .with_mode(args.mode())
        .stop_on_failure(args.stop_on_failure || config.ai.stop_on_failure)
        .offer_follow_ups(!args.no_follow_ups);

    let coordinator = Coordinator::new(
        backend,
        profile.clone(),
        SafetyValidator::standard()?,
        engine,
        Arc::new(TerminalConfirmer::new(!args.json)),
    )
    .with_options(options);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted");
            interrupt.cancel();
        }
    });

    if !args.json {
        println!(
            "🤖 Generating commands with {} ({})...",
            profile.display_name, profile.model
        );
    }
    info!("Prompt: {}", prompt.text());

    let session = coordinator.run(&prompt, &cancel).await;

    if args.json {
        println!("{}", session.to_json()?);
    } else {
        for line in summary_lines(&session) {
            println!("{}", line);
        }
    }
    Ok(session.exit_code())
}

/// Human-readable outcome of a finished session.
pub fn summary_lines(session: &GenerationSession) -> Vec<String> {
    let mut lines = Vec::new();

    match session.state {
        SessionState::Failed(failure) => failure_lines(session, failure, &mut lines),
        _ if session.declined => lines.push("⏭️  Execution skipped".to_string()),
        _ if session.mode == ExecutionMode::DryRun => lines.push(format!(
            "🔍 Dry run: {} command(s) would run",
            session.allowed_count()
        )),
        _ => execution_lines(session, &mut lines),
    }

    for nested in &session.follow_up_sessions {
        let outcome = if nested.state == SessionState::Done && nested.failed_count() == 0 {
            "✅"
        } else {
            "❌"
        };
        lines.push(format!("{} Follow-up: {}", outcome, nested.prompt));
    }
    lines
}

fn failure_lines(session: &GenerationSession, failure: SessionFailure, lines: &mut Vec<String>) {
    let message = session
        .error
        .as_ref()
        .map(|e| e.message.clone())
        .unwrap_or_else(|| failure.to_string());

    match failure {
        SessionFailure::Cancelled => lines.push("⚠️  Cancelled".to_string()),
        SessionFailure::Parse => {
            lines.push("❌ No fastpy commands found in the response".to_string());
            if let Some(raw) = &session.generation.raw_response {
                lines.push("   Raw response:".to_string());
                lines.extend(raw.lines().map(|line| format!("   | {}", line)));
            }
        }
        SessionFailure::NoAllowedCommands => {
            lines.push(format!(
                "❌ All {} generated command(s) were blocked by the safety policy",
                session.records.len()
            ));
        }
        _ => lines.push(format!("❌ {}", message)),
    }

    if let Some(guidance) = session.error.as_ref().and_then(|e| e.guidance.as_ref()) {
        lines.extend(guidance.lines().map(|line| format!("💡 {}", line)));
    }
    if failure == SessionFailure::Cancelled {
        let executed = session.records.iter().filter(|r| r.result().is_some()).count();
        if executed > 0 {
            lines.push(format!("   {} command(s) ran before cancellation", executed));
        }
    }
}

fn execution_lines(session: &GenerationSession, lines: &mut Vec<String>) {
    lines.push(String::new());
    for record in &session.records {
        let line = match &record.status {
            Some(CommandStatus::Executed { result }) if result.success() => {
                format!("   ✅ {} ({}ms)", record.command.display(), result.duration_ms)
            }
            Some(CommandStatus::Executed { result }) => {
                format!("   ❌ {} ({})", record.command.display(), result.status_line())
            }
            Some(CommandStatus::Blocked { .. }) => {
                format!("   🚫 {} (blocked)", record.command.display())
            }
            Some(CommandStatus::NotRun) => format!("   ⏭️  {} (not run)", record.command.display()),
            Some(CommandStatus::WouldRun) | None => continue,
        };
        lines.push(line);
    }

    let executed = session.records.iter().filter(|r| r.result().is_some()).count();
    let failed = session.failed_count();
    if let Some(HaltReason::StopOnFailure { index }) = session.halted {
        lines.push(format!("🛑 Stopped after command #{} failed", index + 1));
    } else if failed == 0 {
        lines.push(format!("✅ All {} command(s) succeeded", executed));
    } else {
        lines.push(format!("⚠️  {} of {} command(s) failed", failed, executed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{Cli, Commands};
    use clap::Parser;
    use fastpy_core::{parse, ValidationVerdict};
    use fastpy_runner::ExecutionResult;
    use fastpy_session::CommandRecord;

    fn ai_args(argv: &[&str]) -> AiArgs {
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Commands::Ai(args) => args,
            other => panic!("unexpected command: {:?}", other),
        }
    }

    fn session(reply: &str, mode: ExecutionMode) -> GenerationSession {
        let prompt = Prompt::new("Create a blog", PromptContext::new()).unwrap();
        let mut session = GenerationSession::new(&prompt, mode);
        session.records = parse(reply)
            .unwrap()
            .into_iter()
            .map(|c| CommandRecord::new(c, ValidationVerdict::Allowed))
            .collect();
        session
    }

    #[test]
    fn test_prompt_words_are_joined() {
        let args = ai_args(&["fastpy", "ai", "Create", "a", "blog", "with", "posts"]);
        assert_eq!(args.prompt_text(), "Create a blog with posts");
        assert_eq!(args.mode(), ExecutionMode::Confirm);
    }

    #[test]
    fn test_mode_flags() {
        assert_eq!(
            ai_args(&["fastpy", "ai", "-e", "blog"]).mode(),
            ExecutionMode::AutoExecute
        );
        assert_eq!(
            ai_args(&["fastpy", "ai", "--dry-run", "blog"]).mode(),
            ExecutionMode::DryRun
        );
    }

    #[test]
    fn test_execute_conflicts_with_dry_run() {
        let result = Cli::try_parse_from(["fastpy", "ai", "-e", "-d", "blog"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_prompt_is_required() {
        assert!(Cli::try_parse_from(["fastpy", "ai"]).is_err());
    }

    #[test]
    fn test_existing_resources_build_context() {
        let args = ai_args(&[
            "fastpy", "ai", "--existing", "Post", "--existing", "User", "-p", "groq", "add", "comments",
        ]);
        let context = args.context();
        assert!(context.has_resource("post"));
        assert!(context.has_resource("User"));
        assert_eq!(args.provider.as_deref(), Some("groq"));
    }

    #[test]
    fn test_dry_run_summary() {
        let mut session = session("fastpy make:resource Post -m\nfastpy db:migrate", ExecutionMode::DryRun);
        session.state = SessionState::Done;

        let lines = summary_lines(&session);
        assert_eq!(lines, vec!["🔍 Dry run: 2 command(s) would run"]);
    }

    #[test]
    fn test_halted_summary() {
        let mut session = session("fastpy make:resource Post -m\nfastpy db:migrate", ExecutionMode::AutoExecute);
        let argv = session.records[0].command.argv.clone();
        let mut failed = ExecutionResult::spawn_failed(&argv, "boom");
        failed.exit_code = Some(1);
        failed.condition = fastpy_runner::ExitCondition::Exited;
        session.records[0].status = Some(CommandStatus::Executed { result: failed });
        session.records[1].status = Some(CommandStatus::NotRun);
        session.halted = Some(HaltReason::StopOnFailure { index: 0 });
        session.state = SessionState::Done;

        let lines = summary_lines(&session);
        assert!(lines.iter().any(|l| l.contains("❌ fastpy make:resource Post -m (exit code 1)")));
        assert!(lines.iter().any(|l| l.contains("(not run)")));
        assert_eq!(lines.last().unwrap(), "🛑 Stopped after command #1 failed");
    }

    #[test]
    fn test_backend_failure_summary_shows_guidance() {
        let mut session = session("fastpy db:migrate", ExecutionMode::Confirm);
        session.records.clear();
        session.transition(SessionState::Generating).unwrap();
        session.fail(
            SessionFailure::Backend(fastpy_ai::FailureKind::AuthInvalid),
            "authentication failed",
            Some("Set it with: export ANTHROPIC_API_KEY=your-key".to_string()),
        );

        let lines = summary_lines(&session);
        assert_eq!(lines[0], "❌ authentication failed");
        assert_eq!(lines[1], "💡 Set it with: export ANTHROPIC_API_KEY=your-key");
    }
}
