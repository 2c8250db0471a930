//! Terminal confirmation prompts.

use std::io::{BufRead, IsTerminal, Write};

use async_trait::async_trait;
use fastpy_core::ValidationVerdict;
use fastpy_session::{CommandRecord, Confirmer, FollowUp, GenerationSession};
use tracing::warn;

/// Asks on stderr and reads answers from stdin.
///
/// When stdin is not a terminal nothing is approved.
pub struct TerminalConfirmer {
    /// Print the plan before confirmation.
    show_plan: bool,
}

impl TerminalConfirmer {
    pub fn new(show_plan: bool) -> Self {
        Self { show_plan }
    }

    async fn ask(question: String, default_yes: bool) -> bool {
        if !std::io::stdin().is_terminal() {
            warn!("stdin is not a terminal, not asking: {}", question);
            eprintln!("⚠️  {} (no terminal, answering no; use --execute to skip confirmation)", question);
            return false;
        }
        let hint = if default_yes { "[Y/n]" } else { "[y/N]" };
        let answer = tokio::task::spawn_blocking(move || {
            eprint!("❓ {} {} ", question, hint);
            let _ = std::io::stderr().flush();
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line).map(|_| line)
        })
        .await;

        match answer {
            Ok(Ok(line)) => parse_answer(&line, default_yes),
            _ => false,
        }
    }
}

/// Interpret a typed answer; an empty line takes the default.
pub fn parse_answer(line: &str, default_yes: bool) -> bool {
    match line.trim().to_lowercase().as_str() {
        "" => default_yes,
        "y" | "yes" => true,
        _ => false,
    }
}

/// One plan line per record.
pub fn plan_lines(session: &GenerationSession) -> Vec<String> {
    let mut lines = vec![format!("📋 Generated commands ({}):", session.records.len())];
    for (position, record) in session.records.iter().enumerate() {
        lines.push(plan_line(position + 1, record));
        if let Some(description) = &record.command.description {
            lines.push(format!("      {}", description));
        }
        if let ValidationVerdict::Blocked { reason, detail } = &record.verdict {
            lines.push(format!("      blocked ({}): {}", reason, detail));
        }
    }
    lines
}

fn plan_line(position: usize, record: &CommandRecord) -> String {
    let marker = if record.is_allowed() { "✅" } else { "🚫" };
    format!("   {} {}. {}", marker, position, record.command.display())
}

#[async_trait]
impl Confirmer for TerminalConfirmer {
    fn show_plan(&self, session: &GenerationSession) {
        if !self.show_plan {
            return;
        }
        println!();
        for line in plan_lines(session) {
            println!("{}", line);
        }
        println!();
    }

    async fn confirm_execution(&self, session: &GenerationSession) -> bool {
        let question = format!("Execute {} command(s)?", session.allowed_count());
        Self::ask(question, false).await
    }

    async fn confirm_follow_up(&self, follow_up: &FollowUp) -> bool {
        Self::ask(format!("💡 {}", follow_up.question), true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fastpy_core::{parse, BlockReason, Prompt, PromptContext};
    use fastpy_session::ExecutionMode;

    #[test]
    fn test_parse_answer() {
        assert!(parse_answer("y\n", false));
        assert!(parse_answer("YES", false));
        assert!(parse_answer("\n", true));
        assert!(!parse_answer("\n", false));
        assert!(!parse_answer("nope", true));
    }

    #[test]
    fn test_plan_lines_mark_blocked_commands() {
        let prompt = Prompt::new("Create posts", PromptContext::new()).unwrap();
        let mut session = GenerationSession::new(&prompt, ExecutionMode::DryRun);
        let commands = parse("fastpy make:resource Post -m\nfastpy ai:config").unwrap();
        session.records = vec![
            CommandRecord::new(commands[0].clone(), ValidationVerdict::Allowed),
            CommandRecord::new(
                commands[1].clone(),
                ValidationVerdict::blocked(
                    BlockReason::UnrecognizedCommand,
                    "unrecognized subcommand 'ai:config'",
                ),
            ),
        ];

        let lines = plan_lines(&session);

        assert_eq!(lines[0], "📋 Generated commands (2):");
        assert!(lines[1].contains("✅ 1. fastpy make:resource Post -m"));
        assert!(lines[2].contains("🚫 2. fastpy ai:config"));
        assert!(lines[3].contains("blocked (unrecognized command)"));
    }
}
