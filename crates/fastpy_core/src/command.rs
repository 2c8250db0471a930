//! Parsed command invocations and validation verdicts.

use serde::{Deserialize, Serialize};

/// The tool's own invocation name. Every command the pipeline runs must
/// start with it.
pub const TOOL_NAME: &str = "fastpy";

/// Where in the backend response a command was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandSource {
    /// An entry of a structured JSON command array.
    Json,
    /// A line inside a fenced code block.
    Fenced,
    /// An inline backtick span.
    Inline,
    /// A bare line of prose text.
    Bare,
}

/// A single command invocation extracted from a backend response.
///
/// Never mutated after parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedCommand {
    /// Position in execution order (0-based).
    pub index: usize,
    /// Program name followed by its arguments, exactly as tokenized.
    pub argv: Vec<String>,
    /// The raw text the command was extracted from.
    pub source_text: String,
    /// 1-based line number of the source text in the response.
    pub line: usize,
    /// How the command was found.
    pub origin: CommandSource,
    /// Optional human-readable description supplied by the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParsedCommand {
    pub fn new(index: usize, argv: Vec<String>, source_text: impl Into<String>) -> Self {
        Self {
            index,
            argv,
            source_text: source_text.into(),
            line: 0,
            origin: CommandSource::Bare,
            description: None,
        }
    }

    pub fn with_origin(mut self, origin: CommandSource, line: usize) -> Self {
        self.origin = origin;
        self.line = line;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Program name (first token).
    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }

    /// Subcommand (first positional argument after the program).
    pub fn subcommand(&self) -> Option<&str> {
        self.argv.get(1).map(String::as_str)
    }

    /// Arguments after the subcommand.
    pub fn args(&self) -> &[String] {
        self.argv.get(2..).unwrap_or(&[])
    }

    /// First non-flag argument after the subcommand, typically a resource name.
    pub fn target(&self) -> Option<&str> {
        self.args()
            .iter()
            .map(String::as_str)
            .find(|arg| !arg.starts_with('-'))
    }

    /// Render the argv back into a single display line.
    pub fn display(&self) -> String {
        shlex::try_join(self.argv.iter().map(String::as_str))
            .unwrap_or_else(|_| self.argv.join(" "))
    }
}

/// Reason a command was blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    /// Not a well-formed invocation of this tool's command surface.
    UnrecognizedCommand,
    /// Structurally valid, but carries a dangerous argument pattern.
    DangerousPattern,
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnrecognizedCommand => write!(f, "unrecognized command"),
            Self::DangerousPattern => write!(f, "dangerous pattern"),
        }
    }
}

/// Safety verdict for one parsed command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ValidationVerdict {
    Allowed,
    Blocked { reason: BlockReason, detail: String },
}

impl ValidationVerdict {
    pub fn blocked(reason: BlockReason, detail: impl Into<String>) -> Self {
        Self::Blocked {
            reason,
            detail: detail.into(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    pub fn block_reason(&self) -> Option<BlockReason> {
        match self {
            Self::Allowed => None,
            Self::Blocked { reason, .. } => Some(*reason),
        }
    }
}
