//! The structural allowlist: which invocations of the tool are recognised.

use serde::{Deserialize, Serialize};

use crate::error::{PolicyError, PolicyResult};

/// Matches a subcommand by prefix or by exact name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "match", content = "value", rename_all = "snake_case")]
pub enum SubcommandRule {
    /// `make:` matches `make:resource`, `make:model`, ...
    Prefix(String),
    Exact(String),
}

impl SubcommandRule {
    pub fn matches(&self, subcommand: &str) -> bool {
        match self {
            Self::Exact(name) => subcommand == name,
            Self::Prefix(prefix) => subcommand
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| {
                    !rest.is_empty()
                        && rest
                            .chars()
                            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
                }),
        }
    }
}

/// The tool's own command surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSurface {
    pub tool_name: String,
    pub subcommands: Vec<SubcommandRule>,
}

impl CommandSurface {
    pub fn new(tool_name: impl Into<String>) -> PolicyResult<Self> {
        let tool_name = tool_name.into();
        if tool_name.trim().is_empty() {
            return Err(PolicyError::InvalidConfiguration(
                "tool name must not be empty".to_string(),
            ));
        }
        Ok(Self {
            tool_name,
            subcommands: Vec::new(),
        })
    }

    /// Recognised subcommands of `fastpy`.
    ///
    /// `ai` and `ai:*` are deliberately absent: a generated command may never
    /// start another generation run or touch backend configuration.
    pub fn standard() -> Self {
        let prefixes = [
            "make:", "db:", "route:", "setup:", "deploy:", "domain:", "env:", "service:",
        ];
        let exact = ["serve", "test", "list", "update", "setup"];

        Self {
            tool_name: fastpy_core::TOOL_NAME.to_string(),
            subcommands: prefixes
                .iter()
                .map(|p| SubcommandRule::Prefix(p.to_string()))
                .chain(exact.iter().map(|e| SubcommandRule::Exact(e.to_string())))
                .collect(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.subcommands.push(SubcommandRule::Prefix(prefix.into()));
        self
    }

    pub fn with_exact(mut self, name: impl Into<String>) -> Self {
        self.subcommands.push(SubcommandRule::Exact(name.into()));
        self
    }

    pub fn recognizes(&self, subcommand: &str) -> bool {
        self.subcommands.iter().any(|rule| rule.matches(subcommand))
    }

    /// Check that `argv` is a recognised invocation, returning the reason if not.
    pub fn check(&self, argv: &[String]) -> Result<(), String> {
        let program = match argv.first() {
            Some(program) => program,
            None => return Err("empty command".to_string()),
        };
        if *program != self.tool_name {
            return Err(format!("'{}' is not a {} command", program, self.tool_name));
        }

        let subcommand = match argv.get(1) {
            Some(subcommand) => subcommand,
            None => return Err("missing subcommand".to_string()),
        };
        if !self.recognizes(subcommand) {
            return Err(format!("unrecognized subcommand '{}'", subcommand));
        }
        Ok(())
    }
}
