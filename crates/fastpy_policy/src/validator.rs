//! Two-stage safety validation of parsed commands.

use fastpy_core::{BlockReason, ParsedCommand, ValidationVerdict};
use tracing::{debug, warn};

use crate::error::PolicyResult;
use crate::rules::{CompiledDenyList, DenyList};
use crate::surface::CommandSurface;

/// Judges each parsed command against the structural allowlist, then the
/// denylist. Both must pass for [`ValidationVerdict::Allowed`].
///
/// Verdicts are independent per command.
#[derive(Debug, Clone)]
pub struct SafetyValidator {
    surface: CommandSurface,
    denylist: CompiledDenyList,
}

impl SafetyValidator {
    pub fn new(surface: CommandSurface, denylist: &DenyList) -> PolicyResult<Self> {
        Ok(Self {
            surface,
            denylist: denylist.compile()?,
        })
    }

    /// The standard `fastpy` surface and denylist.
    pub fn standard() -> PolicyResult<Self> {
        Self::new(CommandSurface::standard(), &DenyList::standard())
    }

    pub fn surface(&self) -> &CommandSurface {
        &self.surface
    }

    pub fn validate(&self, command: &ParsedCommand) -> ValidationVerdict {
        if let Err(detail) = self.surface.check(&command.argv) {
            warn!("Blocked command {} ({}): {}", command.index, BlockReason::UnrecognizedCommand, detail);
            return ValidationVerdict::blocked(BlockReason::UnrecognizedCommand, detail);
        }

        if let Some(violation) = self.denylist.scan(&command.argv) {
            warn!(
                "Blocked command {} ({}): {} [{}]",
                command.index,
                BlockReason::DangerousPattern,
                violation.message,
                violation.rule_id
            );
            return ValidationVerdict::blocked(BlockReason::DangerousPattern, violation.message);
        }

        debug!("Allowed command {}: {}", command.index, command.display());
        ValidationVerdict::Allowed
    }

    /// Validate every command, keeping input order.
    pub fn validate_all(&self, commands: &[ParsedCommand]) -> Vec<ValidationVerdict> {
        commands.iter().map(|command| self.validate(command)).collect()
    }
}
