//! Session states and the transitions between them.

use fastpy_ai::FailureKind;
use serde::{Deserialize, Serialize};

/// Why a session ended in [`SessionState::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SessionFailure {
    /// Fatal backend failure after retries.
    Backend(FailureKind),
    /// The backend response held no recognisable command.
    Parse,
    /// Backend selection, credentials or configuration.
    Configuration,
    /// Every parsed command was blocked.
    NoAllowedCommands,
    /// User interrupt.
    Cancelled,
    /// Invalid state transition; indicates a bug.
    Internal,
}

impl std::fmt::Display for SessionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Backend(kind) => write!(f, "backend failure ({})", kind),
            Self::Parse => write!(f, "no commands in response"),
            Self::Configuration => write!(f, "configuration error"),
            Self::NoAllowedCommands => write!(f, "no allowed commands"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Internal => write!(f, "internal error"),
        }
    }
}

/// Session lifecycle.
///
/// ```text
/// Created → Generating → Parsing → Validating → [AwaitingConfirmation]
///         → Executing → AnalyzingFollowUp → Done
/// ```
///
/// Any non-terminal state may move to `Failed(Cancelled)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "failure", rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Created,
    Generating,
    Parsing,
    Validating,
    AwaitingConfirmation,
    Executing,
    AnalyzingFollowUp,
    Done,
    Failed(SessionFailure),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }

    /// Check if transition to the given state is valid.
    pub fn can_transition_to(&self, next: &SessionState) -> bool {
        use SessionFailure as F;
        use SessionState::*;

        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (Created, Generating)
                // follow-up runs start from known command text
                | (Created, Parsing)
                | (Created, Failed(F::Configuration))
                | (Generating, Parsing)
                | (Generating, Failed(F::Backend(_)))
                | (Generating, Failed(F::Configuration))
                | (Parsing, Validating)
                | (Parsing, Failed(F::Parse))
                | (Validating, AwaitingConfirmation)
                | (Validating, Executing)
                | (Validating, Done)
                | (Validating, Failed(F::NoAllowedCommands))
                | (AwaitingConfirmation, Executing)
                | (AwaitingConfirmation, Done)
                | (Executing, AnalyzingFollowUp)
                | (Executing, Done)
                | (AnalyzingFollowUp, Done)
                | (_, Failed(F::Cancelled))
                | (_, Failed(F::Internal))
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Generating => write!(f, "generating"),
            Self::Parsing => write!(f, "parsing"),
            Self::Validating => write!(f, "validating"),
            Self::AwaitingConfirmation => write!(f, "awaiting confirmation"),
            Self::Executing => write!(f, "executing"),
            Self::AnalyzingFollowUp => write!(f, "analyzing follow-ups"),
            Self::Done => write!(f, "done"),
            Self::Failed(failure) => write!(f, "failed: {}", failure),
        }
    }
}
