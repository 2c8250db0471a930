//! Error types for the runner module.

use thiserror::Error;

/// Result type alias for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Errors that can occur during runner operations.
///
/// A command that cannot be spawned is not an error; it is recorded as an
/// [`crate::ExecutionResult`] with a spawn-failure condition.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Cannot execute an empty command")]
    EmptyCommand,

    #[error("Command execution failed: {0}")]
    ExecutionFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
