//! Error types for the policy crate.

use thiserror::Error;

/// Result type alias for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Errors raised while building a safety policy.
///
/// Evaluating a command never fails; a command that cannot be judged is
/// blocked instead.
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Rule compilation failed: {rule} - {message}")]
    InvalidRule { rule: String, message: String },

    #[error("Invalid policy configuration: {0}")]
    InvalidConfiguration(String),
}
