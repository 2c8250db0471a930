//! Error types for the session crate.

use thiserror::Error;

use crate::state::SessionState;

/// Result type alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors raised by session bookkeeping.
///
/// Pipeline failures (backend, parse, validation, execution) are not errors
/// of this type; they are recorded on the session.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid session transition: {from} -> {to}")]
    InvalidTransition { from: SessionState, to: SessionState },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
