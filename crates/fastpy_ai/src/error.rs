//! Error types for backend construction.

use thiserror::Error;

/// Result type alias for backend setup operations.
pub type AiResult<T> = Result<T, AiError>;

/// Errors raised while selecting or constructing a backend.
///
/// Failures of an individual generation call are not errors of this type;
/// they are classified as [`crate::BackendFailure`] values.
#[derive(Error, Debug)]
pub enum AiError {
    #[error("Unknown backend: {name} (available: {available})")]
    UnknownBackend { name: String, available: String },

    #[error("{env_var} not set")]
    MissingCredential {
        backend: String,
        env_var: String,
        key_url: Option<String>,
    },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

impl AiError {
    /// Hint telling the user how to fix the error.
    pub fn guidance(&self) -> Option<String> {
        match self {
            Self::MissingCredential {
                env_var, key_url, ..
            } => {
                let mut hint = format!("Set it with: export {}=your-key", env_var);
                if let Some(url) = key_url {
                    hint.push_str(&format!("\nGet your key at: {}", url));
                }
                Some(hint)
            }
            Self::UnknownBackend { available, .. } => Some(format!("Available: {}", available)),
            Self::Client(_) => None,
        }
    }
}
