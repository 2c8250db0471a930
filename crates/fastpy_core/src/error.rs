//! Error types for the core crate.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while building prompts, parsing responses or
/// loading configuration.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Prompt must not be empty")]
    EmptyPrompt,

    #[error("No valid commands found in backend response")]
    NoCommands {
        /// The raw response text, kept for manual inspection.
        raw: String,
    },

    #[error("Unknown backend: {name} (available: {available})")]
    UnknownBackend { name: String, available: String },

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Failed to read config file {path:?}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path:?}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
