//! # fastpy_core
//!
//! Shared building blocks for the fastpy AI command pipeline.
//!
//! This crate provides:
//! - **Data model**: prompts, parsed commands and validation verdicts
//! - **Response parser**: turns free-form completion text into an ordered
//!   list of command invocations, without any side effects
//! - **Configuration**: read-only backend profiles from
//!   `~/.fastpy/config.toml` and the environment
//!
//! ## Example
//!
//! ```rust
//! use fastpy_core::parse;
//!
//! let raw = "Run these:\n```bash\nfastpy make:resource Post -m\nfastpy db:migrate\n```";
//! let commands = parse(raw).unwrap();
//! assert_eq!(commands.len(), 2);
//! assert_eq!(commands[1].subcommand(), Some("db:migrate"));
//! ```

pub mod command;
pub mod config;
pub mod error;
pub mod parser;
pub mod prompt;

pub use command::{BlockReason, CommandSource, ParsedCommand, ValidationVerdict, TOOL_NAME};
pub use config::{
    backend_defaults, BackendDefaults, BackendProfile, CredentialSource, FastpyConfig,
    RetryPolicy, KNOWN_BACKENDS,
};
pub use error::{CoreError, CoreResult};
pub use parser::{command_schema, parse, validate_command_array, ResponseParser};
pub use prompt::{Prompt, PromptContext};
