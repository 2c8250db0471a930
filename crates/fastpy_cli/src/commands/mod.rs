//! CLI command definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod ai;
pub mod confirm;
pub mod providers;

/// fastpy - AI command generation for FastAPI projects
#[derive(Parser, Debug)]
#[command(name = "fastpy")]
#[command(version, about = "fastpy - AI command generation for FastAPI projects")]
#[command(long_about = r#"
Describe what you want to build and fastpy asks an AI backend for the
fastpy commands that build it. Every generated command is checked against
the safety policy before anything runs.

COMMANDS:
  ai            → Generate, review and run commands from a prompt
  ai:providers  → List AI backends and their credential status

EXIT CODES:
  0   - Success
  1   - Backend, parse or configuration error
  2   - No generated command passed the safety policy
  3   - Execution halted by --stop-on-failure
  130 - Cancelled
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Configuration file (default: ~/.fastpy/config.toml)
    #[arg(long, global = true, env = "FASTPY_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate fastpy commands from a natural-language prompt
    Ai(ai::AiArgs),

    /// List AI backends, models and credential status
    #[command(name = "ai:providers")]
    Providers(providers::ProvidersArgs),
}
