//! fastpy CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success (also: declined, nothing to do)
//! - 1: Fatal backend, parse or configuration error
//! - 2: No generated command passed the safety policy
//! - 3: Execution halted by --stop-on-failure
//! - 130: Cancelled

use std::fs::OpenOptions;
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use fastpy_core::FastpyConfig;
use fastpy_session::ExitCodes;
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

mod commands;

use commands::{Cli, Commands};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = load_config(&cli);
    init_logging(&cli, config.as_ref().ok());

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("❌ Error: failed to start async runtime: {}", e);
            return ExitCode::from(ExitCodes::FATAL_ERROR);
        }
    };

    let result = match config {
        Ok(config) => runtime.block_on(dispatch(cli.command, config)),
        Err(e) => Err(e),
    };

    // A confirmation prompt may still be blocked on stdin after Ctrl-C.
    runtime.shutdown_background();

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(ExitCodes::FATAL_ERROR)
        }
    }
}

async fn dispatch(command: Commands, config: FastpyConfig) -> Result<u8> {
    match command {
        Commands::Ai(args) => commands::ai::execute(args, &config).await,
        Commands::Providers(args) => commands::providers::execute(args, &config),
    }
}

fn load_config(cli: &Cli) -> Result<FastpyConfig> {
    let mut config = match &cli.config {
        Some(path) => FastpyConfig::load_from(path)?,
        None => FastpyConfig::load()?,
    };
    config
        .apply_env(|key| std::env::var(key).ok())
        .context("Invalid environment override")?;
    Ok(config)
}

/// Console filter: `RUST_LOG` wins, then flags, then configuration.
fn console_filter(cli: &Cli, config: Option<&FastpyConfig>) -> EnvFilter {
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return filter;
        }
    }
    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        config
            .and_then(|c| c.logging.level.as_deref())
            .unwrap_or("warn")
    };
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
}

fn init_logging(cli: &Cli, config: Option<&FastpyConfig>) {
    let console = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(console_filter(cli, config));

    let file = config
        .and_then(|c| c.logging.file.as_ref())
        .and_then(|path| match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(file),
            Err(e) => {
                eprintln!("⚠️  Cannot open log file {}: {}", path.display(), e);
                None
            }
        })
        .map(|file| {
            fmt::layer()
                .json()
                .with_writer(Mutex::new(file))
                .with_filter(LevelFilter::DEBUG)
        });

    if tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .is_err()
    {
        // Logging already initialized, continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_config_from_flag() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[ai]\ncommand_timeout = 42\n\n[logging]\nlevel = \"debug\"").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let cli = Cli::try_parse_from(["fastpy", "--config", &path, "ai:providers"]).unwrap();
        let config = load_config(&cli).unwrap();

        assert_eq!(config.ai.command_timeout, 42);
        assert_eq!(config.command_timeout(), std::time::Duration::from_secs(42));
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[ai\nprovider = ").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let cli = Cli::try_parse_from(["fastpy", "--config", &path, "ai:providers"]).unwrap();
        assert!(load_config(&cli).is_err());
    }

    #[test]
    fn test_debug_flag_wins_over_config_level() {
        let cli = Cli::try_parse_from(["fastpy", "--debug", "ai:providers"]).unwrap();
        let mut config = FastpyConfig::default();
        config.logging.level = Some("error".to_string());

        if std::env::var_os(EnvFilter::DEFAULT_ENV).is_none() {
            let filter = console_filter(&cli, Some(&config));
            assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
        }
    }
}
