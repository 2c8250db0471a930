//! # fastpy_runner
//!
//! Executes approved commands for the fastpy AI pipeline.
//!
//! # Features
//!
//! - **No shell**: argv is handed to the OS exactly as parsed
//! - **Sequential**: one command at a time, in index order
//! - **Bounded**: per-command timeout and cooperative cancellation; a killed
//!   command is recorded, never lost
//! - **Dry-run** and **stop-on-failure** policies
//! - **Mock Runner**: for testing without spawning processes
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fastpy_core::{parse, ValidationVerdict};
//! use fastpy_runner::{EngineOptions, ExecutionEngine, ProcessRunner};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let queue: Vec<_> = parse("fastpy db:migrate")?
//!         .into_iter()
//!         .map(|command| (command, ValidationVerdict::Allowed))
//!         .collect();
//!
//!     let engine = ExecutionEngine::new(Arc::new(ProcessRunner::new()), EngineOptions::default());
//!     let report = engine.execute(&queue, &CancellationToken::new()).await;
//!     println!("{} succeeded", report.succeeded_count());
//!     Ok(())
//! }
//! ```

pub mod engine;
pub mod error;
pub mod mock;
pub mod process;
pub mod runner;

pub use engine::{
    CommandOutcome, CommandStatus, EngineOptions, ExecutionEngine, ExecutionReport, HaltReason,
};
pub use error::{RunnerError, RunnerResult};
pub use mock::{CapturedCall, MockResponse, MockRunner};
pub use process::{format_command, OutputHandler, OutputLine, OutputStream, ProcessRunner};
pub use runner::{
    CommandRunner, ExecutionResult, ExitCondition, RunOptions, DEFAULT_COMMAND_TIMEOUT,
};
