//! # fastpy Session
//!
//! Drives one natural-language prompt through the whole pipeline:
//!
//! 1. **Generate**: ask the configured backend, with retries
//! 2. **Parse**: extract `fastpy` invocations from the response
//! 3. **Validate**: check each against the safety policy
//! 4. **Confirm**: ask the user, unless auto-executing or dry-running
//! 5. **Execute**: run allowed commands in order
//! 6. **Follow up**: suggest routes or migrations the run left out
//!
//! Every run produces a [`GenerationSession`] that is terminal when
//! returned and maps to a process exit code.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fastpy_ai::ScriptedBackend;
//! use fastpy_core::{FastpyConfig, Prompt, PromptContext};
//! use fastpy_policy::SafetyValidator;
//! use fastpy_runner::{EngineOptions, ExecutionEngine, MockRunner};
//! use fastpy_session::{AutoConfirm, Coordinator};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let profile = FastpyConfig::default().profile(Some("anthropic"))?;
//! let backend = Arc::new(ScriptedBackend::replying("fastpy make:resource Post -m"));
//! let engine = ExecutionEngine::new(Arc::new(MockRunner::new()), EngineOptions::default());
//! let coordinator = Coordinator::new(
//!     backend,
//!     profile,
//!     SafetyValidator::standard()?,
//!     engine,
//!     Arc::new(AutoConfirm),
//! );
//!
//! let prompt = Prompt::new("Create a blog", PromptContext::new())?;
//! let session = coordinator.run(&prompt, &CancellationToken::new()).await;
//! println!("exit code {}", session.exit_code());
//! # Ok(())
//! # }
//! ```

pub mod confirm;
pub mod coordinator;
pub mod error;
pub mod followup;
pub mod session;
pub mod state;

pub use confirm::{AutoConfirm, Confirmer, DeclineAll, ScriptedConfirmer};
pub use coordinator::{Coordinator, CoordinatorOptions};
pub use error::{SessionError, SessionResult};
pub use followup::{analyze, FollowUp, FollowUpKind};
pub use session::{
    CommandRecord, ExecutionMode, ExitCodes, GenerationInfo, GenerationSession, SessionErrorInfo,
};
pub use state::{SessionFailure, SessionState};
