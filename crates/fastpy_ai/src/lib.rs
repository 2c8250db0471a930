//! # fastpy_ai
//!
//! Inference backends and the retry orchestrator that drives them.
//!
//! Every backend implements the single [`Backend`] capability: turn a
//! [`fastpy_core::Prompt`] into raw completion text, or report a classified
//! [`BackendFailure`]. Backends make exactly one outbound call per
//! invocation; [`RetryOrchestrator`] owns retries, backoff, the overall
//! deadline and cancellation.
//!
//! Built-in backends: Anthropic, OpenAI, Google Gemini, Groq and a local
//! Ollama server. They are selected by name through [`BackendRegistry`].

pub mod anthropic;
pub mod backend;
pub mod error;
pub mod google;
mod http;
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod prompt;
pub mod registry;
pub mod retry;

pub use backend::{Backend, BackendFailure, BackendResponse, FailureKind};
pub use error::{AiError, AiResult};
pub use mock::{RecordingSleeper, ScriptedBackend};
pub use prompt::SYSTEM_PROMPT;
pub use registry::{BackendFactory, BackendRegistry};
pub use retry::{CallError, RetryOrchestrator, Sleeper, TokioSleeper};
