//! Scripted backend and sleeper for testing.
//!
//! Lets callers drive the whole pipeline without network access.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fastpy_core::Prompt;
use parking_lot::RwLock;

use crate::backend::{Backend, BackendFailure, BackendResponse};
use crate::retry::Sleeper;

/// Backend that replays a fixed script of outcomes.
///
/// Once the script is exhausted the last entry repeats.
#[derive(Clone)]
pub struct ScriptedBackend {
    name: String,
    model: String,
    script: Arc<RwLock<VecDeque<Result<String, BackendFailure>>>>,
    last: Arc<RwLock<Option<Result<String, BackendFailure>>>>,
    calls: Arc<AtomicUsize>,
    prompts: Arc<RwLock<Vec<String>>>,
}

impl ScriptedBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: "scripted".to_string(),
            script: Arc::new(RwLock::new(VecDeque::new())),
            last: Arc::new(RwLock::new(None)),
            calls: Arc::new(AtomicUsize::new(0)),
            prompts: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Backend that always answers with `text`.
    pub fn replying(text: impl Into<String>) -> Self {
        Self::new("scripted").then_reply(text)
    }

    /// Backend that always fails with `failure`.
    pub fn failing(failure: BackendFailure) -> Self {
        Self::new("scripted").then_fail(failure)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn then_reply(self, text: impl Into<String>) -> Self {
        self.script.write().push_back(Ok(text.into()));
        self
    }

    pub fn then_fail(self, failure: BackendFailure) -> Self {
        self.script.write().push_back(Err(failure));
        self
    }

    /// Number of `generate` calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Rendered prompts received, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.read().clone()
    }

    fn next_outcome(&self) -> Option<Result<String, BackendFailure>> {
        match self.script.write().pop_front() {
            Some(outcome) => {
                *self.last.write() = Some(outcome.clone());
                Some(outcome)
            }
            None => self.last.read().clone(),
        }
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn generate(&self, prompt: &Prompt) -> Result<BackendResponse, BackendFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.write().push(prompt.render());

        match self.next_outcome() {
            Some(Ok(text)) => Ok(BackendResponse::new(
                text,
                &self.name,
                &self.model,
                Duration::from_millis(10),
            )),
            Some(Err(failure)) => Err(failure),
            None => Ok(BackendResponse::new(
                "",
                &self.name,
                &self.model,
                Duration::ZERO,
            )),
        }
    }
}

/// Sleeper that records requested delays and returns immediately.
#[derive(Debug, Default, Clone)]
pub struct RecordingSleeper {
    delays: Arc<RwLock<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.read().clone()
    }

    pub fn total(&self) -> Duration {
        self.delays.read().iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.write().push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FailureKind;
    use fastpy_core::PromptContext;

    #[tokio::test]
    async fn test_script_replays_then_repeats_last() {
        let backend = ScriptedBackend::new("test")
            .then_fail(BackendFailure::new(FailureKind::ServerError, "503"))
            .then_reply("fastpy list");
        let prompt = Prompt::new("List commands", PromptContext::new()).unwrap();

        assert!(backend.generate(&prompt).await.is_err());
        assert_eq!(backend.generate(&prompt).await.unwrap().text, "fastpy list");
        assert_eq!(backend.generate(&prompt).await.unwrap().text, "fastpy list");
        assert_eq!(backend.call_count(), 3);
        assert_eq!(backend.prompts(), vec!["List commands"; 3]);
    }

    #[tokio::test]
    async fn test_recording_sleeper() {
        let sleeper = RecordingSleeper::new();
        sleeper.sleep(Duration::from_secs(1)).await;
        sleeper.sleep(Duration::from_secs(2)).await;
        assert_eq!(sleeper.total(), Duration::from_secs(3));
    }
}
