//! Name-to-constructor registry for inference backends.

use std::sync::Arc;

use fastpy_core::BackendProfile;
use tracing::debug;

use crate::anthropic::AnthropicBackend;
use crate::backend::Backend;
use crate::error::{AiError, AiResult};
use crate::google::GoogleBackend;
use crate::ollama::OllamaBackend;
use crate::openai::OpenAiCompatibleBackend;

/// Builds a backend from its profile and resolved credential.
pub type BackendFactory = fn(&BackendProfile, Option<String>) -> AiResult<Arc<dyn Backend>>;

/// Ordered registry of backend constructors.
///
/// Adding a backend means registering one more factory; nothing else in the
/// pipeline changes.
#[derive(Clone)]
pub struct BackendRegistry {
    factories: Vec<(String, BackendFactory)>,
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl BackendRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            factories: Vec::new(),
        }
    }

    /// The built-in backends.
    pub fn standard() -> Self {
        Self::empty()
            .register("anthropic", AnthropicBackend::create)
            .register("openai", OpenAiCompatibleBackend::create)
            .register("google", GoogleBackend::create)
            .register("groq", OpenAiCompatibleBackend::create)
            .register("ollama", OllamaBackend::create)
    }

    /// Register (or replace) a factory under `name`.
    pub fn register(mut self, name: impl Into<String>, factory: BackendFactory) -> Self {
        let name = name.into().to_lowercase();
        self.factories.retain(|(existing, _)| *existing != name);
        self.factories.push((name, factory));
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factory(name).is_some()
    }

    /// Build the backend for `profile`, reading its credential from the
    /// process environment.
    pub fn build(&self, profile: &BackendProfile) -> AiResult<Arc<dyn Backend>> {
        self.build_with(profile, |key| std::env::var(key).ok())
    }

    /// Build the backend for `profile`, reading its credential through `lookup`.
    pub fn build_with(
        &self,
        profile: &BackendProfile,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> AiResult<Arc<dyn Backend>> {
        let factory = self
            .factory(&profile.name)
            .ok_or_else(|| AiError::UnknownBackend {
                name: profile.name.clone(),
                available: self.names().join(", "),
            })?;

        debug!("Building {} backend with model {}", profile.name, profile.model);
        factory(profile, profile.credential.lookup_with(lookup))
    }

    fn factory(&self, name: &str) -> Option<BackendFactory> {
        self.factories
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, factory)| *factory)
    }
}
