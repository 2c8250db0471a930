//! Local Ollama backend. Needs no credential.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use fastpy_core::{BackendProfile, Prompt};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{Backend, BackendFailure, BackendResponse, FailureKind};
use crate::error::AiResult;
use crate::http::send_json;
use crate::prompt::inline_prompt;

pub struct OllamaBackend {
    name: String,
    model: String,
    endpoint: String,
    client: reqwest::Client,
}

impl OllamaBackend {
    pub fn new(profile: &BackendProfile) -> AiResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(profile.request_timeout)
            .build()?;
        Ok(Self {
            name: profile.name.clone(),
            model: profile.model.clone(),
            endpoint: format!("{}/api/generate", profile.base_url.trim_end_matches('/')),
            client,
        })
    }

    pub fn create(profile: &BackendProfile, _credential: Option<String>) -> AiResult<Arc<dyn Backend>> {
        Ok(Arc::new(Self::new(profile)?))
    }

    fn request_body(&self, prompt: &Prompt) -> GenerateRequest {
        GenerateRequest {
            model: self.model.clone(),
            prompt: inline_prompt(&prompt.render()),
            stream: false,
        }
    }
}

#[async_trait]
impl Backend for OllamaBackend {
    async fn generate(&self, prompt: &Prompt) -> Result<BackendResponse, BackendFailure> {
        let started = Instant::now();
        debug!("POST {} (model {})", self.endpoint, self.model);

        let request = self.client.post(&self.endpoint).json(&self.request_body(prompt));
        let result: GenerateResponse = send_json(request).await?;
        if result.response.trim().is_empty() {
            return Err(BackendFailure::new(
                FailureKind::MalformedResponse,
                "Empty response from Ollama",
            ));
        }

        Ok(BackendResponse::new(
            result.response,
            &self.name,
            &self.model,
            started.elapsed(),
        ))
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::SYSTEM_PROMPT;
    use fastpy_core::{FastpyConfig, PromptContext};

    #[test]
    fn test_host_override() {
        let mut config = FastpyConfig::default();
        config.ai.ollama_host = Some("http://gpu-box:11434/".to_string());
        let profile = config.profile(Some("ollama")).unwrap();
        let backend = OllamaBackend::new(&profile).unwrap();
        assert_eq!(backend.endpoint, "http://gpu-box:11434/api/generate");
    }

    #[test]
    fn test_request_inlines_system_prompt() {
        let profile = FastpyConfig::default().profile(Some("ollama")).unwrap();
        let backend = OllamaBackend::new(&profile).unwrap();
        let prompt = Prompt::new("Create a todo app", PromptContext::new()).unwrap();

        let body = serde_json::to_value(backend.request_body(&prompt)).unwrap();
        assert_eq!(body["stream"], false);
        assert_eq!(body["model"], "llama3.2");
        let text = body["prompt"].as_str().unwrap();
        assert!(text.starts_with(SYSTEM_PROMPT));
        assert!(text.ends_with("User request: Create a todo app"));
    }
}
