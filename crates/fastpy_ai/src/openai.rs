//! OpenAI-compatible chat completions backend.
//!
//! Serves both OpenAI and Groq, which expose the same wire format under
//! different base URLs.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use fastpy_core::{BackendProfile, Prompt};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::anthropic::missing_credential;
use crate::backend::{Backend, BackendFailure, BackendResponse, FailureKind};
use crate::error::AiResult;
use crate::http::send_json;
use crate::prompt::SYSTEM_PROMPT;

const MAX_TOKENS: u32 = 1024;

pub struct OpenAiCompatibleBackend {
    name: String,
    display_name: String,
    api_key: String,
    model: String,
    endpoint: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleBackend {
    pub fn new(profile: &BackendProfile, api_key: String) -> AiResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(profile.request_timeout)
            .build()?;
        Ok(Self {
            name: profile.name.clone(),
            display_name: profile.display_name.clone(),
            api_key,
            model: profile.model.clone(),
            endpoint: format!(
                "{}/chat/completions",
                profile.base_url.trim_end_matches('/')
            ),
            client,
        })
    }

    pub fn create(profile: &BackendProfile, credential: Option<String>) -> AiResult<Arc<dyn Backend>> {
        let api_key = credential.ok_or_else(|| missing_credential(profile))?;
        Ok(Arc::new(Self::new(profile, api_key)?))
    }

    fn request_body(&self, prompt: &Prompt) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            max_tokens: MAX_TOKENS,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.render(),
                },
            ],
        }
    }
}

#[async_trait]
impl Backend for OpenAiCompatibleBackend {
    async fn generate(&self, prompt: &Prompt) -> Result<BackendResponse, BackendFailure> {
        let started = Instant::now();
        debug!("POST {} (model {})", self.endpoint, self.model);

        let request = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(prompt));

        let result: ChatResponse = send_json(request).await?;
        let text = result.text().ok_or_else(|| {
            BackendFailure::new(
                FailureKind::MalformedResponse,
                format!("No message content from {}", self.display_name),
            )
        })?;

        Ok(BackendResponse::new(text, &self.name, &self.model, started.elapsed()))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

impl ChatResponse {
    fn text(&self) -> Option<String> {
        self.choices
            .first()
            .map(|choice| choice.message.content.clone())
            .filter(|text| !text.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}
