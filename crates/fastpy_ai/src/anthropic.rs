//! Anthropic Messages API backend.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use fastpy_core::{BackendProfile, Prompt};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{Backend, BackendFailure, BackendResponse, FailureKind};
use crate::error::{AiError, AiResult};
use crate::http::send_json;
use crate::prompt::SYSTEM_PROMPT;

const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;

/// Backend for Anthropic's Claude models.
pub struct AnthropicBackend {
    name: String,
    api_key: String,
    model: String,
    endpoint: String,
    client: reqwest::Client,
}

impl AnthropicBackend {
    pub fn new(profile: &BackendProfile, api_key: String) -> AiResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(profile.request_timeout)
            .build()?;
        Ok(Self {
            name: profile.name.clone(),
            api_key,
            model: profile.model.clone(),
            endpoint: format!("{}/v1/messages", profile.base_url.trim_end_matches('/')),
            client,
        })
    }

    /// Registry factory.
    pub fn create(profile: &BackendProfile, credential: Option<String>) -> AiResult<Arc<dyn Backend>> {
        let api_key = credential.ok_or_else(|| missing_credential(profile))?;
        Ok(Arc::new(Self::new(profile, api_key)?))
    }

    fn request_body(&self, prompt: &Prompt) -> AnthropicRequest {
        AnthropicRequest {
            model: self.model.clone(),
            max_tokens: MAX_TOKENS,
            system: SYSTEM_PROMPT.to_string(),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: prompt.render(),
            }],
        }
    }
}

#[async_trait]
impl Backend for AnthropicBackend {
    async fn generate(&self, prompt: &Prompt) -> Result<BackendResponse, BackendFailure> {
        let started = Instant::now();
        debug!("POST {} (model {})", self.endpoint, self.model);

        let request = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&self.request_body(prompt));

        let result: AnthropicResponse = send_json(request).await?;
        let text = result.text().ok_or_else(|| {
            BackendFailure::new(FailureKind::MalformedResponse, "No text content from Anthropic")
        })?;

        Ok(BackendResponse::new(text, &self.name, &self.model, started.elapsed()))
    }
}

pub(crate) fn missing_credential(profile: &BackendProfile) -> AiError {
    AiError::MissingCredential {
        backend: profile.name.clone(),
        env_var: profile
            .credential
            .env_var()
            .unwrap_or("API key")
            .to_string(),
        key_url: profile.key_url.clone(),
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicContent>,
}

impl AnthropicResponse {
    fn text(&self) -> Option<String> {
        let text: String = self
            .content
            .iter()
            .filter_map(|c| c.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n");
        (!text.trim().is_empty()).then_some(text)
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use fastpy_core::{FastpyConfig, PromptContext};

    fn backend() -> AnthropicBackend {
        let profile = FastpyConfig::default().profile(Some("anthropic")).unwrap();
        AnthropicBackend::new(&profile, "sk-test".to_string()).unwrap()
    }

    #[test]
    fn test_endpoint_and_model() {
        let backend = backend();
        assert_eq!(backend.endpoint, "https://api.anthropic.com/v1/messages");
        assert_eq!(backend.model, "claude-sonnet-4-20250514");
    }

    #[test]
    fn test_request_body_separates_system_prompt() {
        let prompt = Prompt::new("Create a blog", PromptContext::new()).unwrap();
        let body = serde_json::to_value(backend().request_body(&prompt)).unwrap();
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["system"], SYSTEM_PROMPT);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "Create a blog");
    }

    #[test]
    fn test_response_text_joins_blocks() {
        let response: AnthropicResponse = serde_json::from_str(
            r#"{"content": [{"type": "text", "text": "[]"}, {"type": "tool_use"}]}"#,
        )
        .unwrap();
        assert_eq!(response.text().as_deref(), Some("[]"));

        let empty: AnthropicResponse = serde_json::from_str(r#"{"content": []}"#).unwrap();
        assert!(empty.text().is_none());
    }

    #[test]
    fn test_create_requires_credential() {
        let profile = FastpyConfig::default().profile(Some("anthropic")).unwrap();
        let err = AnthropicBackend::create(&profile, None).err().unwrap();
        assert!(matches!(err, AiError::MissingCredential { ref env_var, .. } if env_var == "ANTHROPIC_API_KEY"));
    }
}
