//! Google Gemini `generateContent` backend.

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

const MAX_OUTPUT_TOKENS: u32 = 1024;

pub struct GoogleBackend {
    name: String,
    api_key: String,
    model: String,
    endpoint: String,
    client: reqwest::Client,
}

impl GoogleBackend {
    pub fn new(profile: &BackendProfile, api_key: String) -> AiResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(profile.request_timeout)
            .build()?;
        Ok(Self {
            name: profile.name.clone(),
            api_key,
            model: profile.model.clone(),
            endpoint: format!(
                "{}/models/{}:generateContent",
                profile.base_url.trim_end_matches('/'),
                profile.model
            ),
            client,
        })
    }

    pub fn create(profile: &BackendProfile, credential: Option<String>) -> AiResult<Arc<dyn Backend>> {
        let api_key = credential.ok_or_else(|| missing_credential(profile))?;
        Ok(Arc::new(Self::new(profile, api_key)?))
    }

    fn request_body(&self, prompt: &Prompt) -> GenerateRequest {
        GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: Some(SYSTEM_PROMPT.to_string()),
                }],
            },
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(prompt.render()),
                }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        }
    }
}

#[async_trait]
impl Backend for GoogleBackend {
    async fn generate(&self, prompt: &Prompt) -> Result<BackendResponse, BackendFailure> {
        let started = Instant::now();
        debug!("POST {}", self.endpoint);

        let request = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(prompt));

        let result: GenerateResponse = send_json(request).await?;
        let text = result.text().ok_or_else(|| {
            BackendFailure::new(FailureKind::MalformedResponse, "No candidates from Gemini")
        })?;

        Ok(BackendResponse::new(text, &self.name, &self.model, started.elapsed()))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(rename = "system_instruction")]
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateResponse {
    fn text(&self) -> Option<String> {
        let candidate = self.candidates.first()?;
        let text: String = candidate
            .content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        (!text.trim().is_empty()).then_some(text)
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}
