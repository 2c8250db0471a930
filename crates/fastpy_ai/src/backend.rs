//! The backend contract shared by every inference service.

use std::time::Duration;

use async_trait::async_trait;
use fastpy_core::{BackendProfile, CredentialSource, Prompt};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

/// Classification of a failed generation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    ConnectionFailed,
    /// 401/403-equivalent.
    AuthInvalid,
    /// 429-equivalent.
    RateLimited,
    /// 5xx-equivalent.
    ServerError,
    /// The backend returned something that cannot be treated as text.
    MalformedResponse,
}

impl FailureKind {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::ConnectionFailed | Self::RateLimited | Self::ServerError
        )
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Timeout => "Connection timed out",
            Self::ConnectionFailed => "Connection failed",
            Self::AuthInvalid => "Invalid API key",
            Self::RateLimited => "Rate limit exceeded",
            Self::ServerError => "Server error",
            Self::MalformedResponse => "Malformed response",
        };
        write!(f, "{}", label)
    }
}

/// A classified failure returned by [`Backend::generate`].
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {detail}")]
pub struct BackendFailure {
    pub kind: FailureKind,
    pub detail: String,
    /// Server-provided hint for how long to wait (rate limits only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<Duration>,
}

impl BackendFailure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            retry_after: None,
        }
    }

    pub fn rate_limited(detail: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self {
            kind: FailureKind::RateLimited,
            detail: detail.into(),
            retry_after,
        }
    }

    /// User-facing hint for recovering from this failure.
    pub fn guidance(&self, profile: &BackendProfile) -> String {
        let name = &profile.display_name;
        match self.kind {
            FailureKind::AuthInvalid => {
                let mut hint = match profile.credential.env_var() {
                    Some(var) => format!(
                        "Your {} API key is invalid or has been revoked.\nSet it with: export {}=your-key",
                        name, var
                    ),
                    None => format!("{} rejected the request as unauthorized.", name),
                };
                if let Some(url) = &profile.key_url {
                    hint.push_str(&format!("\nGet a new key at: {}", url));
                }
                hint
            }
            FailureKind::RateLimited => format!(
                "You've hit the {} rate limit. You may have exceeded your quota, \
                 or sent too many requests in a short period. Wait a moment and try again.",
                name
            ),
            FailureKind::ServerError => {
                format!("{} is experiencing issues. Try again in a few minutes.", name)
            }
            FailureKind::Timeout => {
                format!("The {} API took too long to respond. Try again later.", name)
            }
            FailureKind::ConnectionFailed => match profile.credential {
                CredentialSource::None => format!(
                    "Cannot connect to {} at {}. Is it running?\nStart it with: ollama serve",
                    name, profile.base_url
                ),
                CredentialSource::Env(_) => format!(
                    "Could not connect to the {} API. Check your internet connection.",
                    name
                ),
            },
            FailureKind::MalformedResponse => format!(
                "{} returned a response that could not be used. \
                 Try again or pick another backend with --provider.",
                name
            ),
        }
    }
}

/// Raw completion text from one successful attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendResponse {
    pub text: String,
    pub backend: String,
    pub model: String,
    pub latency_ms: u64,
    /// 1-based attempt number that produced this response.
    pub attempt: u32,
}

impl BackendResponse {
    pub fn new(
        text: impl Into<String>,
        backend: impl Into<String>,
        model: impl Into<String>,
        latency: Duration,
    ) -> Self {
        Self {
            text: text.into(),
            backend: backend.into(),
            model: model.into(),
            latency_ms: latency.as_millis() as u64,
            attempt: 1,
        }
    }
}

/// An inference backend.
///
/// Each backend is one implementation of this trait; callers never branch on
/// which backend they hold.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Backend: Send + Sync {
    /// Turn a prompt into raw completion text with one outbound call.
    async fn generate(&self, prompt: &Prompt) -> Result<BackendResponse, BackendFailure>;
}
