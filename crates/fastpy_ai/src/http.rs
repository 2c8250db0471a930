//! HTTP plumbing shared by the hosted backends: sending a JSON request and
//! classifying whatever comes back.

use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::backend::{BackendFailure, FailureKind};

const MAX_DETAIL_LEN: usize = 300;

/// Send a request and decode a JSON body, classifying every failure.
pub(crate) async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
) -> Result<T, BackendFailure> {
    let response = request.send().await.map_err(|e| classify_transport(&e))?;
    let status = response.status();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response.text().await.map_err(|e| classify_transport(&e))?;

    if !status.is_success() {
        return Err(classify_status(status, retry_after.as_deref(), &body));
    }

    serde_json::from_str(&body).map_err(|e| {
        debug!("Undecodable backend body: {}", truncate(&body));
        BackendFailure::new(
            FailureKind::MalformedResponse,
            format!("Failed to parse response: {}", e),
        )
    })
}

/// Classify a transport-level error (no HTTP status available).
pub(crate) fn classify_transport(err: &reqwest::Error) -> BackendFailure {
    if err.is_timeout() {
        BackendFailure::new(FailureKind::Timeout, err.to_string())
    } else if err.is_decode() {
        BackendFailure::new(FailureKind::MalformedResponse, err.to_string())
    } else {
        BackendFailure::new(FailureKind::ConnectionFailed, err.to_string())
    }
}

/// Classify a non-success HTTP status.
pub(crate) fn classify_status(
    status: StatusCode,
    retry_after: Option<&str>,
    body: &str,
) -> BackendFailure {
    let message = api_error_message(body).unwrap_or_else(|| truncate(body));
    let detail = if message.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("HTTP {}: {}", status.as_u16(), message)
    };

    match status.as_u16() {
        401 | 403 => BackendFailure::new(FailureKind::AuthInvalid, detail),
        429 => BackendFailure::rate_limited(detail, retry_after.and_then(parse_retry_after)),
        408 => BackendFailure::new(FailureKind::Timeout, detail),
        s if s >= 500 => BackendFailure::new(FailureKind::ServerError, detail),
        _ => BackendFailure::new(FailureKind::MalformedResponse, detail),
    }
}

/// Parse a `Retry-After` value given in seconds.
pub(crate) fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    value
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

/// Pull `error.message` (or a string `error`) out of an API error body.
pub(crate) fn api_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    let message = match error {
        serde_json::Value::String(s) => s.clone(),
        other => other.get("message")?.as_str()?.to_string(),
    };
    (!message.is_empty()).then_some(message)
}

fn truncate(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX_DETAIL_LEN) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_statuses() {
        for code in [401, 403] {
            let status = StatusCode::from_u16(code).unwrap();
            let failure = classify_status(status, None, r#"{"error": {"message": "invalid x-api-key"}}"#);
            assert_eq!(failure.kind, FailureKind::AuthInvalid);
            assert!(failure.detail.contains("invalid x-api-key"));
        }
    }

    #[test]
    fn test_rate_limit_with_hint() {
        let failure = classify_status(StatusCode::TOO_MANY_REQUESTS, Some("7"), "slow down");
        assert_eq!(failure.kind, FailureKind::RateLimited);
        assert_eq!(failure.retry_after, Some(Duration::from_secs(7)));
        assert_eq!(failure.detail, "HTTP 429: slow down");
    }

    #[test]
    fn test_rate_limit_without_usable_hint() {
        let failure = classify_status(
            StatusCode::TOO_MANY_REQUESTS,
            Some("Wed, 21 Oct 2015 07:28:00 GMT"),
            "",
        );
        assert_eq!(failure.retry_after, None);
        assert_eq!(failure.detail, "HTTP 429");
    }

    #[test]
    fn test_out_of_range_rate_limit_hint_is_dropped() {
        for hint in ["1e30", "NaN", "-3", "inf"] {
            let failure = classify_status(StatusCode::TOO_MANY_REQUESTS, Some(hint), "");
            assert_eq!(failure.kind, FailureKind::RateLimited, "{}", hint);
            assert_eq!(failure.retry_after, None, "{}", hint);
        }
        assert_eq!(parse_retry_after("1.5"), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_server_errors() {
        for code in [500, 502, 503, 529] {
            let failure = classify_status(StatusCode::from_u16(code).unwrap(), None, "");
            assert_eq!(failure.kind, FailureKind::ServerError);
        }
    }

    #[test]
    fn test_other_client_errors_are_fatal() {
        let failure = classify_status(StatusCode::NOT_FOUND, None, r#"{"error": "model not found"}"#);
        assert_eq!(failure.kind, FailureKind::MalformedResponse);
        assert_eq!(failure.detail, "HTTP 404: model not found");
        assert!(!failure.kind.is_retryable());

        let timeout = classify_status(StatusCode::REQUEST_TIMEOUT, None, "");
        assert_eq!(timeout.kind, FailureKind::Timeout);
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("30"), Some(Duration::from_secs(30)));
        assert_eq!(parse_retry_after(" 1.5 "), Some(Duration::from_millis(1500)));
        assert_eq!(parse_retry_after("-3"), None);
        assert_eq!(parse_retry_after("soon"), None);
    }

    #[test]
    fn test_truncate_long_bodies() {
        let body = "x".repeat(1000);
        let failure = classify_status(StatusCode::BAD_GATEWAY, None, &body);
        assert!(failure.detail.ends_with("..."));
        assert!(failure.detail.len() < 400);
    }
}
