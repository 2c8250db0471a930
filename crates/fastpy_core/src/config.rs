//! Read-only configuration: `~/.fastpy/config.toml` plus environment overrides.
//!
//! The pipeline never writes configuration or credentials. Credentials are
//! looked up from the environment variable named by a backend's profile.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, CoreResult};

/// Built-in defaults for one inference backend.
#[derive(Debug, Clone, Copy)]
pub struct BackendDefaults {
    pub name: &'static str,
    pub display_name: &'static str,
    pub model: &'static str,
    pub credential_env: Option<&'static str>,
    pub base_url: &'static str,
    pub key_url: Option<&'static str>,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

/// Backends known to the configuration layer, in display order.
pub const KNOWN_BACKENDS: &[BackendDefaults] = &[
    BackendDefaults {
        name: "anthropic",
        display_name: "Anthropic Claude",
        model: "claude-sonnet-4-20250514",
        credential_env: Some("ANTHROPIC_API_KEY"),
        base_url: "https://api.anthropic.com",
        key_url: Some("https://console.anthropic.com"),
        timeout_secs: 30,
        max_attempts: 3,
        base_delay_ms: 1000,
    },
    BackendDefaults {
        name: "openai",
        display_name: "OpenAI GPT",
        model: "gpt-4o",
        credential_env: Some("OPENAI_API_KEY"),
        base_url: "https://api.openai.com/v1",
        key_url: Some("https://platform.openai.com/api-keys"),
        timeout_secs: 30,
        max_attempts: 3,
        base_delay_ms: 1000,
    },
    BackendDefaults {
        name: "google",
        display_name: "Google Gemini",
        model: "gemini-1.5-flash",
        credential_env: Some("GOOGLE_API_KEY"),
        base_url: "https://generativelanguage.googleapis.com/v1beta",
        key_url: Some("https://aistudio.google.com/apikey"),
        timeout_secs: 30,
        max_attempts: 3,
        base_delay_ms: 1000,
    },
    BackendDefaults {
        name: "groq",
        display_name: "Groq",
        model: "llama-3.3-70b-versatile",
        credential_env: Some("GROQ_API_KEY"),
        base_url: "https://api.groq.com/openai/v1",
        key_url: Some("https://console.groq.com/keys"),
        timeout_secs: 30,
        max_attempts: 3,
        base_delay_ms: 2000,
    },
    BackendDefaults {
        name: "ollama",
        display_name: "Ollama (local)",
        model: "llama3.2",
        credential_env: None,
        base_url: "http://localhost:11434",
        key_url: None,
        timeout_secs: 60,
        max_attempts: 2,
        base_delay_ms: 500,
    },
];

/// Look up built-in defaults by backend name (case-insensitive).
pub fn backend_defaults(name: &str) -> Option<&'static BackendDefaults> {
    KNOWN_BACKENDS
        .iter()
        .find(|b| b.name.eq_ignore_ascii_case(name))
}

/// Retry/backoff policy for backend calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Growth factor applied per further attempt.
    pub multiplier: f64,
    /// Symmetric jitter as a fraction of the delay (0.2 = ±20%).
    pub jitter: f64,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
    /// Wall-clock ceiling for the whole call chain.
    pub deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            jitter: 0.2,
            max_delay: Duration::from_secs(8),
            deadline: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// A policy with no delays, useful for tests and scripted runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter: 0.0,
            max_delay: Duration::ZERO,
            deadline: Duration::from_secs(60),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Non-finite values disable jitter.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = if jitter.is_finite() {
            jitter.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Un-jittered delay before attempt `attempt` (2-based; attempt 1 has none).
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = self.multiplier.max(1.0).powi(attempt as i32 - 2);
        let secs = self.base_delay.as_secs_f64() * factor;
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }
}

/// Where a backend's credential comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// The backend needs no credential.
    None,
    /// Read from the named environment variable.
    Env(String),
}

impl CredentialSource {
    pub fn env_var(&self) -> Option<&str> {
        match self {
            Self::None => None,
            Self::Env(var) => Some(var),
        }
    }

    /// Resolve the credential from the process environment.
    pub fn lookup(&self) -> Option<String> {
        self.lookup_with(|key| std::env::var(key).ok())
    }

    pub fn lookup_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
        match self {
            Self::None => None,
            Self::Env(var) => lookup(var).filter(|value| !value.trim().is_empty()),
        }
    }
}

/// Resolved, read-only configuration for one backend.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendProfile {
    pub name: String,
    pub display_name: String,
    pub model: String,
    pub credential: CredentialSource,
    pub base_url: String,
    pub key_url: Option<String>,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl BackendProfile {
    /// Profile built purely from the built-in defaults.
    pub fn from_defaults(defaults: &BackendDefaults) -> Self {
        Self {
            name: defaults.name.to_string(),
            display_name: defaults.display_name.to_string(),
            model: defaults.model.to_string(),
            credential: defaults
                .credential_env
                .map(|var| CredentialSource::Env(var.to_string()))
                .unwrap_or(CredentialSource::None),
            base_url: defaults.base_url.to_string(),
            key_url: defaults.key_url.map(str::to_string),
            request_timeout: Duration::from_secs(defaults.timeout_secs),
            retry: RetryPolicy::default()
                .with_max_attempts(defaults.max_attempts)
                .with_base_delay(Duration::from_millis(defaults.base_delay_ms)),
        }
    }
}

/// `[ai]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiSection {
    pub provider: String,
    pub timeout: Option<u64>,
    pub max_retries: Option<u32>,
    pub anthropic_model: Option<String>,
    pub openai_model: Option<String>,
    pub google_model: Option<String>,
    pub groq_model: Option<String>,
    pub ollama_model: Option<String>,
    pub ollama_host: Option<String>,
    pub base_delay_ms: Option<u64>,
    pub backoff_multiplier: Option<f64>,
    pub jitter: Option<f64>,
    pub deadline_secs: Option<u64>,
    /// Per-command execution timeout in seconds.
    pub command_timeout: u64,
    pub stop_on_failure: bool,
    /// Path used to spawn the tool's own commands instead of a `PATH` lookup.
    pub executable: Option<PathBuf>,
}

impl Default for AiSection {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            timeout: None,
            max_retries: None,
            anthropic_model: None,
            openai_model: None,
            google_model: None,
            groq_model: None,
            ollama_model: None,
            ollama_host: None,
            base_delay_ms: None,
            backoff_multiplier: None,
            jitter: None,
            deadline_secs: None,
            command_timeout: 300,
            stop_on_failure: false,
            executable: None,
        }
    }
}

impl AiSection {
    /// Reject backoff tuning values that cannot produce a delay.
    fn check_backoff(&self) -> CoreResult<()> {
        let checks = [
            ("ai.jitter", self.jitter, 0.0..=1.0),
            ("ai.backoff_multiplier", self.backoff_multiplier, 1.0..=f64::MAX),
        ];
        for (key, value, range) in checks {
            if let Some(value) = value {
                if !value.is_finite() || !range.contains(&value) {
                    return Err(CoreError::InvalidValue {
                        key: key.to_string(),
                        value: value.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: Option<String>,
    pub file: Option<PathBuf>,
}

/// The tool's configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FastpyConfig {
    pub ai: AiSection,
    pub logging: LoggingSection,
}

impl FastpyConfig {
    /// Default location: `~/.fastpy/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".fastpy").join("config.toml"))
    }

    /// Load from the default location and apply environment overrides.
    pub fn load() -> CoreResult<Self> {
        let mut config = match Self::default_path() {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load a config file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            debug!("No config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| CoreError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| CoreError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.ai.check_backoff()?;
        debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> CoreResult<()> {
        if let Some(provider) = lookup("FASTPY_AI_PROVIDER") {
            self.ai.provider = provider.to_lowercase();
        }
        if let Some(value) = lookup("FASTPY_AI_TIMEOUT") {
            self.ai.timeout = Some(parse_number("FASTPY_AI_TIMEOUT", &value)?);
        }
        if let Some(value) = lookup("FASTPY_AI_MAX_RETRIES") {
            self.ai.max_retries = Some(parse_number("FASTPY_AI_MAX_RETRIES", &value)?);
        }
        if let Some(model) = lookup("OLLAMA_MODEL") {
            self.ai.ollama_model = Some(model);
        }
        if let Some(host) = lookup("OLLAMA_HOST") {
            self.ai.ollama_host = Some(host);
        }
        if let Some(level) = lookup("FASTPY_LOG_LEVEL") {
            self.logging.level = Some(level);
        }
        if let Some(file) = lookup("FASTPY_LOG_FILE") {
            self.logging.file = Some(PathBuf::from(file));
        }
        Ok(())
    }

    /// Names of all configurable backends.
    pub fn backend_names() -> Vec<&'static str> {
        KNOWN_BACKENDS.iter().map(|b| b.name).collect()
    }

    /// Resolve the profile for `name`, or for the configured provider.
    pub fn profile(&self, name: Option<&str>) -> CoreResult<BackendProfile> {
        let name = name.unwrap_or(&self.ai.provider).to_lowercase();
        let defaults = backend_defaults(&name).ok_or_else(|| CoreError::UnknownBackend {
            name: name.clone(),
            available: Self::backend_names().join(", "),
        })?;

        let mut profile = BackendProfile::from_defaults(defaults);
        if let Some(model) = self.model_override(defaults.name) {
            profile.model = model.clone();
        }
        if defaults.name == "ollama" {
            if let Some(host) = &self.ai.ollama_host {
                profile.base_url = host.trim_end_matches('/').to_string();
            }
        }
        if let Some(timeout) = self.ai.timeout {
            profile.request_timeout = Duration::from_secs(timeout);
        }
        if let Some(max_retries) = self.ai.max_retries {
            profile.retry = profile.retry.with_max_attempts(max_retries);
        }
        if let Some(ms) = self.ai.base_delay_ms {
            profile.retry = profile.retry.with_base_delay(Duration::from_millis(ms));
        }
        if let Some(multiplier) = self.ai.backoff_multiplier {
            profile.retry.multiplier = multiplier.max(1.0);
        }
        if let Some(jitter) = self.ai.jitter {
            profile.retry = profile.retry.with_jitter(jitter);
        }
        if let Some(secs) = self.ai.deadline_secs {
            profile.retry = profile.retry.with_deadline(Duration::from_secs(secs));
        }
        Ok(profile)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.ai.command_timeout)
    }

    fn model_override(&self, backend: &str) -> Option<&String> {
        match backend {
            "anthropic" => self.ai.anthropic_model.as_ref(),
            "openai" => self.ai.openai_model.as_ref(),
            "google" => self.ai.google_model.as_ref(),
            "groq" => self.ai.groq_model.as_ref(),
            "ollama" => self.ai.ollama_model.as_ref(),
            _ => None,
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> CoreResult<T> {
    value.trim().parse().map_err(|_| CoreError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = FastpyConfig::default();
        assert_eq!(config.ai.provider, "anthropic");
        assert_eq!(config.command_timeout(), Duration::from_secs(300));

        let profile = config.profile(None).unwrap();
        assert_eq!(profile.name, "anthropic");
        assert_eq!(profile.model, "claude-sonnet-4-20250514");
        assert_eq!(profile.credential.env_var(), Some("ANTHROPIC_API_KEY"));
        assert_eq!(profile.request_timeout, Duration::from_secs(30));
        assert_eq!(profile.retry.max_attempts, 3);
    }

    #[test]
    fn test_ollama_profile_has_no_credential() {
        let config = FastpyConfig::default();
        let profile = config.profile(Some("Ollama")).unwrap();
        assert_eq!(profile.credential, CredentialSource::None);
        assert_eq!(profile.request_timeout, Duration::from_secs(60));
        assert_eq!(profile.retry.max_attempts, 2);
        assert_eq!(profile.retry.base_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_unknown_backend() {
        let config = FastpyConfig::default();
        let err = config.profile(Some("skynet")).unwrap_err();
        assert!(matches!(err, CoreError::UnknownBackend { .. }));
        assert!(err.to_string().contains("anthropic, openai, google, groq, ollama"));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let temp = tempdir().unwrap();
        let config = FastpyConfig::load_from(&temp.path().join("config.toml")).unwrap();
        assert_eq!(config.ai.provider, "anthropic");
    }

    #[test]
    fn test_load_from_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            r#"
[ai]
provider = "ollama"
ollama_model = "mistral"
ollama_host = "http://gpu-box:11434/"
timeout = 90
max_retries = 5
command_timeout = 120

[logging]
level = "DEBUG"
"#,
        )
        .unwrap();

        let config = FastpyConfig::load_from(&path).unwrap();
        let profile = config.profile(None).unwrap();
        assert_eq!(profile.name, "ollama");
        assert_eq!(profile.model, "mistral");
        assert_eq!(profile.base_url, "http://gpu-box:11434");
        assert_eq!(profile.request_timeout, Duration::from_secs(90));
        assert_eq!(profile.retry.max_attempts, 5);
        assert_eq!(config.command_timeout(), Duration::from_secs(120));
        assert_eq!(config.logging.level.as_deref(), Some("DEBUG"));
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "[ai\nprovider = ").unwrap();
        assert!(matches!(
            FastpyConfig::load_from(&path),
            Err(CoreError::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_non_finite_backoff_values_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        for body in ["[ai]\njitter = nan", "[ai]\njitter = 1.5", "[ai]\nbackoff_multiplier = inf"] {
            fs::write(&path, body).unwrap();
            let err = FastpyConfig::load_from(&path).unwrap_err();
            assert!(matches!(err, CoreError::InvalidValue { .. }), "{}", body);
        }
    }

    #[test]
    fn test_nan_jitter_disables_jitter() {
        let policy = RetryPolicy::default().with_jitter(f64::NAN);
        assert_eq!(policy.jitter, 0.0);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = FastpyConfig::default();
        config
            .apply_env(env(&[
                ("FASTPY_AI_PROVIDER", "OpenAI"),
                ("FASTPY_AI_TIMEOUT", "45"),
                ("FASTPY_AI_MAX_RETRIES", "1"),
                ("FASTPY_LOG_FILE", "/tmp/fastpy.log"),
            ]))
            .unwrap();

        let profile = config.profile(None).unwrap();
        assert_eq!(profile.name, "openai");
        assert_eq!(profile.request_timeout, Duration::from_secs(45));
        assert_eq!(profile.retry.max_attempts, 1);
        assert_eq!(config.logging.file, Some(PathBuf::from("/tmp/fastpy.log")));
    }

    #[test]
    fn test_invalid_env_number() {
        let mut config = FastpyConfig::default();
        let err = config
            .apply_env(env(&[("FASTPY_AI_TIMEOUT", "soon")]))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidValue { ref key, .. } if key == "FASTPY_AI_TIMEOUT"));
    }

    #[test]
    fn test_credential_lookup() {
        let source = CredentialSource::Env("GROQ_API_KEY".to_string());
        assert_eq!(
            source.lookup_with(env(&[("GROQ_API_KEY", "gsk-123")])),
            Some("gsk-123".to_string())
        );
        assert_eq!(source.lookup_with(env(&[("GROQ_API_KEY", "  ")])), None);
        assert_eq!(CredentialSource::None.lookup_with(env(&[])), None);
    }

    #[test]
    fn test_nominal_delay_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.nominal_delay(1), Duration::ZERO);
        assert_eq!(policy.nominal_delay(2), Duration::from_secs(1));
        assert_eq!(policy.nominal_delay(3), Duration::from_secs(2));
        assert_eq!(policy.nominal_delay(4), Duration::from_secs(4));
        assert_eq!(policy.nominal_delay(10), Duration::from_secs(8));
    }
}
