//! Runtime configuration.
//!
//! Configuration is an explicit value passed to the gateway, parser and
//! engine constructors. It loads from YAML or JSON and then applies
//! `GRADER_*` environment overrides:
//!
//! ```yaml
//! llm_provider: anthropic
//! model: claude-sonnet-4-5-20250514
//! temperature: 0.2
//! retry_attempts: 3
//! retry_base_delay: 500ms
//! request_timeout: 60s
//! performance_band_boundaries:
//!   "90": Excellent
//!   "75": Proficient
//!   "60": Developing
//!   "0": Needs Improvement
//! providers:
//!   anthropic:
//!     base_url: https://api.anthropic.com/v1
//! ```

use grader_core::PerformanceBands;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::providers::ModelConfig;
use crate::resilience::RetryPolicy;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "GRADER_";

/// Errors from loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML config: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON config: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

impl ConfigError {
    fn invalid(key: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum ProviderKind {
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "anthropic")]
    Anthropic,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::OpenAi, ProviderKind::Anthropic];

    /// Registry key of the provider factory.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-4o-mini",
            ProviderKind::Anthropic => "claude-sonnet-4-5-20250514",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            other => Err(ConfigError::invalid(
                "llm_provider",
                format!("unknown provider '{}', expected openai or anthropic", other),
            )),
        }
    }
}

/// How the evaluation narrative is produced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SummaryMode {
    /// Ask the model, falling back to the template on failure
    #[default]
    Llm,
    /// Always use the deterministic template
    Templated,
}

impl FromStr for SummaryMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "llm" => Ok(SummaryMode::Llm),
            "templated" | "template" => Ok(SummaryMode::Templated),
            other => Err(ConfigError::invalid(
                "summary_mode",
                format!("unknown summary mode '{}'", other),
            )),
        }
    }
}

/// Grader configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GraderConfig {
    /// Provider used when a request does not name one
    pub llm_provider: ProviderKind,

    /// Model override; the provider default is used when absent
    pub model: Option<String>,

    /// Temperature for extraction and scoring calls
    pub temperature: f32,

    /// Temperature for the narrative summary call
    pub summary_temperature: f32,

    pub max_output_tokens: u32,

    pub performance_band_boundaries: PerformanceBands,

    /// Total attempts per gateway call
    pub retry_attempts: u32,

    #[serde(with = "duration_str")]
    pub retry_base_delay: Duration,

    #[serde(with = "duration_str")]
    pub request_timeout: Duration,

    /// Concurrent criterion scoring calls per evaluation
    pub max_concurrency: usize,

    pub summary_mode: SummaryMode,

    /// Per-provider JSON (`api_key`, `base_url`), keyed by provider name
    pub providers: BTreeMap<String, JsonValue>,
}

impl Default for GraderConfig {
    fn default() -> Self {
        Self {
            llm_provider: ProviderKind::default(),
            model: None,
            temperature: 0.2,
            summary_temperature: 0.7,
            max_output_tokens: 2000,
            performance_band_boundaries: PerformanceBands::default(),
            retry_attempts: 3,
            retry_base_delay: Duration::from_millis(500),
            request_timeout: Duration::from_secs(60),
            max_concurrency: 10,
            summary_mode: SummaryMode::default(),
            providers: BTreeMap::new(),
        }
    }
}

impl GraderConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: GraderConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: GraderConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file, choosing the format by extension (`.json` or YAML).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if is_json {
            Self::from_json(&contents)
        } else {
            Self::from_yaml(&contents)
        }
    }

    /// Apply `GRADER_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (keys include the `GRADER_` prefix).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, name))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = get("LLM_PROVIDER") {
            self.llm_provider = v.parse()?;
        }
        if let Some(v) = get("MODEL") {
            self.model = Some(v);
        }
        if let Some(v) = get("TEMPERATURE") {
            self.temperature = parse_number("temperature", &v)?;
        }
        if let Some(v) = get("SUMMARY_TEMPERATURE") {
            self.summary_temperature = parse_number("summary_temperature", &v)?;
        }
        if let Some(v) = get("MAX_OUTPUT_TOKENS") {
            self.max_output_tokens = parse_number("max_output_tokens", &v)?;
        }
        if let Some(v) = get("RETRY_ATTEMPTS") {
            self.retry_attempts = parse_number("retry_attempts", &v)?;
        }
        if let Some(v) = get("RETRY_BASE_DELAY") {
            self.retry_base_delay = parse_duration("retry_base_delay", &v)?;
        }
        if let Some(v) = get("REQUEST_TIMEOUT") {
            self.request_timeout = parse_duration("request_timeout", &v)?;
        }
        if let Some(v) = get("MAX_CONCURRENCY") {
            self.max_concurrency = parse_number("max_concurrency", &v)?;
        }
        if let Some(v) = get("SUMMARY_MODE") {
            self.summary_mode = v.parse()?;
        }

        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::invalid("temperature", "must be between 0 and 2"));
        }
        if !(0.0..=2.0).contains(&self.summary_temperature) {
            return Err(ConfigError::invalid(
                "summary_temperature",
                "must be between 0 and 2",
            ));
        }
        if self.max_output_tokens == 0 {
            return Err(ConfigError::invalid("max_output_tokens", "must be positive"));
        }
        if self.retry_attempts == 0 {
            return Err(ConfigError::invalid("retry_attempts", "must be at least 1"));
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::invalid("max_concurrency", "must be at least 1"));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::invalid("request_timeout", "must be positive"));
        }
        Ok(())
    }

    /// Model settings for extraction and scoring calls.
    pub fn model_config(&self, provider: ProviderKind) -> ModelConfig {
        ModelConfig {
            model: self.model_name(provider),
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
        }
    }

    /// Model settings for the narrative summary call.
    pub fn summary_model_config(&self, provider: ProviderKind) -> ModelConfig {
        ModelConfig {
            temperature: self.summary_temperature,
            ..self.model_config(provider)
        }
    }

    /// The configured model applies to the default provider only; others use their defaults.
    fn model_name(&self, provider: ProviderKind) -> String {
        match &self.model {
            Some(model) if provider == self.llm_provider => model.clone(),
            _ => provider.default_model().to_string(),
        }
    }

    /// Provider-specific JSON handed to the provider factory.
    pub fn provider_config(&self, provider: ProviderKind) -> JsonValue {
        self.providers
            .get(provider.as_str())
            .cloned()
            .unwrap_or_else(|| serde_json::json!({}))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry_attempts,
            base_delay: self.retry_base_delay,
            timeout: self.request_timeout,
            ..RetryPolicy::default()
        }
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::invalid(key, format!("'{}' is not a valid number", value)))
}

fn parse_duration(key: &str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value).map_err(|e| ConfigError::invalid(key, e.to_string()))
}

/// Serde adapter for human-readable durations (`"500ms"`, `"1m 30s"`).
mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
    }
}
