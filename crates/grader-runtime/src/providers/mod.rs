//! LLM provider abstractions for grader-runtime.
//!
//! Every backend exposes a single capability: given a prompt and a
//! provider-agnostic [`SchemaDescriptor`], return schema-constrained JSON
//! text. How the schema reaches the provider (a `text.format` field, a beta
//! header plus `output_format`) is the adapter's business.
//!
//! ## Security
//!
//! All providers use the [`secrets`] module for credential handling.
//! See [`ApiCredential`] for the recommended patterns.

use async_trait::async_trait;
use grader_core::SchemaDescriptor;
use std::time::Duration;
use thiserror::Error;

mod factory;
pub mod secrets;

#[cfg(feature = "anthropic")]
mod anthropic;

#[cfg(feature = "openai")]
mod openai;

pub use factory::{ProviderFactory, ProviderRegistry};
pub use secrets::{ApiCredential, CredentialSource};

#[cfg(feature = "anthropic")]
pub use anthropic::{AnthropicProvider, AnthropicProviderFactory};

#[cfg(feature = "openai")]
pub use openai::{OpenAiProvider, OpenAiProviderFactory};

/// Errors from LLM providers.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    ParseError(String),

    #[error("Authentication failed")]
    AuthError,

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

/// Model settings for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Maximum tokens to generate
    pub max_output_tokens: u32,
}

/// A structured-output request.
#[derive(Debug, Clone)]
pub struct StructuredRequest {
    /// System instructions
    pub system: String,

    /// User prompt
    pub prompt: String,

    pub schema: SchemaDescriptor,
}

/// Raw response from a structured-output call.
#[derive(Debug, Clone, Default)]
pub struct StructuredResponse {
    /// Concatenated text content (expected to be JSON)
    pub content: String,

    /// Refusal text, when the model declined
    pub refusal: Option<String>,

    pub usage: TokenUsage,

    /// Model that served the request
    pub model: String,

    pub stop_reason: Option<String>,
}

/// Token usage from a completion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenUsage {
    /// Tokens in the prompt
    pub prompt_tokens: u32,

    /// Tokens in the completion
    pub completion_tokens: u32,

    /// Tokens read from cache
    pub cache_read_tokens: u32,

    /// Tokens written to cache (Anthropic)
    pub cache_creation_tokens: u32,
}

impl TokenUsage {
    /// Total tokens used.
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Provider abstraction over structured-output backends.
///
/// This is the only place where LLM calls are made. The gateway wraps it
/// with retries, timeouts and response validation.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Request JSON conforming to `request.schema`.
    async fn extract_structured(
        &self,
        request: &StructuredRequest,
        config: &ModelConfig,
    ) -> Result<StructuredResponse, ProviderError>;

    /// Check if provider is usable.
    async fn health_check(&self) -> bool;

    /// Provider name for logs.
    fn name(&self) -> &str;
}

/// Parse a `retry-after` header value in seconds.
#[cfg(any(feature = "anthropic", feature = "openai"))]
fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Shared HTTP client for all adapters.
#[cfg(any(feature = "anthropic", feature = "openai"))]
fn http_client() -> Result<&'static reqwest::Client, ProviderError> {
    static CLIENT: std::sync::OnceLock<reqwest::Client> = std::sync::OnceLock::new();
    if let Some(client) = CLIENT.get() {
        return Ok(client);
    }
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(300))
        .build()
        .map_err(|e| ProviderError::HttpError(format!("Failed to build HTTP client: {}", e)))?;
    Ok(CLIENT.get_or_init(|| client))
}

/// Check that a configured base URL is an http(s) URL.
#[cfg_attr(not(any(feature = "anthropic", feature = "openai")), allow(dead_code))]
pub(crate) fn validate_base_url(config: &serde_json::Value) -> Result<(), ProviderError> {
    if let Some(url) = config["base_url"].as_str() {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ProviderError::NotConfigured(
                "base_url must start with http:// or https://".to_string(),
            ));
        }
    }
    Ok(())
}
