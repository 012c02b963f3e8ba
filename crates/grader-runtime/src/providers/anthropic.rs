//! Anthropic Claude provider implementation.
//!
//! Structured output uses the Messages API with the structured-outputs
//! beta: the request opts in through the `anthropic-beta` header and carries
//! the schema in an `output_format` envelope.

use super::{
    factory::ProviderFactory,
    http_client, retry_after,
    secrets::{ApiCredential, CredentialSource},
    validate_base_url, LlmProvider, ModelConfig, ProviderError, StructuredRequest,
    StructuredResponse, TokenUsage,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Environment variable name for Anthropic API key.
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Beta flag enabling JSON-schema constrained output.
pub const STRUCTURED_OUTPUTS_BETA: &str = "structured-outputs-2025-11-13";

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

/// Anthropic Claude provider.
pub struct AnthropicProvider {
    credential: ApiCredential,
    base_url: String,
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            credential: ApiCredential::new(
                api_key,
                CredentialSource::Programmatic,
                "Anthropic API key",
            ),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Create from JSON configuration (`api_key`, `base_url`) with
    /// `ANTHROPIC_API_KEY` as the key fallback.
    pub fn from_config(config: &JsonValue) -> Result<Self, ProviderError> {
        let credential = ApiCredential::from_config_or_env(
            config,
            "api_key",
            ANTHROPIC_API_KEY_ENV,
            "Anthropic API key",
        )?;

        let base_url = config["base_url"]
            .as_str()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();

        tracing::debug!(
            provider = "anthropic",
            credential = credential.name(),
            source = ?credential.source(),
            base_url = %base_url,
            "Loaded provider credential"
        );

        Ok(Self {
            credential,
            base_url,
        })
    }
}

/// Anthropic API request format.
#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
    temperature: f32,
    output_format: OutputFormat<'a>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: Vec<ContentBlock<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock<'a> {
    Text { text: &'a str },
}

#[derive(Debug, Serialize)]
struct OutputFormat<'a> {
    #[serde(rename = "type")]
    type_: &'static str,
    schema: &'a JsonValue,
}

/// Anthropic API response format.
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<ContentBlockResponse>,
    #[serde(default)]
    model: String,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlockResponse {
    #[serde(rename = "type")]
    type_: String,
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
    #[serde(default)]
    cache_creation_input_tokens: u32,
    #[serde(default)]
    cache_read_input_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    message: String,
}

fn build_request<'a>(request: &'a StructuredRequest, config: &'a ModelConfig) -> AnthropicRequest<'a> {
    AnthropicRequest {
        model: &config.model,
        max_tokens: config.max_output_tokens,
        system: &request.system,
        messages: vec![AnthropicMessage {
            role: "user",
            content: vec![ContentBlock::Text {
                text: &request.prompt,
            }],
        }],
        temperature: config.temperature,
        output_format: OutputFormat {
            type_: "json_schema",
            schema: request.schema.definition,
        },
    }
}

fn into_structured(body: AnthropicResponse) -> StructuredResponse {
    let content = body
        .content
        .into_iter()
        .filter(|block| block.type_ == "text")
        .filter_map(|block| block.text)
        .collect::<Vec<_>>()
        .join("");

    let refusal = (body.stop_reason.as_deref() == Some("refusal"))
        .then(|| "Model declined to answer".to_string());

    StructuredResponse {
        content,
        refusal,
        usage: TokenUsage {
            prompt_tokens: body.usage.input_tokens,
            completion_tokens: body.usage.output_tokens,
            cache_read_tokens: body.usage.cache_read_input_tokens,
            cache_creation_tokens: body.usage.cache_creation_input_tokens,
        },
        model: body.model,
        stop_reason: body.stop_reason,
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn extract_structured(
        &self,
        request: &StructuredRequest,
        config: &ModelConfig,
    ) -> Result<StructuredResponse, ProviderError> {
        let client = http_client()?;
        let body = build_request(request, config);

        tracing::debug!(
            provider = "anthropic",
            model = %config.model,
            schema = %request.schema.kind,
            prompt_chars = request.prompt.len(),
            "Sending structured request"
        );

        // Only expose the credential here, at the point of use
        let response = client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", self.credential.expose())
            .header("anthropic-version", API_VERSION)
            .header("anthropic-beta", STRUCTURED_OUTPUTS_BETA)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::HttpError(format!("request timed out: {}", e))
                } else {
                    ProviderError::HttpError(e.to_string())
                }
            })?;

        let status = response.status();

        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited {
                retry_after: retry_after(response.headers()),
            });
        }

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ProviderError::AuthError);
        }

        if !status.is_success() {
            let message = match response.json::<AnthropicError>().await {
                Ok(body) => body.error.message,
                Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
            };
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        Ok(into_structured(body))
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_empty()
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

/// Factory for creating Anthropic providers from configuration.
///
/// ```json
/// {
///   "api_key": "sk-ant-...",     // Optional, falls back to ANTHROPIC_API_KEY env
///   "base_url": "https://..."    // Optional, custom API endpoint
/// }
/// ```
pub struct AnthropicProviderFactory;

impl ProviderFactory for AnthropicProviderFactory {
    fn provider_type(&self) -> &'static str {
        "anthropic"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let provider = AnthropicProvider::from_config(config)?;
        Ok(Arc::new(provider))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        if !ApiCredential::is_available(config, "api_key", ANTHROPIC_API_KEY_ENV) {
            return Err(ProviderError::NotConfigured(format!(
                "Anthropic API key required: set 'api_key' in config or {} env",
                ANTHROPIC_API_KEY_ENV
            )));
        }
        validate_base_url(config)
    }

    fn description(&self) -> &'static str {
        "Anthropic Claude provider with structured outputs"
    }
}
