//! OpenAI provider implementation.
//!
//! Structured output uses the Responses API: the schema travels inside the
//! `text.format` request field as a strict `json_schema` format.

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

/// Environment variable name for OpenAI API key.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI Responses API provider.
pub struct OpenAiProvider {
    credential: ApiCredential,
    base_url: String,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            credential: ApiCredential::new(
                api_key,
                CredentialSource::Programmatic,
                "OpenAI API key",
            ),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Create from JSON configuration (`api_key`, `base_url`) with
    /// `OPENAI_API_KEY` as the key fallback.
    pub fn from_config(config: &JsonValue) -> Result<Self, ProviderError> {
        let credential = ApiCredential::from_config_or_env(
            config,
            "api_key",
            OPENAI_API_KEY_ENV,
            "OpenAI API key",
        )?;

        let base_url = config["base_url"]
            .as_str()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();

        tracing::debug!(
            provider = "openai",
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

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    instructions: &'a str,
    input: &'a str,
    temperature: f32,
    max_output_tokens: u32,
    text: TextConfig<'a>,
}

#[derive(Debug, Serialize)]
struct TextConfig<'a> {
    format: JsonSchemaFormat<'a>,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat<'a> {
    #[serde(rename = "type")]
    type_: &'static str,
    name: &'a str,
    schema: &'a JsonValue,
    strict: bool,
}

#[derive(Debug, Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    output: Vec<OutputItem>,
    #[serde(default)]
    usage: Option<ResponsesUsage>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    type_: String,
    #[serde(default)]
    content: Vec<OutputContent>,
}

#[derive(Debug, Deserialize)]
struct OutputContent {
    #[serde(rename = "type")]
    type_: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponsesUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
    #[serde(default)]
    input_tokens_details: Option<InputTokenDetails>,
}

#[derive(Debug, Deserialize)]
struct InputTokenDetails {
    #[serde(default)]
    cached_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    message: String,
}

fn build_request<'a>(request: &'a StructuredRequest, config: &'a ModelConfig) -> ResponsesRequest<'a> {
    ResponsesRequest {
        model: &config.model,
        instructions: &request.system,
        input: &request.prompt,
        temperature: config.temperature,
        max_output_tokens: config.max_output_tokens,
        text: TextConfig {
            format: JsonSchemaFormat {
                type_: "json_schema",
                name: request.schema.name,
                schema: request.schema.definition,
                strict: true,
            },
        },
    }
}

fn into_structured(body: ResponsesResponse) -> StructuredResponse {
    let mut texts = Vec::new();
    let mut refusal = None;
    for item in body.output.into_iter().filter(|item| item.type_ == "message") {
        for part in item.content {
            match part.type_.as_str() {
                "output_text" => texts.extend(part.text),
                "refusal" => {
                    refusal = Some(part.refusal.unwrap_or_else(|| "Model declined to answer".to_string()))
                }
                _ => {}
            }
        }
    }

    let usage = body
        .usage
        .map(|u| TokenUsage {
            prompt_tokens: u.input_tokens,
            completion_tokens: u.output_tokens,
            cache_read_tokens: u.input_tokens_details.map(|d| d.cached_tokens).unwrap_or(0),
            cache_creation_tokens: 0,
        })
        .unwrap_or_default();

    StructuredResponse {
        content: texts.join(""),
        refusal,
        usage,
        model: body.model,
        stop_reason: body.status,
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn extract_structured(
        &self,
        request: &StructuredRequest,
        config: &ModelConfig,
    ) -> Result<StructuredResponse, ProviderError> {
        let client = http_client()?;
        let body = build_request(request, config);

        tracing::debug!(
            provider = "openai",
            model = %config.model,
            schema = %request.schema.kind,
            prompt_chars = request.prompt.len(),
            "Sending structured request"
        );

        let response = client
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(self.credential.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::HttpError(e.to_string()))?;

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
            let message = match response.json::<OpenAiError>().await {
                Ok(body) => body.error.message,
                Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
            };
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body: ResponsesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        Ok(into_structured(body))
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_empty()
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Factory for creating OpenAI providers from configuration.
///
/// ```json
/// {
///   "api_key": "sk-...",         // Optional, falls back to OPENAI_API_KEY env
///   "base_url": "https://..."    // Optional, custom API endpoint
/// }
/// ```
pub struct OpenAiProviderFactory;

impl ProviderFactory for OpenAiProviderFactory {
    fn provider_type(&self) -> &'static str {
        "openai"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let provider = OpenAiProvider::from_config(config)?;
        Ok(Arc::new(provider))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        if !ApiCredential::is_available(config, "api_key", OPENAI_API_KEY_ENV) {
            return Err(ProviderError::NotConfigured(format!(
                "OpenAI API key required: set 'api_key' in config or {} env",
                OPENAI_API_KEY_ENV
            )));
        }
        validate_base_url(config)
    }

    fn description(&self) -> &'static str {
        "OpenAI Responses API provider with strict JSON schema output"
    }
}
