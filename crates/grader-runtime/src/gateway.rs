//! LLM gateway: the single entry point for structured provider calls.
//!
//! The gateway owns the provider instances and the retry policy. Each
//! request is attempted up to `retry.attempts` times with exponential
//! backoff; every attempt runs under the per-call timeout, and its response
//! is parsed and checked against the schema's acceptance rules before it
//! counts as a success.

use backon::Retryable;
use grader_core::SchemaKind;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::config::{GraderConfig, ProviderKind};
use crate::payload::extract_json_payload;
use crate::providers::{
    LlmProvider, ModelConfig, ProviderError, ProviderRegistry, StructuredRequest,
    StructuredResponse,
};
use crate::resilience::{LlmUsage, RetryPolicy, UsageTracker};

/// Failures of a gateway call, after classification.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("Provider {provider} unavailable: {message}")]
    ProviderUnavailable { provider: String, message: String },

    #[error("Provider {provider} returned output violating {schema}: {detail}")]
    SchemaViolation {
        provider: String,
        schema: String,
        detail: String,
    },

    #[error("Provider {provider} returned no usable content: {detail}")]
    EmptyResponse { provider: String, detail: String },

    #[error("Provider {provider} rejected the request: {message}")]
    Rejected { provider: String, message: String },

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl GatewayError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::ProviderUnavailable { .. }
                | GatewayError::SchemaViolation { .. }
                | GatewayError::EmptyResponse { .. }
        )
    }

    fn from_provider(provider: &str, schema: SchemaKind, error: ProviderError) -> Self {
        let provider = provider.to_string();
        match error {
            ProviderError::HttpError(message) => GatewayError::ProviderUnavailable { provider, message },
            ProviderError::Timeout(after) => GatewayError::ProviderUnavailable {
                provider,
                message: format!("timed out after {:?}", after),
            },
            ProviderError::RateLimited { .. } => GatewayError::ProviderUnavailable {
                provider,
                message: "rate limited".to_string(),
            },
            ProviderError::ApiError { status, message }
                if status == 408 || status == 429 || status >= 500 =>
            {
                GatewayError::ProviderUnavailable {
                    provider,
                    message: format!("{} - {}", status, message),
                }
            }
            ProviderError::ApiError { status, message } => GatewayError::Rejected {
                provider,
                message: format!("{} - {}", status, message),
            },
            ProviderError::AuthError => GatewayError::Rejected {
                provider,
                message: "authentication failed".to_string(),
            },
            ProviderError::ParseError(detail) => GatewayError::SchemaViolation {
                provider,
                schema: schema.name().to_string(),
                detail,
            },
            ProviderError::NotConfigured(message) => GatewayError::NotConfigured(message),
        }
    }
}

/// A validated structured response.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    /// Parsed JSON that passed the schema's acceptance check
    pub value: JsonValue,

    /// Usage of every attempt, failed ones included
    pub usage: LlmUsage,

    /// Model that served the successful attempt
    pub model: String,

    pub attempts: u32,
}

/// What the gateway knows about one provider kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderStatus {
    pub provider: ProviderKind,

    /// Factory description, when the kind is compiled into this build
    pub description: Option<&'static str>,

    pub configured: bool,
    pub healthy: bool,
}

/// Routes structured requests to configured providers.
pub struct LlmGateway {
    providers: BTreeMap<ProviderKind, Arc<dyn LlmProvider>>,
    retry: RetryPolicy,
}

impl LlmGateway {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            providers: BTreeMap::new(),
            retry,
        }
    }

    /// Install (or replace) the provider serving `kind`.
    pub fn with_provider(mut self, kind: ProviderKind, provider: Arc<dyn LlmProvider>) -> Self {
        self.providers.insert(kind, provider);
        self
    }

    /// Build providers for every kind the registry knows and the config can satisfy.
    ///
    /// Kinds that fail validation (typically a missing API key) are left out;
    /// requests for them fail with [`GatewayError::NotConfigured`].
    pub fn from_config(config: &GraderConfig, registry: &ProviderRegistry) -> Self {
        let mut gateway = Self::new(config.retry_policy());
        for kind in ProviderKind::ALL {
            if !registry.has_provider(kind.as_str()) {
                continue;
            }
            match registry.create(kind.as_str(), &config.provider_config(kind)) {
                Ok(provider) => {
                    tracing::debug!(provider = %kind, "Provider configured");
                    gateway.providers.insert(kind, provider);
                }
                Err(e) => {
                    tracing::debug!(provider = %kind, error = %e, "Provider unavailable");
                }
            }
        }
        gateway
    }

    pub fn has_provider(&self, kind: ProviderKind) -> bool {
        self.providers.contains_key(&kind)
    }

    pub fn configured_providers(&self) -> Vec<ProviderKind> {
        self.providers.keys().copied().collect()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Status of every provider kind; unconfigured kinds are never healthy.
    pub async fn provider_status(&self, registry: &ProviderRegistry) -> Vec<ProviderStatus> {
        let mut statuses = Vec::with_capacity(ProviderKind::ALL.len());
        for kind in ProviderKind::ALL {
            let healthy = match self.providers.get(&kind) {
                Some(provider) => provider.health_check().await,
                None => false,
            };
            statuses.push(ProviderStatus {
                provider: kind,
                description: registry.description(kind.as_str()),
                configured: self.providers.contains_key(&kind),
                healthy,
            });
        }
        statuses
    }

    /// Request schema-conforming JSON from `provider`.
    pub async fn request(
        &self,
        provider: ProviderKind,
        schema: SchemaKind,
        system: &str,
        prompt: &str,
        model: &ModelConfig,
    ) -> Result<GatewayResponse, GatewayError> {
        let backend: &dyn LlmProvider = match self.providers.get(&provider) {
            Some(backend) => backend.as_ref(),
            None => return Err(GatewayError::NotConfigured(provider.to_string())),
        };

        let request = StructuredRequest {
            system: system.to_string(),
            prompt: prompt.to_string(),
            schema: schema.descriptor(),
        };
        let usage = UsageTracker::new();
        let attempts = AtomicU32::new(0);

        let outcome = (|| self.attempt(backend, &request, model, &usage, &attempts))
            .retry(self.retry.backoff())
            .when(GatewayError::is_retryable)
            .notify(|e: &GatewayError, delay| {
                tracing::warn!(
                    provider = %provider,
                    schema = %schema,
                    attempt = attempts.load(Ordering::SeqCst),
                    error = %e,
                    delay = ?delay,
                    "Retrying LLM request"
                );
            })
            .await;

        let attempts = attempts.load(Ordering::SeqCst);
        match outcome {
            Ok((value, served_by)) => Ok(GatewayResponse {
                value,
                usage: usage.snapshot(),
                model: served_by,
                attempts,
            }),
            Err(e) => {
                tracing::warn!(
                    provider = %provider,
                    schema = %schema,
                    attempts,
                    error = %e,
                    "LLM request failed"
                );
                Err(e)
            }
        }
    }

    async fn attempt(
        &self,
        backend: &dyn LlmProvider,
        request: &StructuredRequest,
        model: &ModelConfig,
        usage: &UsageTracker,
        attempts: &AtomicU32,
    ) -> Result<(JsonValue, String), GatewayError> {
        attempts.fetch_add(1, Ordering::SeqCst);
        let kind = request.schema.kind;

        let response =
            match tokio::time::timeout(self.retry.timeout, backend.extract_structured(request, model)).await {
                Err(_) => {
                    return Err(GatewayError::ProviderUnavailable {
                        provider: backend.name().to_string(),
                        message: format!("no response within {:?}", self.retry.timeout),
                    })
                }
                Ok(Err(e)) => return Err(GatewayError::from_provider(backend.name(), kind, e)),
                Ok(Ok(response)) => response,
            };

        let served_by = if response.model.is_empty() {
            model.model.clone()
        } else {
            response.model.clone()
        };
        let mut call = LlmUsage::default();
        call.add(&response.usage, &served_by);
        usage.record(&call);

        let value = validate_response(backend.name(), kind, response)?;
        Ok((value, served_by))
    }
}

impl std::fmt::Debug for LlmGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmGateway")
            .field("providers", &self.configured_providers())
            .field("retry", &self.retry)
            .finish()
    }
}

/// Turn raw provider output into accepted JSON.
fn validate_response(
    provider: &str,
    schema: SchemaKind,
    response: StructuredResponse,
) -> Result<JsonValue, GatewayError> {
    if let Some(refusal) = response.refusal {
        return Err(GatewayError::EmptyResponse {
            provider: provider.to_string(),
            detail: format!("refused: {}", refusal),
        });
    }
    if response.content.trim().is_empty() {
        return Err(GatewayError::EmptyResponse {
            provider: provider.to_string(),
            detail: format!(
                "empty content (stop reason: {})",
                response.stop_reason.as_deref().unwrap_or("unknown")
            ),
        });
    }

    let value = extract_json_payload(&response.content).ok_or_else(|| GatewayError::SchemaViolation {
        provider: provider.to_string(),
        schema: schema.name().to_string(),
        detail: "response is not JSON".to_string(),
    })?;

    schema
        .accept(&value)
        .map_err(|violations| GatewayError::SchemaViolation {
            provider: provider.to_string(),
            schema: schema.name().to_string(),
            detail: violations.join("; "),
        })?;

    Ok(value)
}
