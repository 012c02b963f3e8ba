//! Rubric parsing: document text to canonical rubric plus preview.

use grader_core::{normalize, ParsingPreview, Rubric, SchemaKind};
use serde::Serialize;
use std::sync::Arc;

use crate::config::{GraderConfig, ProviderKind};
use crate::error::GraderError;
use crate::gateway::{GatewayError, LlmGateway};
use crate::prompts::{rubric_extraction_prompt, RUBRIC_EXTRACTION_SYSTEM};
use crate::resilience::LlmUsage;

/// Length of the summary taken from the source text when extraction gives none.
const SUMMARY_FALLBACK_CHARS: usize = 400;

/// Result of parsing one rubric document.
#[derive(Debug, Clone, Serialize)]
pub struct ParsedRubric {
    pub rubric: Rubric,

    /// Preview with placeholder prompts; never contains transcript text
    pub preview: ParsingPreview,

    pub usage: LlmUsage,
}

/// Extracts rubrics from free-form text through the gateway.
pub struct RubricParser {
    gateway: Arc<LlmGateway>,
    config: Arc<GraderConfig>,
}

impl RubricParser {
    pub fn new(gateway: Arc<LlmGateway>, config: Arc<GraderConfig>) -> Self {
        Self { gateway, config }
    }

    /// Extract, normalize and preview a rubric.
    ///
    /// Fails with [`GraderError::InvalidInput`] on blank text and with
    /// [`GraderError::RubricParsing`] when the provider fails terminally or
    /// the extraction holds no usable criterion.
    pub async fn parse_rubric(
        &self,
        raw_text: &str,
        provider: ProviderKind,
    ) -> Result<ParsedRubric, GraderError> {
        let source = raw_text.trim();
        if source.is_empty() {
            return Err(GraderError::InvalidInput("Rubric text is empty".to_string()));
        }

        tracing::info!(provider = %provider, source_chars = source.len(), "Parsing rubric");

        let response = self
            .gateway
            .request(
                provider,
                SchemaKind::RubricExtraction,
                RUBRIC_EXTRACTION_SYSTEM,
                &rubric_extraction_prompt(source),
                &self.config.model_config(provider),
            )
            .await
            .map_err(GraderError::RubricParsing)?;

        let mut rubric = normalize(&response.value);
        if rubric.criteria.is_empty() {
            return Err(GraderError::RubricParsing(GatewayError::SchemaViolation {
                provider: provider.to_string(),
                schema: SchemaKind::RubricExtraction.name().to_string(),
                detail: "extraction contained no named criteria".to_string(),
            }));
        }
        if rubric.summary.trim().is_empty() {
            rubric.summary = summary_from_source(source);
        }

        let preview = ParsingPreview::build(&rubric);

        tracing::info!(
            provider = %provider,
            title = %rubric.title,
            rubric_type = %rubric.rubric_type,
            criteria = rubric.criteria.len(),
            max_total_score = rubric.max_total_score,
            attempts = response.attempts,
            "Rubric parsed"
        );

        Ok(ParsedRubric {
            rubric,
            preview,
            usage: response.usage,
        })
    }
}

fn summary_from_source(source: &str) -> String {
    source
        .chars()
        .take(SUMMARY_FALLBACK_CHARS)
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}
