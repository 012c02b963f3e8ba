//! # grader-runtime
//!
//! LLM-backed rubric extraction and transcript scoring.
//!
//! `grader-core` owns every deterministic step; this crate adds what needs a
//! provider:
//! - Provider adapters (OpenAI Responses API, Anthropic Messages API)
//! - The LLM gateway with retries, timeouts and response validation
//! - Rubric parsing and the scoring engine
//! - Repository and text-extraction boundaries plus the service facade
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use grader_runtime::{GraderConfig, GraderService, InMemoryRepository, PlainTextExtractor, RubricSource};
//!
//! let mut config = GraderConfig::from_file("grader.yaml")?;
//! config.apply_env_overrides()?;
//!
//! let service = GraderService::from_config(
//!     config,
//!     Arc::new(InMemoryRepository::new()),
//!     Arc::new(PlainTextExtractor),
//! );
//!
//! let parsed = service.parse_rubric(&rubric_text, None).await?;
//! let saved = service.save_rubric(&parsed.rubric)?;
//! let stored = service
//!     .score_transcript(RubricSource::Stored(saved.id), &transcript, None, false)
//!     .await?;
//! println!("{} ({})", stored.evaluation.total_score, stored.evaluation.performance_band);
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod parser;
pub mod payload;
pub mod prompts;
pub mod providers;
pub mod repository;
pub mod resilience;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{ConfigError, GraderConfig, ProviderKind, SummaryMode};
pub use engine::{ScoredEvaluation, ScoringEngine};
pub use error::{ErrorStatus, GraderError};
pub use gateway::{GatewayError, GatewayResponse, LlmGateway, ProviderStatus};
pub use parser::{ParsedRubric, RubricParser};
pub use providers::{LlmProvider, ModelConfig, ProviderError, ProviderRegistry};
pub use repository::{
    ExtractionError, InMemoryRepository, PlainTextExtractor, RepositoryError, RubricRepository,
    TextExtractor,
};
pub use resilience::{LlmUsage, RetryPolicy};
pub use service::{DocumentEvaluation, GraderService, RubricSource, SavedRubric, StoredEvaluation};
