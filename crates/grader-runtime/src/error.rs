//! Surface errors for the grading runtime.
//!
//! Every terminal failure carries a [`ErrorStatus`] that tells the caller
//! whether the human user caused it (bad file, missing fields), whether the
//! provider did (worth retrying later) or whether the deployment is broken.

use grader_core::{AmendError, EvaluationId, RubricId};
use thiserror::Error;

use crate::config::ConfigError;
use crate::gateway::GatewayError;
use crate::repository::{ExtractionError, RepositoryError};

/// Who is responsible for a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStatus {
    /// The request itself was unusable
    Client,
    /// The LLM provider failed; retrying later may help
    Upstream,
    /// Configuration or storage problem
    Internal,
}

/// Errors returned by the parser, engine and service.
#[derive(Error, Debug)]
pub enum GraderError {
    #[error("Text extraction failed: {0}")]
    ExtractionFailed(#[from] ExtractionError),

    #[error("Rubric parsing failed: {0}")]
    RubricParsing(#[source] GatewayError),

    #[error("Scoring failed: {0}")]
    Scoring(#[source] GatewayError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Rubric {0} not found")]
    RubricNotFound(RubricId),

    #[error("Evaluation {0} not found")]
    EvaluationNotFound(EvaluationId),

    #[error("Amendment rejected: {0}")]
    Amendment(#[from] AmendError),

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl GraderError {
    pub fn status(&self) -> ErrorStatus {
        match self {
            GraderError::ExtractionFailed(_)
            | GraderError::InvalidInput(_)
            | GraderError::RubricNotFound(_)
            | GraderError::EvaluationNotFound(_)
            | GraderError::Amendment(_) => ErrorStatus::Client,
            GraderError::RubricParsing(e) | GraderError::Scoring(e) => match e {
                GatewayError::NotConfigured(_) | GatewayError::Rejected { .. } => {
                    ErrorStatus::Internal
                }
                GatewayError::ProviderUnavailable { .. }
                | GatewayError::SchemaViolation { .. }
                | GatewayError::EmptyResponse { .. } => ErrorStatus::Upstream,
            },
            GraderError::Repository(_) | GraderError::Config(_) => ErrorStatus::Internal,
        }
    }

    /// Stable message safe to show to an end user.
    pub fn user_message(&self) -> String {
        match self {
            GraderError::ExtractionFailed(_) => {
                "We could not read text from the uploaded document. Please upload a text-based PDF or paste the rubric text.".to_string()
            }
            GraderError::InvalidInput(message) => message.clone(),
            GraderError::RubricNotFound(id) => format!("Rubric {} does not exist.", id),
            GraderError::EvaluationNotFound(id) => format!("Evaluation {} does not exist.", id),
            GraderError::Amendment(e) => e.to_string(),
            GraderError::RubricParsing(GatewayError::NotConfigured(_))
            | GraderError::Scoring(GatewayError::NotConfigured(_)) => {
                "The selected language model provider is not configured.".to_string()
            }
            GraderError::RubricParsing(GatewayError::Rejected { .. })
            | GraderError::Scoring(GatewayError::Rejected { .. }) => {
                "The language model provider rejected the request. Please contact support.".to_string()
            }
            GraderError::RubricParsing(_) => {
                "The model could not produce a valid rubric from this document. Please try again or simplify the rubric.".to_string()
            }
            GraderError::Scoring(GatewayError::ProviderUnavailable { .. }) => {
                "The scoring provider is currently unavailable. Please try again in a few minutes.".to_string()
            }
            GraderError::Scoring(_) => {
                "The model did not return a usable score for this transcript. Please try again.".to_string()
            }
            GraderError::Repository(_) | GraderError::Config(_) => {
                "An internal error occurred while grading. Please contact support.".to_string()
            }
        }
    }
}

impl From<RepositoryError> for GraderError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::RubricNotFound(id) => GraderError::RubricNotFound(id),
            RepositoryError::EvaluationNotFound(id) => GraderError::EvaluationNotFound(id),
            RepositoryError::Storage(message) => GraderError::Repository(message),
        }
    }
}
