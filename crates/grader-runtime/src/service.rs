//! Service facade over parsing, scoring and persistence.
//!
//! This is the surface the surrounding system (HTTP layer, CLI) talks to.
//! Evaluations are persisted only once scoring has fully completed, so a
//! half-finished evaluation is never visible in the repository.

use grader_core::{
    normalize_rubric, Evaluation, EvaluationAmendment, EvaluationId, ParsingPreview, Rubric,
    RubricId,
};
use serde::Serialize;
use std::sync::Arc;

use crate::config::{GraderConfig, ProviderKind};
use crate::engine::ScoringEngine;
use crate::error::GraderError;
use crate::gateway::{LlmGateway, ProviderStatus};
use crate::parser::{ParsedRubric, RubricParser};
use crate::providers::ProviderRegistry;
use crate::repository::{RubricRepository, TextExtractor};
use crate::resilience::LlmUsage;

/// Which rubric a transcript is scored against.
#[derive(Debug, Clone)]
pub enum RubricSource {
    /// A rubric already in the repository
    Stored(RubricId),
    /// An ad-hoc rubric; normalized before use and not persisted
    Inline(Rubric),
}

/// A persisted rubric.
#[derive(Debug, Clone, Serialize)]
pub struct SavedRubric {
    pub id: RubricId,
    pub rubric: Rubric,
}

/// A persisted evaluation and what it cost.
#[derive(Debug, Clone, Serialize)]
pub struct StoredEvaluation {
    pub id: EvaluationId,
    pub evaluation: Evaluation,
    pub usage: LlmUsage,
}

/// Result of the combined document-plus-transcript flow.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentEvaluation {
    pub rubric_id: RubricId,
    pub rubric: Rubric,
    pub preview: ParsingPreview,
    pub evaluation_id: EvaluationId,
    pub evaluation: Evaluation,
    pub usage: LlmUsage,
}

pub struct GraderService {
    config: Arc<GraderConfig>,
    gateway: Arc<LlmGateway>,
    parser: RubricParser,
    engine: ScoringEngine,
    repository: Arc<dyn RubricRepository>,
    extractor: Arc<dyn TextExtractor>,
}

impl GraderService {
    pub fn new(
        config: GraderConfig,
        gateway: LlmGateway,
        repository: Arc<dyn RubricRepository>,
        extractor: Arc<dyn TextExtractor>,
    ) -> Self {
        let config = Arc::new(config);
        let gateway = Arc::new(gateway);
        Self {
            parser: RubricParser::new(gateway.clone(), config.clone()),
            engine: ScoringEngine::new(gateway.clone(), config.clone()),
            gateway,
            config,
            repository,
            extractor,
        }
    }

    /// Build a service whose gateway holds every compiled-in provider the config can satisfy.
    pub fn from_config(
        config: GraderConfig,
        repository: Arc<dyn RubricRepository>,
        extractor: Arc<dyn TextExtractor>,
    ) -> Self {
        let gateway = LlmGateway::from_config(&config, &ProviderRegistry::with_defaults());
        Self::new(config, gateway, repository, extractor)
    }

    pub fn config(&self) -> &GraderConfig {
        &self.config
    }

    /// Configuration and health of every provider kind in this build.
    pub async fn provider_status(&self) -> Vec<ProviderStatus> {
        self.gateway
            .provider_status(&ProviderRegistry::with_defaults())
            .await
    }

    fn provider(&self, requested: Option<ProviderKind>) -> ProviderKind {
        requested.unwrap_or(self.config.llm_provider)
    }

    /// Extract a rubric from text. Nothing is persisted.
    pub async fn parse_rubric(
        &self,
        raw_text: &str,
        provider: Option<ProviderKind>,
    ) -> Result<ParsedRubric, GraderError> {
        self.parser.parse_rubric(raw_text, self.provider(provider)).await
    }

    /// Extract a rubric from an uploaded document. Extraction failures are not retried.
    pub async fn parse_rubric_document(
        &self,
        document: &[u8],
        provider: Option<ProviderKind>,
    ) -> Result<ParsedRubric, GraderError> {
        let text = self.extractor.extract_text(document).map_err(|e| {
            tracing::warn!(error = %e, document_bytes = document.len(), "Document text extraction failed");
            GraderError::ExtractionFailed(e)
        })?;
        self.parse_rubric(&text, provider).await
    }

    /// Normalize (same rules as parsing) and persist a rubric.
    pub fn save_rubric(&self, rubric: &Rubric) -> Result<SavedRubric, GraderError> {
        let rubric = normalize_rubric(rubric);
        let id = self.repository.persist_rubric(&rubric)?;
        tracing::info!(rubric_id = %id, criteria = rubric.criteria.len(), "Rubric saved");
        Ok(SavedRubric { id, rubric })
    }

    /// Normalize and replace a stored rubric. Past evaluations are unaffected.
    pub fn update_rubric(&self, id: RubricId, rubric: &Rubric) -> Result<Rubric, GraderError> {
        let rubric = normalize_rubric(rubric);
        self.repository.update_rubric(id, &rubric)?;
        tracing::info!(rubric_id = %id, criteria = rubric.criteria.len(), "Rubric updated");
        Ok(rubric)
    }

    pub fn load_rubric(&self, id: RubricId) -> Result<Rubric, GraderError> {
        Ok(self.repository.load_rubric(id)?)
    }

    pub fn load_evaluation(&self, id: EvaluationId) -> Result<Evaluation, GraderError> {
        Ok(self.repository.load_evaluation(id)?)
    }

    /// Score a transcript and persist the completed evaluation.
    pub async fn score_transcript(
        &self,
        source: RubricSource,
        transcript: &str,
        provider: Option<ProviderKind>,
        share_with_student: bool,
    ) -> Result<StoredEvaluation, GraderError> {
        let (rubric, rubric_id) = match source {
            RubricSource::Stored(id) => (self.repository.load_rubric(id)?, Some(id)),
            RubricSource::Inline(rubric) => (normalize_rubric(&rubric), None),
        };
        self.score_and_persist(&rubric, rubric_id, transcript, self.provider(provider), share_with_student)
            .await
    }

    async fn score_and_persist(
        &self,
        rubric: &Rubric,
        rubric_id: Option<RubricId>,
        transcript: &str,
        provider: ProviderKind,
        share_with_student: bool,
    ) -> Result<StoredEvaluation, GraderError> {
        let scored = self.engine.score_criteria(rubric, transcript, provider).await?;

        let mut evaluation = scored.evaluation;
        evaluation.rubric.rubric_id = rubric_id;
        evaluation.share_with_student = share_with_student;

        let id = self.repository.persist_evaluation(&evaluation)?;
        tracing::info!(
            evaluation_id = %id,
            rubric_id = ?rubric_id.map(|r| r.0),
            llm_calls = scored.usage.llm_calls,
            estimated_cost = scored.usage.estimated_cost,
            "Evaluation stored"
        );

        Ok(StoredEvaluation {
            id,
            evaluation,
            usage: scored.usage,
        })
    }

    /// Apply explicit edits to a stored evaluation.
    pub fn amend_evaluation(
        &self,
        id: EvaluationId,
        amendment: &EvaluationAmendment,
    ) -> Result<Evaluation, GraderError> {
        let mut evaluation = self.repository.load_evaluation(id)?;
        evaluation.amend(amendment, &self.config.performance_band_boundaries)?;
        self.repository.update_evaluation(id, &evaluation)?;
        tracing::info!(
            evaluation_id = %id,
            edits = amendment.criterion_scores.len(),
            total_score = evaluation.total_score,
            band = %evaluation.performance_band,
            "Evaluation amended"
        );
        Ok(evaluation)
    }

    /// Parse a rubric document, store it, then score and store a transcript against it.
    pub async fn evaluate_with_rubric_document(
        &self,
        document: &[u8],
        transcript: &str,
        provider: Option<ProviderKind>,
        share_with_student: bool,
    ) -> Result<DocumentEvaluation, GraderError> {
        if transcript.trim().is_empty() {
            return Err(GraderError::InvalidInput("Transcript text is empty".to_string()));
        }
        let provider = self.provider(provider);

        let parsed = self.parse_rubric_document(document, Some(provider)).await?;
        let rubric_id = self.repository.persist_rubric(&parsed.rubric)?;

        let stored = self
            .score_and_persist(&parsed.rubric, Some(rubric_id), transcript, provider, share_with_student)
            .await?;

        let mut usage = parsed.usage;
        usage.merge(&stored.usage);

        Ok(DocumentEvaluation {
            rubric_id,
            rubric: parsed.rubric,
            preview: parsed.preview,
            evaluation_id: stored.id,
            evaluation: stored.evaluation,
            usage,
        })
    }
}

impl std::fmt::Debug for GraderService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraderService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{ExtractionError, InMemoryRepository, PlainTextExtractor};
    use crate::resilience::RetryPolicy;
    use crate::testing::{Reply, ScriptedProvider};
    use crate::config::SummaryMode;
    use grader_core::{normalize, CriterionAmendment, SchemaKind, ScoreStatus, TRANSCRIPT_PLACEHOLDER};
    use serde_json::json;
    use std::time::Duration;

    const TRANSCRIPT: &str = "Doctor: Hello, I'm Dr. Patel. How can I help?\nPatient: My knee hurts.";

    fn service(provider: ScriptedProvider) -> (GraderService, Arc<ScriptedProvider>, Arc<InMemoryRepository>) {
        let provider = Arc::new(provider);
        let repository = Arc::new(InMemoryRepository::new());
        let retry = RetryPolicy {
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(10),
            ..Default::default()
        };
        let gateway = LlmGateway::new(retry).with_provider(ProviderKind::OpenAi, provider.clone());
        let config = GraderConfig {
            summary_mode: SummaryMode::Templated,
            ..Default::default()
        };
        let service = GraderService::new(config, gateway, repository.clone(), Arc::new(PlainTextExtractor));
        (service, provider, repository)
    }

    fn rubric() -> Rubric {
        normalize(&json!({
            "title": "Empathy Rubric",
            "max_total_score": 10,
            "criteria": [{"name": "Greeting"}, {"name": "Listening", "max_score": 5}]
        }))
    }

    fn scoring(score: f64) -> ScriptedProvider {
        ScriptedProvider::new("openai").with_reply(
            SchemaKind::CriterionScoring,
            Reply::Json(json!({"score": score, "feedback": "Observed"})),
        )
    }

    #[test]
    fn test_save_rubric_normalizes() {
        let (service, _, repository) = service(ScriptedProvider::new("openai"));
        let mut raw = rubric();
        raw.criteria[0].max_score = 0.0;
        raw.criteria.push(raw.criteria[1].clone());

        let saved = service.save_rubric(&raw).unwrap();
        assert_eq!(saved.rubric.criteria[2].name, "Listening (2)");
        assert_eq!(repository.load_rubric(saved.id).unwrap(), saved.rubric);
    }

    #[tokio::test(start_paused = true)]
    async fn test_score_stored_rubric() {
        let (service, _, repository) = service(scoring(4.0));
        let saved = service.save_rubric(&rubric()).unwrap();

        let stored = service
            .score_transcript(RubricSource::Stored(saved.id), TRANSCRIPT, None, true)
            .await
            .unwrap();

        assert_eq!(stored.evaluation.rubric.rubric_id, Some(saved.id));
        assert!(stored.evaluation.share_with_student);
        assert_eq!(stored.evaluation.total_score, 8.0);
        assert_eq!(stored.evaluation.performance_band, "Proficient");
        assert_eq!(repository.load_evaluation(stored.id).unwrap(), stored.evaluation);
        assert_eq!(stored.usage.llm_calls, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_score_inline_rubric_not_persisted() {
        let (service, _, repository) = service(scoring(5.0));
        let stored = service
            .score_transcript(RubricSource::Inline(rubric()), TRANSCRIPT, Some(ProviderKind::OpenAi), false)
            .await
            .unwrap();

        assert_eq!(stored.evaluation.rubric.rubric_id, None);
        assert_eq!(repository.rubric_count(), 0);
        assert_eq!(repository.evaluation_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_rubric() {
        let (service, provider, _) = service(scoring(5.0));
        let err = service
            .score_transcript(RubricSource::Stored(RubricId(42)), TRANSCRIPT, None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, GraderError::RubricNotFound(RubricId(42))));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_evaluation_not_persisted() {
        let provider = ScriptedProvider::new("openai").with_reply(SchemaKind::CriterionScoring, Reply::Http);
        let (service, _, repository) = service(provider);

        let err = service
            .score_transcript(RubricSource::Inline(rubric()), TRANSCRIPT, None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, GraderError::Scoring(_)));
        assert_eq!(repository.evaluation_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_amend_evaluation() {
        let (service, _, _) = service(scoring(2.5));
        let stored = service
            .score_transcript(RubricSource::Inline(rubric()), TRANSCRIPT, None, false)
            .await
            .unwrap();
        assert_eq!(stored.evaluation.performance_band, "Needs Improvement");

        let amendment = EvaluationAmendment {
            criterion_scores: vec![CriterionAmendment {
                criterion: "Greeting".to_string(),
                score: Some(9.0),
                feedback: Some("Reviewed by faculty".to_string()),
            }],
            share_with_student: Some(true),
            ..Default::default()
        };
        let amended = service.amend_evaluation(stored.id, &amendment).unwrap();

        assert_eq!(amended.criterion_scores[0].score, 5.0);
        assert_eq!(amended.criterion_scores[0].status, ScoreStatus::Amended);
        assert_eq!(amended.total_score, 7.5);
        assert_eq!(amended.performance_band, "Proficient");
        assert!(amended.share_with_student);
        assert_eq!(service.load_evaluation(stored.id).unwrap(), amended);

        let bad = EvaluationAmendment {
            criterion_scores: vec![CriterionAmendment {
                criterion: "Closure".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let err = service.amend_evaluation(stored.id, &bad).unwrap_err();
        assert!(matches!(err, GraderError::Amendment(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rubric_update_leaves_past_evaluations() {
        let (service, _, _) = service(scoring(5.0));
        let saved = service.save_rubric(&rubric()).unwrap();
        let stored = service
            .score_transcript(RubricSource::Stored(saved.id), TRANSCRIPT, None, false)
            .await
            .unwrap();

        let mut edited = saved.rubric.clone();
        edited.max_total_score = 20.0;
        edited.criteria[0].max_score = 15.0;
        service.update_rubric(saved.id, &edited).unwrap();

        let past = service.load_evaluation(stored.id).unwrap();
        assert_eq!(past.max_total_score, 10.0);
        assert_eq!(past.criterion_scores[0].max_score, 5.0);
    }

    #[tokio::test]
    async fn test_unreadable_document() {
        let (service, provider, _) = service(ScriptedProvider::new("openai"));
        let err = service
            .parse_rubric_document(&[0xff, 0xfe, 0x00], None)
            .await
            .unwrap_err();
        assert!(matches!(err, GraderError::ExtractionFailed(ExtractionError::NotText)));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evaluate_with_rubric_document() {
        let provider = scoring(5.0).with_reply(
            SchemaKind::RubricExtraction,
            Reply::Json(json!({
                "rubric_title": "Empathy Rubric",
                "rubric_summary": "Bedside manner",
                "rubric_type": "analytic",
                "max_total_score": 10,
                "criteria": [{"name": "Greeting"}, {"name": "Listening", "max_score": 5}],
                "holistic_levels": []
            })),
        );
        let (service, _, repository) = service(provider);

        let result = service
            .evaluate_with_rubric_document(b"Greeting\nListening (5)", TRANSCRIPT, None, true)
            .await
            .unwrap();

        assert_eq!(result.evaluation.total_score, 10.0);
        assert_eq!(result.evaluation.rubric.rubric_id, Some(result.rubric_id));
        assert_eq!(repository.rubric_count(), 1);
        assert_eq!(repository.evaluation_count(), 1);
        assert_eq!(result.usage.llm_calls, 3);

        let preview = serde_json::to_string(&result.preview).unwrap();
        assert!(preview.contains(TRANSCRIPT_PLACEHOLDER));
        assert!(!preview.contains("Dr. Patel"));
    }

    #[tokio::test]
    async fn test_combined_flow_requires_transcript() {
        let (service, provider, repository) = service(ScriptedProvider::new("openai"));
        let err = service
            .evaluate_with_rubric_document(b"Greeting", " ", None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, GraderError::InvalidInput(_)));
        assert_eq!(provider.calls(), 0);
        assert_eq!(repository.rubric_count(), 0);
    }

    #[tokio::test]
    async fn test_provider_status_lists_configured_provider() {
        let (service, _, _) = service(ScriptedProvider::new("openai"));
        let statuses = service.provider_status().await;

        let openai = statuses
            .iter()
            .find(|s| s.provider == ProviderKind::OpenAi)
            .unwrap();
        assert!(openai.configured);
        assert!(openai.healthy);
        let anthropic = statuses
            .iter()
            .find(|s| s.provider == ProviderKind::Anthropic)
            .unwrap();
        assert!(!anthropic.configured);
    }
}
