//! Scoring engine: one transcript against one rubric snapshot.
//!
//! # Execution Flow
//! 1. Fan-out: one gateway call per criterion, at most `max_concurrency` in flight
//! 2. Fan-in: reassemble results in rubric order
//! 3. Degrade failed criteria to zero; abort only when every criterion failed
//! 4. Aggregate totals and classify the performance band
//! 5. Summarize (model or template); a failed summary never fails the evaluation

use futures::stream::{self, StreamExt};
use grader_core::{
    aggregate, build_prompt, templated_summary, Aggregate, CriterionScore, Evaluation,
    FeedbackSummary, PromptContext, Rubric, RubricSnapshotRef, SchemaKind,
};
use std::sync::Arc;

use crate::config::{GraderConfig, ProviderKind, SummaryMode};
use crate::error::GraderError;
use crate::gateway::LlmGateway;
use crate::prompts::{feedback_summary_prompt, FEEDBACK_SUMMARY_SYSTEM, SCORING_SYSTEM};
use crate::resilience::{LlmUsage, UsageTracker};

/// An evaluation plus the provider usage it cost.
#[derive(Debug, Clone)]
pub struct ScoredEvaluation {
    pub evaluation: Evaluation,
    pub usage: LlmUsage,
}

/// Scores transcripts criterion by criterion through the gateway.
pub struct ScoringEngine {
    gateway: Arc<LlmGateway>,
    config: Arc<GraderConfig>,
}

impl ScoringEngine {
    pub fn new(gateway: Arc<LlmGateway>, config: Arc<GraderConfig>) -> Self {
        Self { gateway, config }
    }

    /// Score every criterion of `rubric` against `transcript`.
    ///
    /// The returned evaluation is not yet linked to a stored rubric and is
    /// not shared with the student; the caller decides both.
    pub async fn score_criteria(
        &self,
        rubric: &Rubric,
        transcript: &str,
        provider: ProviderKind,
    ) -> Result<ScoredEvaluation, GraderError> {
        if transcript.trim().is_empty() {
            return Err(GraderError::InvalidInput("Transcript text is empty".to_string()));
        }
        if rubric.criteria.is_empty() {
            return Err(GraderError::InvalidInput(
                "Rubric has no criteria to score".to_string(),
            ));
        }

        tracing::info!(
            provider = %provider,
            rubric = %rubric.title,
            criteria = rubric.criteria.len(),
            transcript_chars = transcript.len(),
            "Scoring transcript"
        );

        let context = PromptContext::for_rubric(rubric);
        let model = &self.config.model_config(provider);
        let usage = UsageTracker::new();

        let mut outcomes: Vec<_> = stream::iter(rubric.criteria.iter().enumerate())
            .map(|(idx, criterion)| {
                let prompt = build_prompt(criterion, &context, transcript);
                async move {
                    let result = self
                        .gateway
                        .request(provider, SchemaKind::CriterionScoring, SCORING_SYSTEM, &prompt, model)
                        .await;
                    (idx, result)
                }
            })
            .buffer_unordered(self.config.max_concurrency.max(1))
            .collect()
            .await;
        outcomes.sort_by_key(|(idx, _)| *idx);

        let mut first_error = None;
        let mut scored = 0usize;
        let mut scores = Vec::with_capacity(outcomes.len());
        for ((_, outcome), criterion) in outcomes.into_iter().zip(&rubric.criteria) {
            match outcome {
                Ok(response) => {
                    usage.record(&response.usage);
                    scored += 1;
                    let score = CriterionScore::from_response(criterion, &response.value, transcript);
                    tracing::debug!(
                        criterion = %criterion.name,
                        score = score.score,
                        max_score = score.max_score,
                        evidence_verified = score.evidence_verified,
                        "Criterion scored"
                    );
                    scores.push(score);
                }
                Err(e) => {
                    tracing::warn!(
                        criterion = %criterion.name,
                        error = %e,
                        "Criterion scoring failed; recording zero"
                    );
                    first_error.get_or_insert(e);
                    scores.push(CriterionScore::unavailable(criterion));
                }
            }
        }

        if scored == 0 {
            if let Some(e) = first_error {
                return Err(GraderError::Scoring(e));
            }
        }

        let totals = aggregate(rubric, &scores, &self.config.performance_band_boundaries);
        let summary = self.summarize(rubric, &scores, &totals, provider, &usage).await;

        tracing::info!(
            provider = %provider,
            rubric = %rubric.title,
            total_score = totals.total_score,
            max_total_score = totals.max_total_score,
            band = %totals.performance_band,
            failed_criteria = scores.len() - scored,
            "Evaluation completed"
        );

        let evaluation = Evaluation::assemble(
            RubricSnapshotRef::of(rubric, None),
            transcript,
            scores,
            totals,
            summary,
            false,
        );

        Ok(ScoredEvaluation {
            evaluation,
            usage: usage.snapshot(),
        })
    }

    async fn summarize(
        &self,
        rubric: &Rubric,
        scores: &[CriterionScore],
        totals: &Aggregate,
        provider: ProviderKind,
        usage: &UsageTracker,
    ) -> FeedbackSummary {
        let fallback = || templated_summary(scores, totals.percent, &totals.performance_band);

        if self.config.summary_mode == SummaryMode::Templated {
            return fallback();
        }

        let response = self
            .gateway
            .request(
                provider,
                SchemaKind::FeedbackSummary,
                FEEDBACK_SUMMARY_SYSTEM,
                &feedback_summary_prompt(&rubric.title, scores, totals),
                &self.config.summary_model_config(provider),
            )
            .await;

        match response {
            Ok(response) => {
                usage.record(&response.usage);
                match serde_json::from_value::<FeedbackSummary>(response.value) {
                    Ok(summary) if !summary.summary.trim().is_empty() => tidy(summary),
                    _ => {
                        tracing::warn!("Summary response unusable; using templated summary");
                        fallback()
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Summary generation failed; using templated summary");
                fallback()
            }
        }
    }
}

fn tidy(summary: FeedbackSummary) -> FeedbackSummary {
    let clean = |items: Vec<String>| -> Vec<String> {
        items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    };
    FeedbackSummary {
        summary: summary.summary.trim().to_string(),
        key_strengths: clean(summary.key_strengths),
        areas_for_development: clean(summary.areas_for_development),
    }
}
