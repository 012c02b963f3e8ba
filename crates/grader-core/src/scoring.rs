//! Per-criterion score validation.
//!
//! Model responses drift: scores arrive as numbers, numeric strings, out of
//! range, or not at all. [`interpret_score`] turns one scoring response into
//! a bounded [`ValidatedScore`]; only a present but non-numeric score is an
//! error, and that error is scoped to the single criterion.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::evidence::quote_appears_in;
use crate::rubric::coerce::coerce_number;
use crate::rubric::Criterion;

/// Feedback used when the model returns none.
pub const NO_FEEDBACK: &str = "No feedback provided";

/// Feedback used when a criterion could not be scored by the provider.
pub const SCORING_UNAVAILABLE: &str = "Scoring unavailable";

/// Feedback used when the provider's score could not be read.
pub const SCORING_MALFORMED: &str = "Score could not be read from the model response";

/// Errors scoped to a single criterion.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoreError {
    #[error("Score for criterion '{criterion}' is not numeric: {raw}")]
    Malformed { criterion: String, raw: String },
}

/// How a criterion score was obtained.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScoreStatus {
    #[default]
    Scored,
    Malformed,
    Unavailable,
    Amended,
}

/// A score read from one provider response, already clamped.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedScore {
    pub score: f64,
    /// The unclamped value, when it differed from `score`
    pub clamped_from: Option<f64>,
    pub feedback: String,
    pub evidence: Option<String>,
}

/// Read and bound the score in a criterion scoring response.
///
/// Accepts `{score, feedback, evidence}` as well as the older
/// `{evaluation: {score, justification}}` shape.
pub fn interpret_score(response: &JsonValue, criterion: &Criterion) -> Result<ValidatedScore, ScoreError> {
    let body = response
        .get("evaluation")
        .filter(|v| v.is_object())
        .unwrap_or(response);

    let raw = match body.get("score") {
        None | Some(JsonValue::Null) => 0.0,
        Some(value) => coerce_number(value).ok_or_else(|| ScoreError::Malformed {
            criterion: criterion.name.clone(),
            raw: value.to_string(),
        })?,
    };

    let score = clamp_score(raw, criterion.max_score);
    let clamped_from = (score != raw).then_some(raw);
    if let Some(raw) = clamped_from {
        tracing::warn!(
            criterion = %criterion.name,
            raw,
            clamped = score,
            max_score = criterion.max_score,
            "Clamped out-of-range score"
        );
    }

    let feedback = ["feedback", "justification"]
        .iter()
        .find_map(|key| {
            let text = body.get(*key)?.as_str()?.trim();
            (!text.is_empty()).then(|| text.to_string())
        })
        .unwrap_or_else(|| NO_FEEDBACK.to_string());

    let evidence = body
        .get("evidence")
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string);

    Ok(ValidatedScore {
        score,
        clamped_from,
        feedback,
        evidence,
    })
}

/// Bound a raw score into `[0, max_score]`; non-finite values become 0.
pub fn clamp_score(raw: f64, max_score: f64) -> f64 {
    if !raw.is_finite() {
        return 0.0;
    }
    raw.clamp(0.0, max_score.max(0.0))
}

/// The score recorded for one criterion of an evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CriterionScore {
    /// Criterion id at scoring time
    pub criterion_id: String,

    /// Criterion name at scoring time
    pub criterion_name: String,

    pub score: f64,

    /// Copied from the criterion so later rubric edits do not change past results
    pub max_score: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,

    pub feedback: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,

    /// Whether `evidence` occurs in the transcript
    #[serde(default)]
    pub evidence_verified: bool,

    #[serde(default)]
    pub status: ScoreStatus,
}

impl CriterionScore {
    fn base(criterion: &Criterion, score: f64, feedback: String, status: ScoreStatus) -> Self {
        Self {
            criterion_id: criterion.reference().to_string(),
            criterion_name: criterion.name.clone(),
            score,
            max_score: criterion.max_score,
            weight: criterion.weight,
            feedback,
            evidence: None,
            evidence_verified: false,
            status,
        }
    }

    /// Build a score from a validated response, verifying evidence against the transcript.
    pub fn from_validated(criterion: &Criterion, validated: ValidatedScore, transcript: &str) -> Self {
        let evidence_verified = validated
            .evidence
            .as_deref()
            .map(|quote| quote_appears_in(transcript, quote))
            .unwrap_or(false);
        Self {
            evidence: validated.evidence,
            evidence_verified,
            ..Self::base(criterion, validated.score, validated.feedback, ScoreStatus::Scored)
        }
    }

    /// Interpret a provider response; malformed scores degrade to a zero record.
    pub fn from_response(criterion: &Criterion, response: &JsonValue, transcript: &str) -> Self {
        match interpret_score(response, criterion) {
            Ok(validated) => Self::from_validated(criterion, validated, transcript),
            Err(e) => {
                tracing::warn!(error = %e, "Degrading malformed criterion score to zero");
                Self::malformed(criterion)
            }
        }
    }

    pub fn malformed(criterion: &Criterion) -> Self {
        Self::base(criterion, 0.0, SCORING_MALFORMED.to_string(), ScoreStatus::Malformed)
    }

    pub fn unavailable(criterion: &Criterion) -> Self {
        Self::base(criterion, 0.0, SCORING_UNAVAILABLE.to_string(), ScoreStatus::Unavailable)
    }

    /// Fraction of the available points earned (0 when nothing was available).
    pub fn ratio(&self) -> f64 {
        if self.max_score > 0.0 {
            self.score / self.max_score
        } else {
            0.0
        }
    }
}
