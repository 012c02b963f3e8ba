//! Evaluation records and explicit amendments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::aggregate::{denominator, percent_of, total_score, Aggregate, FeedbackSummary};
use crate::band::PerformanceBands;
use crate::rubric::{Rubric, RubricType};
use crate::scoring::{clamp_score, CriterionScore, ScoreStatus};

/// Repository identifier of a stored rubric.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct RubricId(pub u64);

/// Repository identifier of a stored evaluation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct EvaluationId(pub u64);

impl fmt::Display for RubricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for EvaluationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which rubric (and which version of its totals) an evaluation was scored against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RubricSnapshotRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rubric_id: Option<RubricId>,
    pub title: String,
    pub rubric_type: RubricType,
    pub max_total_score: f64,
}

impl RubricSnapshotRef {
    pub fn of(rubric: &Rubric, rubric_id: Option<RubricId>) -> Self {
        Self {
            rubric_id,
            title: rubric.title.clone(),
            rubric_type: rubric.rubric_type,
            max_total_score: rubric.max_total_score,
        }
    }
}

/// The result of scoring one transcript against one rubric snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Evaluation {
    pub rubric: RubricSnapshotRef,
    pub transcript_text: String,
    /// One entry per criterion, in rubric order
    pub criterion_scores: Vec<CriterionScore>,
    pub total_score: f64,
    pub max_total_score: f64,
    pub percent: f64,
    pub performance_band: String,
    pub feedback_summary: String,
    #[serde(default)]
    pub key_strengths: Vec<String>,
    #[serde(default)]
    pub areas_for_development: Vec<String>,
    #[serde(default)]
    pub share_with_student: bool,
    pub evaluated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amended_at: Option<DateTime<Utc>>,
}

impl Evaluation {
    /// Assemble an evaluation from already aggregated parts.
    pub fn assemble(
        rubric: RubricSnapshotRef,
        transcript_text: impl Into<String>,
        criterion_scores: Vec<CriterionScore>,
        aggregate: Aggregate,
        summary: FeedbackSummary,
        share_with_student: bool,
    ) -> Self {
        Self {
            rubric,
            transcript_text: transcript_text.into(),
            criterion_scores,
            total_score: aggregate.total_score,
            max_total_score: aggregate.max_total_score,
            percent: aggregate.percent,
            performance_band: aggregate.performance_band,
            feedback_summary: summary.summary,
            key_strengths: summary.key_strengths,
            areas_for_development: summary.areas_for_development,
            share_with_student,
            evaluated_at: Utc::now(),
            amended_at: None,
        }
    }

    /// Apply explicit score/feedback edits.
    ///
    /// Edited scores are re-clamped to the stored `max_score`. The total is
    /// recomputed from the edited scores unless an explicit total is given;
    /// percent and band always follow the new total.
    pub fn amend(
        &mut self,
        amendment: &EvaluationAmendment,
        bands: &PerformanceBands,
    ) -> Result<(), AmendError> {
        // Validate every reference before touching anything.
        let mut targets = Vec::with_capacity(amendment.criterion_scores.len());
        for edit in &amendment.criterion_scores {
            let idx = self
                .criterion_scores
                .iter()
                .position(|s| s.criterion_id == edit.criterion || s.criterion_name == edit.criterion)
                .ok_or_else(|| AmendError::UnknownCriterion(edit.criterion.clone()))?;
            targets.push(idx);
        }
        if let Some(total) = amendment.total_score {
            if !total.is_finite() || total < 0.0 {
                return Err(AmendError::InvalidTotal(total));
            }
        }

        for (edit, idx) in amendment.criterion_scores.iter().zip(targets) {
            let record = &mut self.criterion_scores[idx];
            if let Some(score) = edit.score {
                record.score = clamp_score(score, record.max_score);
                record.status = ScoreStatus::Amended;
            }
            if let Some(feedback) = edit.feedback.as_deref().map(str::trim) {
                if !feedback.is_empty() {
                    record.feedback = feedback.to_string();
                }
            }
        }

        let max_total = denominator(self.rubric.max_total_score, &self.criterion_scores);
        self.total_score = match amendment.total_score {
            Some(total) => total,
            None => total_score(&self.criterion_scores, max_total).0,
        };
        self.max_total_score = max_total;
        self.percent = percent_of(self.total_score, max_total);
        self.performance_band = bands.classify(self.percent).to_string();
        if let Some(share) = amendment.share_with_student {
            self.share_with_student = share;
        }
        self.amended_at = Some(Utc::now());
        Ok(())
    }
}

/// An edit to one criterion score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CriterionAmendment {
    /// Criterion id or name
    pub criterion: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub feedback: Option<String>,
}

/// Explicit edits to a stored evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EvaluationAmendment {
    #[serde(default)]
    pub criterion_scores: Vec<CriterionAmendment>,
    #[serde(default)]
    pub total_score: Option<f64>,
    #[serde(default)]
    pub share_with_student: Option<bool>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AmendError {
    #[error("Evaluation has no criterion '{0}'")]
    UnknownCriterion(String),

    #[error("Total score {0} is not a non-negative number")]
    InvalidTotal(f64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{aggregate, templated_summary};
    use crate::rubric::normalize;
    use serde_json::json;

    fn evaluation() -> Evaluation {
        let rubric = normalize(&json!({
            "title": "Empathy Rubric",
            "max_total_score": 10,
            "criteria": [{"name": "Greeting", "max_score": 5}, {"name": "Listening", "max_score": 5}]
        }));
        let scores = vec![
            CriterionScore::from_response(&rubric.criteria[0], &json!({"score": 4, "feedback": "Warm"}), ""),
            CriterionScore::from_response(&rubric.criteria[1], &json!({"score": 4, "feedback": "Attentive"}), ""),
        ];
        let bands = PerformanceBands::default();
        let agg = aggregate(&rubric, &scores, &bands);
        let summary = templated_summary(&scores, agg.percent, &agg.performance_band);
        Evaluation::assemble(
            RubricSnapshotRef::of(&rubric, Some(RubricId(7))),
            "Doctor: Hello.",
            scores,
            agg,
            summary,
            false,
        )
    }

    #[test]
    fn test_assemble() {
        let eval = evaluation();
        assert_eq!(eval.total_score, 8.0);
        assert_eq!(eval.performance_band, "Proficient");
        assert_eq!(eval.rubric.rubric_id, Some(RubricId(7)));
        assert!(eval.amended_at.is_none());
    }

    #[test]
    fn test_amend_recomputes_total_and_band() {
        let mut eval = evaluation();
        let amendment = EvaluationAmendment {
            criterion_scores: vec![CriterionAmendment {
                criterion: "Listening".to_string(),
                score: Some(9.0),
                feedback: Some("Excellent reflection".to_string()),
            }],
            ..Default::default()
        };
        eval.amend(&amendment, &PerformanceBands::default()).unwrap();

        let listening = &eval.criterion_scores[1];
        assert_eq!(listening.score, 5.0);
        assert_eq!(listening.status, ScoreStatus::Amended);
        assert_eq!(listening.feedback, "Excellent reflection");
        assert_eq!(eval.total_score, 9.0);
        assert_eq!(eval.performance_band, "Excellent");
        assert!(eval.amended_at.is_some());
    }

    #[test]
    fn test_amend_explicit_total_and_share() {
        let mut eval = evaluation();
        let amendment = EvaluationAmendment {
            total_score: Some(5.0),
            share_with_student: Some(true),
            ..Default::default()
        };
        eval.amend(&amendment, &PerformanceBands::default()).unwrap();
        assert_eq!(eval.total_score, 5.0);
        assert_eq!(eval.performance_band, "Needs Improvement");
        assert!(eval.share_with_student);
    }

    #[test]
    fn test_amend_unknown_criterion_leaves_evaluation_untouched() {
        let mut eval = evaluation();
        let before = eval.clone();
        let amendment = EvaluationAmendment {
            criterion_scores: vec![
                CriterionAmendment {
                    criterion: "C1".to_string(),
                    score: Some(0.0),
                    feedback: None,
                },
                CriterionAmendment {
                    criterion: "Closure".to_string(),
                    score: Some(1.0),
                    feedback: None,
                },
            ],
            ..Default::default()
        };
        let result = eval.amend(&amendment, &PerformanceBands::default());
        assert_eq!(result, Err(AmendError::UnknownCriterion("Closure".to_string())));
        assert_eq!(eval, before);
    }
}
