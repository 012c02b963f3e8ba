//! Score aggregation and templated feedback.
//!
//! Totals are a plain sum of criterion scores unless some criterion carries
//! a weight. In that case each criterion contributes `score / max_score * w`
//! and the weighted mean is rescaled onto the rubric total. This is the only
//! place weights are read.

use serde::{Deserialize, Serialize};

use crate::band::PerformanceBands;
use crate::rubric::Rubric;
use crate::scoring::CriterionScore;
use crate::{format_points, round2};

/// Share of a criterion's points at or above which it counts as a strength.
pub const STRENGTH_RATIO: f64 = 0.75;

/// Share of a criterion's points below which it counts as a development area.
pub const DEVELOPMENT_RATIO: f64 = 0.6;

/// Aggregated totals for one evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Aggregate {
    pub total_score: f64,
    pub max_total_score: f64,
    pub percent: f64,
    pub performance_band: String,
    /// Whether criterion weights were applied
    pub weighted: bool,
}

/// Narrative summary of an evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FeedbackSummary {
    pub summary: String,
    #[serde(default)]
    pub key_strengths: Vec<String>,
    #[serde(default)]
    pub areas_for_development: Vec<String>,
}

/// Aggregate criterion scores against a rubric snapshot.
pub fn aggregate(rubric: &Rubric, scores: &[CriterionScore], bands: &PerformanceBands) -> Aggregate {
    let max_total_score = denominator(rubric.max_total_score, scores);
    let (total_score, weighted) = total_score(scores, max_total_score);
    let percent = percent_of(total_score, max_total_score);
    Aggregate {
        total_score,
        max_total_score,
        percent,
        performance_band: bands.classify(percent).to_string(),
        weighted,
    }
}

/// Denominator for percentages: the rubric total, else the sum of criterion maxima.
pub fn denominator(rubric_total: f64, scores: &[CriterionScore]) -> f64 {
    if rubric_total > 0.0 {
        rubric_total
    } else {
        scores.iter().map(|s| s.max_score).sum()
    }
}

/// Total score, rounded to two decimals, and whether weights were applied.
pub fn total_score(scores: &[CriterionScore], max_total_score: f64) -> (f64, bool) {
    let plain: f64 = scores.iter().map(|s| s.score).sum();
    if scores.iter().all(|s| s.weight.is_none()) {
        return (round2(plain), false);
    }

    let weight_sum: f64 = scores.iter().map(|s| s.weight.unwrap_or(1.0)).sum();
    if weight_sum <= 0.0 {
        tracing::warn!("Criterion weights sum to zero; using unweighted total");
        return (round2(plain), false);
    }

    let weighted: f64 = scores
        .iter()
        .map(|s| s.ratio() * s.weight.unwrap_or(1.0))
        .sum();
    (round2(weighted / weight_sum * max_total_score), true)
}

/// Percentage of `total` over `max`, in `[0, 100]`; 0 when `max` is not positive.
pub fn percent_of(total: f64, max: f64) -> f64 {
    if max > 0.0 {
        (total / max * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Deterministic summary used when no model summary is available.
pub fn templated_summary(scores: &[CriterionScore], percent: f64, band: &str) -> FeedbackSummary {
    let mut parts = vec![format!("Overall performance is {:.1}% ({}).", percent, band)];

    let scorable: Vec<&CriterionScore> = scores.iter().filter(|s| s.max_score > 0.0).collect();
    let strongest = scorable
        .iter()
        .copied()
        .reduce(|best, s| if s.ratio() > best.ratio() { s } else { best });
    let weakest = scorable
        .iter()
        .copied()
        .reduce(|worst, s| if s.ratio() < worst.ratio() { s } else { worst });

    if let Some(top) = strongest {
        parts.push(format!("Strength: {} ({}).", top.criterion_name, fraction(top)));
    }
    if let (Some(top), Some(low)) = (strongest, weakest) {
        if top.criterion_id != low.criterion_id {
            parts.push(format!("Focus area: {} ({}).", low.criterion_name, fraction(low)));
        }
    }

    FeedbackSummary {
        summary: parts.join(" "),
        key_strengths: scorable
            .iter()
            .filter(|s| s.ratio() >= STRENGTH_RATIO)
            .map(|s| s.criterion_name.clone())
            .collect(),
        areas_for_development: scorable
            .iter()
            .filter(|s| s.ratio() < DEVELOPMENT_RATIO)
            .map(|s| s.criterion_name.clone())
            .collect(),
    }
}

fn fraction(score: &CriterionScore) -> String {
    format!("{}/{}", format_points(score.score), format_points(score.max_score))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rubric::normalize;
    use crate::scoring::ScoreStatus;
    use serde_json::json;

    fn record(id: &str, name: &str, score: f64, max: f64, weight: Option<f64>) -> CriterionScore {
        CriterionScore {
            criterion_id: id.to_string(),
            criterion_name: name.to_string(),
            score,
            max_score: max,
            weight,
            feedback: "ok".to_string(),
            evidence: None,
            evidence_verified: false,
            status: ScoreStatus::Scored,
        }
    }

    fn rubric(total: f64) -> Rubric {
        normalize(&json!({
            "title": "Empathy Rubric",
            "max_total_score": total,
            "criteria": [{"name": "A", "max_score": 5}, {"name": "B", "max_score": 5}]
        }))
    }

    #[test]
    fn test_plain_sum_and_band() {
        let scores = vec![record("C1", "A", 5.0, 5.0, None), record("C2", "B", 3.0, 5.0, None)];
        let agg = aggregate(&rubric(10.0), &scores, &PerformanceBands::default());
        assert_eq!(agg.total_score, 8.0);
        assert_eq!(agg.percent, 80.0);
        assert_eq!(agg.performance_band, "Proficient");
        assert!(!agg.weighted);
    }

    #[test]
    fn test_weighted_total_rescaled() {
        let scores = vec![
            record("C1", "A", 5.0, 5.0, Some(3.0)),
            record("C2", "B", 0.0, 5.0, None),
        ];
        // (1.0 * 3 + 0.0 * 1) / 4 * 10
        let (total, weighted) = total_score(&scores, 10.0);
        assert_eq!(total, 7.5);
        assert!(weighted);
    }

    #[test]
    fn test_zero_weights_fall_back_to_sum() {
        let scores = vec![
            record("C1", "A", 2.0, 5.0, Some(0.0)),
            record("C2", "B", 1.0, 5.0, Some(0.0)),
        ];
        assert_eq!(total_score(&scores, 10.0), (3.0, false));
    }

    #[test]
    fn test_denominator_fallbacks() {
        let scores = vec![record("C1", "A", 2.0, 4.0, None)];
        assert_eq!(denominator(0.0, &scores), 4.0);
        assert_eq!(denominator(10.0, &scores), 10.0);
        assert_eq!(percent_of(3.0, 0.0), 0.0);
    }

    #[test]
    fn test_templated_summary() {
        let scores = vec![
            record("C1", "Greeting", 5.0, 5.0, None),
            record("C2", "Listening", 2.5, 5.0, None),
        ];
        let summary = templated_summary(&scores, 75.0, "Proficient");
        assert_eq!(
            summary.summary,
            "Overall performance is 75.0% (Proficient). Strength: Greeting (5/5). Focus area: Listening (2.5/5)."
        );
        assert_eq!(summary.key_strengths, vec!["Greeting"]);
        assert_eq!(summary.areas_for_development, vec!["Listening"]);
    }

    #[test]
    fn test_templated_summary_single_criterion() {
        let scores = vec![record("C1", "Greeting", 1.0, 5.0, None)];
        let summary = templated_summary(&scores, 20.0, "Needs Improvement");
        assert!(summary.summary.contains("Strength: Greeting (1/5)."));
        assert!(!summary.summary.contains("Focus area"));
    }
}
