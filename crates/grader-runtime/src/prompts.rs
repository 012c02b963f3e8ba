//! System prompts and request text for the runtime's LLM calls.
//!
//! Criterion scoring prompts are built by `grader_core::build_prompt`; this
//! module only holds the pieces that exist because a provider is involved:
//! system instructions, the extraction request and the summary request.

use grader_core::{format_points, Aggregate, CriterionScore, ScoreStatus};

/// System instructions for rubric extraction.
pub const RUBRIC_EXTRACTION_SYSTEM: &str = "You are an assistant that converts free-form grading rubrics into structured JSON. \
Extract every criterion you can find without inventing extra ones. \
Only return valid JSON that matches the provided schema.";

/// System instructions for per-criterion scoring.
pub const SCORING_SYSTEM: &str = "You are an experienced assessor of communication skills in simulated patient interviews. \
You score one rubric criterion at a time against a consultation transcript. \
Base every judgement on what the transcript actually says and quote it verbatim as evidence. \
Only return valid JSON that matches the provided schema.";

/// System instructions for the evaluation summary.
pub const FEEDBACK_SUMMARY_SYSTEM: &str = "You write concise, constructive feedback for learners. \
Summarize the per-criterion results you are given without changing any score. \
Only return valid JSON that matches the provided schema.";

/// Request text for extracting a rubric from document text.
pub fn rubric_extraction_prompt(raw_text: &str) -> String {
    format!(
        "Convert the following rubric into JSON. \
Infer missing numeric maxima conservatively and never invent extra criteria.\n\n\
RUBRIC SOURCE:\n{}",
        raw_text.trim()
    )
}

/// Request text for the narrative summary.
///
/// Built only from scores and feedback; the transcript is not resent.
pub fn feedback_summary_prompt(
    rubric_title: &str,
    scores: &[CriterionScore],
    aggregate: &Aggregate,
) -> String {
    let mut prompt = format!(
        "Rubric: {}\nOverall: {} / {} ({:.1}%, {})\n\nCriterion results:\n",
        rubric_title,
        format_points(aggregate.total_score),
        format_points(aggregate.max_total_score),
        aggregate.percent,
        aggregate.performance_band,
    );

    for score in scores {
        let note = match score.status {
            ScoreStatus::Unavailable => " [not scored]",
            ScoreStatus::Malformed => " [unreadable score]",
            _ => "",
        };
        prompt.push_str(&format!(
            "- {}: {} / {}{}\n  Feedback: {}\n",
            score.criterion_name,
            format_points(score.score),
            format_points(score.max_score),
            note,
            score.feedback,
        ));
    }

    prompt.push_str(
        "\nWrite a short overall summary (3-5 sentences), list the criteria that were clear strengths \
and the criteria that most need development. Respond with JSON: \
{\"summary\": string, \"key_strengths\": [string], \"areas_for_development\": [string]}.",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use grader_core::{aggregate, normalize, PerformanceBands};
    use serde_json::json;

    #[test]
    fn test_extraction_prompt_trims_source() {
        let prompt = rubric_extraction_prompt("\n\n  Greeting (5 pts)\n");
        assert!(prompt.starts_with("Convert the following rubric into JSON."));
        assert!(prompt.ends_with("RUBRIC SOURCE:\nGreeting (5 pts)"));
    }

    #[test]
    fn test_summary_prompt_lists_scores_without_transcript() {
        let rubric = normalize(&json!({
            "title": "Empathy Rubric",
            "max_total_score": 10,
            "criteria": [{"name": "Greeting", "max_score": 5}, {"name": "Listening", "max_score": 5}]
        }));
        let transcript = "Doctor: Good morning, what brings you in?";
        let scores = vec![
            CriterionScore::from_response(
                &rubric.criteria[0],
                &json!({"score": 5, "feedback": "Warm welcome"}),
                transcript,
            ),
            CriterionScore::unavailable(&rubric.criteria[1]),
        ];
        let totals = aggregate(&rubric, &scores, &PerformanceBands::default());
        let prompt = feedback_summary_prompt(&rubric.title, &scores, &totals);

        assert!(prompt.contains("Rubric: Empathy Rubric"));
        assert!(prompt.contains("Overall: 5 / 10 (50.0%, Needs Improvement)"));
        assert!(prompt.contains("- Greeting: 5 / 5\n  Feedback: Warm welcome"));
        assert!(prompt.contains("- Listening: 0 / 5 [not scored]"));
        assert!(!prompt.contains(transcript));
    }
}
