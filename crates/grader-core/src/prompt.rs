//! Per-criterion scoring prompts.
//!
//! Prompt construction is a pure function of the criterion, its rubric
//! context and the transcript. Preview prompts substitute
//! [`TRANSCRIPT_PLACEHOLDER`] and have no way to receive transcript text.

use crate::format_points;
use crate::rubric::{Criterion, ItemType, Rubric, RubricType};

/// Token standing in for the transcript in preview prompts.
pub const TRANSCRIPT_PLACEHOLDER: &str = "[Transcript will be inserted here]";

/// Rubric-level context shared by all criteria of one rubric.
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub rubric_title: &'a str,
    pub rubric_type: RubricType,
}

impl<'a> PromptContext<'a> {
    pub fn for_rubric(rubric: &'a Rubric) -> Self {
        Self {
            rubric_title: &rubric.title,
            rubric_type: rubric.rubric_type,
        }
    }
}

/// Build the scoring prompt for one criterion against a real transcript.
pub fn build_prompt(criterion: &Criterion, context: &PromptContext<'_>, transcript: &str) -> String {
    render(criterion, context, transcript.trim())
}

/// Build the prompt shown in parsing previews, with the transcript placeholder.
pub fn build_preview_prompt(criterion: &Criterion, context: &PromptContext<'_>) -> String {
    render(criterion, context, TRANSCRIPT_PLACEHOLDER)
}

fn render(criterion: &Criterion, context: &PromptContext<'_>, transcript: &str) -> String {
    let max = format_points(criterion.max_score);
    let description = if criterion.description.is_empty() {
        "(no description provided)"
    } else {
        criterion.description.as_str()
    };

    let mut prompt = String::new();
    prompt.push_str("You are an impartial assessor of clinical communication skills.\n");
    prompt.push_str("Score exactly one rubric criterion against the transcript below.\n\n");
    prompt.push_str("Rules:\n");
    prompt.push_str("- Score only this criterion; ignore every other aspect of the encounter.\n");
    prompt.push_str("- Do not invent or assume anything the transcript does not show.\n");
    prompt.push_str(&format!(
        "- The score must be a number between 0 and {} inclusive.\n",
        max
    ));
    prompt.push_str(
        "- Evidence must be a verbatim quotation from the transcript, or an empty string if there is none.\n\n",
    );

    prompt.push_str(&format!("Rubric: {}\n", context.rubric_title));
    prompt.push_str(&format!("Rubric type: {}\n", context.rubric_type));
    prompt.push_str(&format!("Criterion: {}\n", criterion.name));
    prompt.push_str(&format!("Description: {}\n", description));
    prompt.push_str(&format!("Maximum score: {}\n", max));

    let is_checklist = criterion.item_type == ItemType::Checklist
        || context.rubric_type == RubricType::Checklist;
    if is_checklist {
        let requirement = match criterion.checklist_required() {
            Some(true) => "required",
            _ => "optional",
        };
        prompt.push_str(&format!("Checklist requirement: {}\n", requirement));
    }

    let descriptors = criterion.single_point_descriptors();
    if !descriptors.is_empty() {
        prompt.push_str("\nSingle-point descriptors:\n");
        for (label, text) in descriptors {
            prompt.push_str(&format!("- {}: {}\n", label, text));
        }
    }

    let sub_criteria = criterion.sub_criteria();
    if !sub_criteria.is_empty() {
        prompt.push_str("\nChecklist items:\n");
        for (name, description) in sub_criteria {
            if description.is_empty() {
                prompt.push_str(&format!("- {}\n", name));
            } else {
                prompt.push_str(&format!("- {}: {}\n", name, description));
            }
        }
    }

    let levels = criterion.performance_levels();
    if !levels.is_empty() {
        prompt.push_str("\nScoring guidance:\n");
        for level in levels {
            let description = level.description.as_deref().unwrap_or("");
            match level.score {
                Some(score) => prompt.push_str(&format!(
                    "- Score {}: {} ({})\n",
                    format_points(score),
                    description,
                    level.label
                )),
                None => prompt.push_str(&format!("- {}: {}\n", level.label, description)),
            }
        }
    }

    prompt.push_str(
        "\nRespond with JSON only, using the keys \"score\" (number), \"feedback\" (string) and \"evidence\" (string).\n\n",
    );
    prompt.push_str(&format!("Transcript:\n{}\n", transcript));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rubric::normalize;
    use proptest::prelude::*;
    use serde_json::json;

    fn sample_rubric() -> Rubric {
        normalize(&json!({
            "title": "Empathy Rubric",
            "max_total_score": 10,
            "criteria": [
                {
                    "name": "Listening",
                    "description": "Reflects the patient's concerns",
                    "max_score": 5,
                    "performance_levels": [
                        {"label": "Strong", "score": 5, "description": "Summarizes accurately"},
                        {"label": "Weak", "score": 1, "description": "Interrupts"}
                    ]
                },
                {
                    "name": "Safety netting",
                    "item_type": "checklist",
                    "checklist_required": true,
                    "sub_criteria": [{"name": "Return precautions"}, {"name": "Follow-up", "description": "Books review"}]
                }
            ]
        }))
    }

    #[test]
    fn test_prompt_contains_criterion_fields() {
        let rubric = sample_rubric();
        let ctx = PromptContext::for_rubric(&rubric);
        let prompt = build_prompt(&rubric.criteria[0], &ctx, "Doctor: Hello.");

        assert!(prompt.contains("Rubric: Empathy Rubric"));
        assert!(prompt.contains("Criterion: Listening"));
        assert!(prompt.contains("Description: Reflects the patient's concerns"));
        assert!(prompt.contains("between 0 and 5 inclusive"));
        assert!(prompt.contains("- Score 5: Summarizes accurately (Strong)"));
        assert!(prompt.ends_with("Transcript:\nDoctor: Hello.\n"));
        assert!(!prompt.contains("Checklist requirement"));
    }

    #[test]
    fn test_checklist_prompt() {
        let rubric = sample_rubric();
        let ctx = PromptContext::for_rubric(&rubric);
        let prompt = build_preview_prompt(&rubric.criteria[1], &ctx);

        assert!(prompt.contains("Checklist requirement: required"));
        assert!(prompt.contains("- Return precautions\n"));
        assert!(prompt.contains("- Follow-up: Books review"));
        assert!(prompt.contains(TRANSCRIPT_PLACEHOLDER));
    }

    #[test]
    fn test_missing_description_marked() {
        let rubric = normalize(&json!({"criteria": [{"name": "Closure"}]}));
        let ctx = PromptContext::for_rubric(&rubric);
        let prompt = build_preview_prompt(&rubric.criteria[0], &ctx);
        assert!(prompt.contains("Description: (no description provided)"));
        assert!(prompt.contains("Maximum score: 1"));
    }

    proptest! {
        #[test]
        fn prop_prompt_is_deterministic(transcript in "[ -~\n]{0,200}") {
            let rubric = sample_rubric();
            let ctx = PromptContext::for_rubric(&rubric);
            for criterion in &rubric.criteria {
                prop_assert_eq!(
                    build_prompt(criterion, &ctx, &transcript),
                    build_prompt(criterion, &ctx, &transcript)
                );
            }
        }

        #[test]
        fn prop_preview_never_contains_transcript(secret in "TRANSCRIPT-[0-9a-f]{16}") {
            let rubric = sample_rubric();
            let ctx = PromptContext::for_rubric(&rubric);
            for criterion in &rubric.criteria {
                let real = build_prompt(criterion, &ctx, &secret);
                let preview = build_preview_prompt(criterion, &ctx);
                prop_assert!(real.contains(&secret));
                prop_assert!(!preview.contains(&secret));
                prop_assert!(preview.contains(TRANSCRIPT_PLACEHOLDER));
            }
        }
    }
}
