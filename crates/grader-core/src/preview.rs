//! Parsing previews.
//!
//! A preview shows a reviewer what extraction produced and what the model
//! will be asked per criterion. It is built from the rubric alone, so
//! transcript text cannot leak into it.

use serde::{Deserialize, Serialize};

use crate::format_points;
use crate::prompt::{build_preview_prompt, PromptContext};
use crate::rubric::{ItemType, Metadata, Rubric, RubricType};

/// One criterion as shown in a preview.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CriterionPreview {
    pub id: String,
    pub name: String,
    pub description: String,
    pub item_type: ItemType,
    pub max_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// A sample scoring prompt with the transcript placeholder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratedPrompt {
    pub criterion_name: String,
    pub prompt_text: String,
}

/// Human-readable summary of a parsed rubric.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParsingPreview {
    pub extraction_summary: String,
    pub items_extracted: usize,
    pub rubric_title: String,
    pub rubric_type: RubricType,
    pub max_total_score: f64,
    pub criteria_names: Vec<String>,
    pub criteria: Vec<CriterionPreview>,
    pub generated_prompts: Vec<GeneratedPrompt>,
}

impl ParsingPreview {
    pub fn build(rubric: &Rubric) -> Self {
        let context = PromptContext::for_rubric(rubric);

        let criteria: Vec<CriterionPreview> = rubric
            .criteria
            .iter()
            .map(|c| CriterionPreview {
                id: c.reference().to_string(),
                name: c.name.clone(),
                description: c.description.clone(),
                item_type: c.item_type,
                max_score: c.max_score,
                weight: c.weight,
                metadata: c.metadata.clone(),
            })
            .collect();

        let generated_prompts = rubric
            .criteria
            .iter()
            .map(|c| GeneratedPrompt {
                criterion_name: c.name.clone(),
                prompt_text: build_preview_prompt(c, &context),
            })
            .collect();

        Self {
            extraction_summary: extraction_summary(rubric),
            items_extracted: rubric.criteria.len(),
            rubric_title: rubric.title.clone(),
            rubric_type: rubric.rubric_type,
            max_total_score: rubric.max_total_score,
            criteria_names: rubric.criteria.iter().map(|c| c.name.clone()).collect(),
            criteria,
            generated_prompts,
        }
    }
}

fn extraction_summary(rubric: &Rubric) -> String {
    let count = rubric.criteria.len();
    let noun = if count == 1 { "criterion" } else { "criteria" };
    let mut summary = format!(
        "Extracted {} {} from '{}' ({} rubric, {} points total).",
        count,
        noun,
        rubric.title,
        rubric.rubric_type,
        format_points(rubric.max_total_score)
    );

    let criteria_sum = rubric.criteria_max_sum();
    if count > 0 && (criteria_sum - rubric.max_total_score).abs() > 1e-6 {
        summary.push_str(&format!(
            " Criterion maxima sum to {}; the rubric total is shown as declared.",
            format_points(criteria_sum)
        ));
    }
    if !rubric.levels.is_empty() {
        summary.push_str(&format!(" {} performance levels defined.", rubric.levels.len()));
    }
    summary
}
