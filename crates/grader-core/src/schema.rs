//! Provider-agnostic structured-output schemas.
//!
//! Each [`SchemaKind`] has two JSON Schema documents:
//! - a strict definition handed to the provider, which enforces it
//! - a lenient acceptance schema checked locally on whatever comes back
//!
//! Provider adapters translate the strict definition into their own
//! request envelope; nothing here knows about wire formats.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::fmt;
use std::sync::OnceLock;

use crate::rubric::{ItemType, RubricType};

/// The structured responses the pipeline asks providers for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SchemaKind {
    RubricExtraction,
    CriterionScoring,
    FeedbackSummary,
}

/// A schema ready to be attached to a provider request.
#[derive(Debug, Clone, Copy)]
pub struct SchemaDescriptor {
    pub kind: SchemaKind,
    pub name: &'static str,
    pub definition: &'static JsonValue,
}

impl SchemaKind {
    pub fn name(&self) -> &'static str {
        match self {
            SchemaKind::RubricExtraction => "rubric_extraction",
            SchemaKind::CriterionScoring => "criterion_scoring",
            SchemaKind::FeedbackSummary => "feedback_summary",
        }
    }

    pub fn descriptor(&self) -> SchemaDescriptor {
        SchemaDescriptor {
            kind: *self,
            name: self.name(),
            definition: self.definition(),
        }
    }

    /// Strict schema sent to the provider.
    pub fn definition(&self) -> &'static JsonValue {
        static EXTRACTION: OnceLock<JsonValue> = OnceLock::new();
        static SCORING: OnceLock<JsonValue> = OnceLock::new();
        static SUMMARY: OnceLock<JsonValue> = OnceLock::new();
        match self {
            SchemaKind::RubricExtraction => EXTRACTION.get_or_init(extraction_schema),
            SchemaKind::CriterionScoring => SCORING.get_or_init(scoring_schema),
            SchemaKind::FeedbackSummary => SUMMARY.get_or_init(summary_schema),
        }
    }

    /// Check a parsed response against the local acceptance schema.
    ///
    /// Returns the list of violations as `"<message> at <path>"` strings.
    pub fn accept(&self, value: &JsonValue) -> Result<(), Vec<String>> {
        let errors: Vec<String> = acceptance_validator(*self)
            .iter_errors(value)
            .map(|e| format!("{} at {}", e, e.instance_path))
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn is_acceptable(&self, value: &JsonValue) -> bool {
        acceptance_validator(*self).is_valid(value)
    }
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn acceptance_validator(kind: SchemaKind) -> &'static jsonschema::Validator {
    static EXTRACTION: OnceLock<jsonschema::Validator> = OnceLock::new();
    static SCORING: OnceLock<jsonschema::Validator> = OnceLock::new();
    static SUMMARY: OnceLock<jsonschema::Validator> = OnceLock::new();

    let (cell, schema): (&OnceLock<jsonschema::Validator>, fn() -> JsonValue) = match kind {
        SchemaKind::RubricExtraction => (&EXTRACTION, extraction_acceptance),
        SchemaKind::CriterionScoring => (&SCORING, || json!({ "type": "object" })),
        SchemaKind::FeedbackSummary => (&SUMMARY, summary_acceptance),
    };

    // Constant schemas; compilation cannot fail at runtime.
    cell.get_or_init(|| {
        jsonschema::options()
            .build(&schema())
            .expect("acceptance schema compiles")
    })
}

fn extraction_acceptance() -> JsonValue {
    json!({
        "type": "object",
        "required": ["criteria"],
        "properties": { "criteria": { "type": "array" } }
    })
}

fn summary_acceptance() -> JsonValue {
    json!({
        "type": "object",
        "required": ["summary"],
        "properties": {
            "summary": { "type": "string" },
            "key_strengths": { "type": "array", "items": { "type": "string" } },
            "areas_for_development": { "type": "array", "items": { "type": "string" } }
        }
    })
}

fn level_schema() -> JsonValue {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["label", "score", "description"],
        "properties": {
            "label": { "type": "string" },
            "score": { "type": ["number", "null"] },
            "description": { "type": ["string", "null"] }
        }
    })
}

fn extraction_schema() -> JsonValue {
    let rubric_types: Vec<&str> = RubricType::ALL.iter().map(RubricType::as_str).collect();
    let item_types: Vec<&str> = ItemType::ALL.iter().map(ItemType::as_str).collect();
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": [
            "rubric_title", "rubric_summary", "rubric_type",
            "max_total_score", "criteria", "holistic_levels"
        ],
        "properties": {
            "rubric_title": { "type": "string" },
            "rubric_summary": { "type": "string" },
            "rubric_type": { "type": "string", "enum": rubric_types },
            "max_total_score": { "type": ["number", "null"] },
            "criteria": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": [
                        "name", "description", "item_type",
                        "max_score", "weight", "performance_levels"
                    ],
                    "properties": {
                        "name": { "type": "string" },
                        "description": { "type": ["string", "null"] },
                        "item_type": { "type": "string", "enum": item_types },
                        "max_score": { "type": ["number", "null"] },
                        "weight": { "type": ["number", "null"] },
                        "performance_levels": { "type": "array", "items": level_schema() }
                    }
                }
            },
            "holistic_levels": { "type": "array", "items": level_schema() }
        }
    })
}

fn scoring_schema() -> JsonValue {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["score", "feedback", "evidence"],
        "properties": {
            "score": { "type": "number" },
            "feedback": { "type": "string" },
            "evidence": { "type": "string" }
        }
    })
}

fn summary_schema() -> JsonValue {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["summary", "key_strengths", "areas_for_development"],
        "properties": {
            "summary": { "type": "string" },
            "key_strengths": { "type": "array", "items": { "type": "string" } },
            "areas_for_development": { "type": "array", "items": { "type": "string" } }
        }
    })
}
