//! # grader-core
//!
//! Deterministic rubric normalization and score aggregation.
//!
//! This crate holds everything in the grading pipeline that does not talk
//! to a language model:
//! - Canonical rubric model and the normalizer that produces it
//! - Provider-agnostic structured-output schema descriptors
//! - The per-criterion prompt builder
//! - Score validation, clamping, aggregation and performance bands
//!
//! ## Key Guarantees
//!
//! 1. **Idempotent normalization**: `normalize(normalize(x)) == normalize(x)`
//! 2. **Pure prompts**: same criterion and transcript always give the same prompt
//! 3. **Bounded scores**: every criterion score lies in `[0, max_score]`
//! 4. **No LLM calls**: provider access lives in `grader-runtime`
//!
//! ## Example
//!
//! ```rust,ignore
//! use grader_core::{normalize, build_prompt, PromptContext};
//!
//! let rubric = normalize(&serde_json::json!({
//!     "title": "Empathy Rubric",
//!     "max_total_score": 10,
//!     "criteria": [{ "name": "Greeting" }, { "name": "Listening", "max_score": 5 }]
//! }));
//!
//! let context = PromptContext::for_rubric(&rubric);
//! let prompt = build_prompt(&rubric.criteria[0], &context, "Doctor: Hello...");
//! ```

pub mod aggregate;
pub mod band;
pub mod evaluation;
pub mod evidence;
pub mod preview;
pub mod prompt;
pub mod rubric;
pub mod schema;
pub mod scoring;

// Re-export main types at crate root
pub use aggregate::{aggregate, templated_summary, Aggregate, FeedbackSummary};
pub use band::{BandBoundary, BandError, PerformanceBands};
pub use evaluation::{
    AmendError, CriterionAmendment, Evaluation, EvaluationAmendment, EvaluationId, RubricId,
    RubricSnapshotRef,
};
pub use evidence::quote_appears_in;
pub use preview::{CriterionPreview, GeneratedPrompt, ParsingPreview};
pub use prompt::{build_preview_prompt, build_prompt, PromptContext, TRANSCRIPT_PLACEHOLDER};
pub use rubric::{
    normalize, normalize_rubric, Criterion, ItemType, Level, Metadata, Rubric, RubricError,
    RubricType,
};
pub use schema::{SchemaDescriptor, SchemaKind};
pub use scoring::{CriterionScore, ScoreError, ScoreStatus};

/// Round a point value to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Render a point value without trailing zeros (`5`, `2.5`, `1.67`).
pub fn format_points(value: f64) -> String {
    let rendered = format!("{:.2}", round2(value));
    let trimmed = rendered.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "-" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}
