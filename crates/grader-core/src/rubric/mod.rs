//! Rubric model and normalization.
//!
//! Rubrics arrive as loosely shaped JSON (from extraction) or YAML/JSON
//! documents (from editors). Everything is funneled through [`normalize`]
//! so downstream code only ever sees the canonical [`Rubric`].

pub mod coerce;
mod model;
mod normalizer;

pub use model::{
    Criterion, ItemType, Level, Metadata, Rubric, RubricError, RubricType, META_CHECKLIST_REQUIRED,
    META_ID, META_KEYWORDS, META_PERFORMANCE_LEVELS, META_SINGLE_POINT, META_SUB_CRITERIA,
};
pub use normalizer::{
    normalize, normalize_levels, normalize_rubric, CHECKLIST_DEFAULT_MAX, DEFAULT_TITLE,
    UNSCORED_DEFAULT_MAX,
};
