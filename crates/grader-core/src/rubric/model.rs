//! Canonical rubric model.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

use super::normalizer::normalize;

/// Free-form per-criterion metadata, carried verbatim through normalization.
pub type Metadata = BTreeMap<String, JsonValue>;

/// Metadata key holding the stable criterion identifier.
pub const META_ID: &str = "id";
/// Metadata key holding per-criterion performance levels.
pub const META_PERFORMANCE_LEVELS: &str = "performance_levels";
/// Metadata key holding nested checklist items.
pub const META_SUB_CRITERIA: &str = "sub_criteria";
/// Metadata key holding cleaned keyword lists.
pub const META_KEYWORDS: &str = "keywords";
/// Metadata key holding single-point descriptors.
pub const META_SINGLE_POINT: &str = "single_point";
/// Metadata key holding the checklist requirement flag.
pub const META_CHECKLIST_REQUIRED: &str = "checklist_required";

/// Errors that can occur when loading rubrics.
#[derive(Error, Debug)]
pub enum RubricError {
    #[error("Failed to read rubric file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Rubric document must be a mapping, found {0}")]
    InvalidShape(&'static str),
}

/// Overall rubric layout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum RubricType {
    #[default]
    Analytic,
    Holistic,
    Checklist,
    SinglePoint,
}

impl RubricType {
    /// All recognized rubric types, in schema order.
    pub const ALL: [RubricType; 4] = [
        RubricType::Analytic,
        RubricType::Holistic,
        RubricType::Checklist,
        RubricType::SinglePoint,
    ];

    /// Parse a loosely formatted type name (`"Single Point"`, `"single-point"`).
    pub fn parse(value: &str) -> Option<Self> {
        match canonical_token(value).as_str() {
            "analytic" => Some(RubricType::Analytic),
            "holistic" => Some(RubricType::Holistic),
            "checklist" => Some(RubricType::Checklist),
            "single_point" => Some(RubricType::SinglePoint),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RubricType::Analytic => "analytic",
            RubricType::Holistic => "holistic",
            RubricType::Checklist => "checklist",
            RubricType::SinglePoint => "single_point",
        }
    }
}

impl fmt::Display for RubricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of a single rubric item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    #[default]
    Criterion,
    Checklist,
    SinglePoint,
    Holistic,
}

impl ItemType {
    pub const ALL: [ItemType; 4] = [
        ItemType::Criterion,
        ItemType::Checklist,
        ItemType::SinglePoint,
        ItemType::Holistic,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        match canonical_token(value).as_str() {
            "criterion" => Some(ItemType::Criterion),
            "checklist" => Some(ItemType::Checklist),
            "single_point" => Some(ItemType::SinglePoint),
            "holistic" => Some(ItemType::Holistic),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Criterion => "criterion",
            ItemType::Checklist => "checklist",
            ItemType::SinglePoint => "single_point",
            ItemType::Holistic => "holistic",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn canonical_token(value: &str) -> String {
    value
        .trim()
        .to_ascii_lowercase()
        .replace([' ', '-'], "_")
}

/// A named performance level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Level {
    /// Stable key, e.g. `overall_1`
    pub key: String,

    /// Display label
    pub label: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A single scorable rubric item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Criterion {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub item_type: ItemType,

    /// Points available for this criterion (always resolved after normalization)
    pub max_score: f64,

    /// Relative weight; absent means the criterion counts as weight 1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,

    #[serde(default)]
    pub metadata: Metadata,
}

impl Criterion {
    /// Stable identifier assigned during normalization.
    pub fn id(&self) -> Option<&str> {
        self.metadata.get(META_ID).and_then(JsonValue::as_str)
    }

    /// Identifier used in score records, falling back to the name.
    pub fn reference(&self) -> &str {
        self.id().unwrap_or(&self.name)
    }

    pub fn effective_weight(&self) -> f64 {
        self.weight.unwrap_or(1.0)
    }

    /// Whether a checklist item is marked as required.
    pub fn checklist_required(&self) -> Option<bool> {
        self.metadata
            .get(META_CHECKLIST_REQUIRED)
            .and_then(JsonValue::as_bool)
    }

    /// Per-criterion performance levels, read leniently from metadata.
    pub fn performance_levels(&self) -> Vec<Level> {
        let prefix = self.id().unwrap_or("criterion").to_ascii_lowercase();
        self.metadata
            .get(META_PERFORMANCE_LEVELS)
            .map(|value| super::normalizer::normalize_levels(Some(value), &prefix))
            .unwrap_or_default()
    }

    /// Nested checklist items as `(name, description)` pairs.
    pub fn sub_criteria(&self) -> Vec<(String, String)> {
        let Some(JsonValue::Array(items)) = self.metadata.get(META_SUB_CRITERIA) else {
            return Vec::new();
        };
        items
            .iter()
            .filter_map(|item| {
                let name = item.get("name")?.as_str()?.trim();
                if name.is_empty() {
                    return None;
                }
                let description = item
                    .get("description")
                    .and_then(JsonValue::as_str)
                    .unwrap_or("")
                    .trim();
                Some((name.to_string(), description.to_string()))
            })
            .collect()
    }

    /// Single-point descriptors as `(label, text)` pairs in display order.
    pub fn single_point_descriptors(&self) -> Vec<(&'static str, String)> {
        let Some(JsonValue::Object(map)) = self.metadata.get(META_SINGLE_POINT) else {
            return Vec::new();
        };
        [
            ("Target", "target_description"),
            ("Exceeds", "exceeds_description"),
            ("Below", "below_description"),
        ]
        .into_iter()
        .filter_map(|(label, key)| {
            let text = map.get(key)?.as_str()?.trim();
            (!text.is_empty()).then(|| (label, text.to_string()))
        })
        .collect()
    }
}

/// A normalized rubric.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rubric {
    pub title: String,

    #[serde(default)]
    pub summary: String,

    #[serde(default)]
    pub rubric_type: RubricType,

    /// Rubric-level point total (advisory when it disagrees with the criteria sum)
    pub max_total_score: f64,

    #[serde(default)]
    pub criteria: Vec<Criterion>,

    /// Rubric-level (holistic) performance levels
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub levels: Vec<Level>,
}

impl Rubric {
    /// Parse and normalize a rubric from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, RubricError> {
        let raw: JsonValue = serde_yaml::from_str(yaml)?;
        Self::from_value(&raw)
    }

    /// Parse and normalize a rubric from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, RubricError> {
        let raw: JsonValue = serde_json::from_str(json)?;
        Self::from_value(&raw)
    }

    /// Parse a rubric from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, RubricError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse a rubric from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, RubricError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Load a rubric file, choosing the format by extension (`.json` or YAML).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RubricError> {
        let path = path.as_ref();
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if is_json {
            Self::from_json_file(path)
        } else {
            Self::from_yaml_file(path)
        }
    }

    fn from_value(raw: &JsonValue) -> Result<Self, RubricError> {
        match raw {
            JsonValue::Object(_) => Ok(normalize(raw)),
            JsonValue::Array(_) => Err(RubricError::InvalidShape("a list")),
            JsonValue::Null => Err(RubricError::InvalidShape("an empty document")),
            _ => Err(RubricError::InvalidShape("a scalar")),
        }
    }

    /// Sum of all criterion maxima.
    pub fn criteria_max_sum(&self) -> f64 {
        self.criteria.iter().map(|c| c.max_score).sum()
    }

    /// Find a criterion by id or exact name.
    pub fn find_criterion(&self, reference: &str) -> Option<&Criterion> {
        self.criteria
            .iter()
            .find(|c| c.id() == Some(reference))
            .or_else(|| self.criteria.iter().find(|c| c.name == reference))
    }
}
