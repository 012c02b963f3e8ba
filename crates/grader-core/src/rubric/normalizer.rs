//! Rubric normalization.
//!
//! Turns an arbitrarily shaped rubric payload (usually the output of an LLM
//! extraction call, sometimes a hand-edited document) into a canonical
//! [`Rubric`]. Normalization never fails: unusable fields fall back to
//! defaults and nameless criteria are dropped.
//!
//! Missing criterion maxima are resolved with a single rule:
//! - an explicit `max_score` (number or numeric string, `>= 0`) is kept
//! - checklist items default to `1.0`
//! - with a positive rubric total, the remaining pool
//!   `max(total - resolved, 0)` is split evenly across unscored criteria
//! - without one, unscored criteria get `1.0` and the total becomes the sum
//!
//! Output is canonical: feeding a normalized rubric back in returns it
//! unchanged.

use serde_json::{Map, Value as JsonValue};
use std::collections::HashSet;

use super::coerce::{coerce_non_negative, coerce_positive};
use super::model::{
    Criterion, ItemType, Level, Metadata, Rubric, RubricType, META_CHECKLIST_REQUIRED, META_ID,
    META_KEYWORDS, META_PERFORMANCE_LEVELS, META_SINGLE_POINT, META_SUB_CRITERIA,
};

/// Title used when the payload has none.
pub const DEFAULT_TITLE: &str = "Untitled Rubric";

/// Default maximum for checklist items.
pub const CHECKLIST_DEFAULT_MAX: f64 = 1.0;

/// Default maximum for unscored criteria when no rubric total is known.
pub const UNSCORED_DEFAULT_MAX: f64 = 1.0;

const SINGLE_POINT_KEYS: [&str; 3] = [
    "target_description",
    "exceeds_description",
    "below_description",
];

/// Normalize a raw rubric payload into a canonical [`Rubric`].
pub fn normalize(raw: &JsonValue) -> Rubric {
    let empty = Map::new();
    let obj = raw.as_object().unwrap_or(&empty);

    let title = first_text(obj, &["title", "rubric_title"])
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());
    let summary = first_text(obj, &["summary", "rubric_summary"]).unwrap_or_default();
    let rubric_type = obj
        .get("rubric_type")
        .and_then(JsonValue::as_str)
        .and_then(RubricType::parse)
        .unwrap_or_default();

    let levels_raw = obj.get("levels").or_else(|| obj.get("holistic_levels"));
    let levels = normalize_levels(levels_raw, "overall");

    let mut drafts: Vec<(Criterion, Option<f64>)> = obj
        .get("criteria")
        .and_then(JsonValue::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| normalize_criterion(entry, rubric_type))
                .collect()
        })
        .unwrap_or_default();

    let provided_total = ["max_total_score", "max_total"]
        .iter()
        .find_map(|key| obj.get(*key).and_then(coerce_positive));

    resolve_maxima(&mut drafts, provided_total);

    let mut criteria: Vec<Criterion> = drafts.into_iter().map(|(c, _)| c).collect();
    dedupe_names(&mut criteria);
    assign_ids(&mut criteria);

    let max_total_score =
        provided_total.unwrap_or_else(|| criteria.iter().map(|c| c.max_score).sum());

    Rubric {
        title,
        summary,
        rubric_type,
        max_total_score,
        criteria,
        levels,
    }
}

/// Re-run normalization over an edited rubric (the save path).
pub fn normalize_rubric(rubric: &Rubric) -> Rubric {
    match serde_json::to_value(rubric) {
        Ok(value) => normalize(&value),
        Err(e) => {
            tracing::warn!(error = %e, "Could not serialize rubric for normalization");
            rubric.clone()
        }
    }
}

/// Normalize a list of level descriptors.
///
/// Accepts `label` or `name` for the label, `key` or `level_key` for the key,
/// and `score`/`min_score` for the floor score.
pub fn normalize_levels(raw: Option<&JsonValue>, key_prefix: &str) -> Vec<Level> {
    let Some(JsonValue::Array(entries)) = raw else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(JsonValue::as_object)
        .enumerate()
        .map(|(idx, entry)| {
            let position = idx + 1;
            let label = first_text(entry, &["label", "name"])
                .unwrap_or_else(|| format!("Level {}", position));
            let key = first_text(entry, &["key", "level_key"])
                .unwrap_or_else(|| format!("{}_{}", key_prefix, position));
            let score = ["score", "min_score"]
                .iter()
                .find_map(|k| entry.get(*k).and_then(coerce_non_negative));
            let description = first_text(entry, &["description"]);
            Level {
                key,
                label,
                score,
                description,
            }
        })
        .collect()
}

fn normalize_criterion(entry: &JsonValue, rubric_type: RubricType) -> Option<(Criterion, Option<f64>)> {
    let obj = entry.as_object()?;
    let Some(name) = first_text(obj, &["name", "title"]) else {
        tracing::debug!("Dropping rubric criterion without a name");
        return None;
    };

    let description = first_text(obj, &["description"]).unwrap_or_default();
    let item_type = obj
        .get("item_type")
        .and_then(JsonValue::as_str)
        .and_then(ItemType::parse)
        .unwrap_or_default();
    let explicit_max = obj.get("max_score").and_then(coerce_non_negative);
    let max_score = explicit_max.or_else(|| {
        (item_type == ItemType::Checklist).then_some(CHECKLIST_DEFAULT_MAX)
    });
    let weight = obj.get("weight").and_then(coerce_non_negative);

    let mut metadata: Metadata = obj
        .get("metadata")
        .and_then(JsonValue::as_object)
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();

    fold_extras(obj, &mut metadata, item_type, rubric_type);

    let criterion = Criterion {
        name,
        description,
        item_type,
        max_score: max_score.unwrap_or(0.0),
        weight,
        metadata,
    };
    Some((criterion, max_score))
}

/// Move top-level criterion extras into metadata without overwriting it.
fn fold_extras(
    obj: &Map<String, JsonValue>,
    metadata: &mut Metadata,
    item_type: ItemType,
    rubric_type: RubricType,
) {
    for key in [META_ID, META_PERFORMANCE_LEVELS, META_SUB_CRITERIA] {
        if let Some(value) = obj.get(key).filter(|v| !v.is_null()) {
            metadata
                .entry(key.to_string())
                .or_insert_with(|| value.clone());
        }
    }

    if let Some(JsonValue::Array(words)) = obj.get(META_KEYWORDS) {
        if !metadata.contains_key(META_KEYWORDS) {
            let mut seen = HashSet::new();
            let cleaned: Vec<JsonValue> = words
                .iter()
                .filter_map(JsonValue::as_str)
                .map(str::trim)
                .filter(|w| !w.is_empty() && seen.insert(w.to_lowercase()))
                .map(|w| JsonValue::String(w.to_string()))
                .collect();
            if !cleaned.is_empty() {
                metadata.insert(META_KEYWORDS.to_string(), JsonValue::Array(cleaned));
            }
        }
    }

    if !metadata.contains_key(META_SINGLE_POINT) {
        let descriptors: Map<String, JsonValue> = SINGLE_POINT_KEYS
            .iter()
            .filter_map(|key| {
                let text = obj.get(*key)?.as_str()?.trim();
                (!text.is_empty()).then(|| (key.to_string(), JsonValue::String(text.to_string())))
            })
            .collect();
        if !descriptors.is_empty() {
            metadata.insert(META_SINGLE_POINT.to_string(), JsonValue::Object(descriptors));
        }
    }

    let is_checklist = item_type == ItemType::Checklist || rubric_type == RubricType::Checklist;
    if is_checklist && !metadata.contains_key(META_CHECKLIST_REQUIRED) {
        let required = obj
            .get(META_CHECKLIST_REQUIRED)
            .and_then(JsonValue::as_bool)
            .unwrap_or(false);
        metadata.insert(META_CHECKLIST_REQUIRED.to_string(), JsonValue::Bool(required));
    }
}

fn resolve_maxima(drafts: &mut [(Criterion, Option<f64>)], provided_total: Option<f64>) {
    let unscored = drafts.iter().filter(|(_, max)| max.is_none()).count();
    if unscored == 0 {
        return;
    }

    let share = match provided_total {
        Some(total) => {
            let resolved: f64 = drafts.iter().filter_map(|(_, max)| *max).sum();
            let pool = (total - resolved).max(0.0);
            if pool == 0.0 {
                tracing::warn!(
                    total,
                    resolved,
                    unscored,
                    "Rubric total leaves no points for unscored criteria"
                );
            }
            pool / unscored as f64
        }
        None => UNSCORED_DEFAULT_MAX,
    };

    for (criterion, max) in drafts.iter_mut() {
        if max.is_none() {
            criterion.max_score = share;
        }
    }
}

fn dedupe_names(criteria: &mut [Criterion]) {
    let mut seen: HashSet<String> = HashSet::new();
    for criterion in criteria.iter_mut() {
        if seen.insert(criterion.name.clone()) {
            continue;
        }
        let base = criterion.name.clone();
        let mut n = 2;
        let mut candidate = format!("{} ({})", base, n);
        while seen.contains(&candidate) {
            n += 1;
            candidate = format!("{} ({})", base, n);
        }
        tracing::debug!(name = %base, renamed = %candidate, "Renamed duplicate criterion");
        seen.insert(candidate.clone());
        criterion.name = candidate;
    }
}

/// Give every criterion a unique string id, keeping the first use of each explicit id.
fn assign_ids(criteria: &mut [Criterion]) {
    let explicit: Vec<Option<String>> = criteria
        .iter()
        .map(|c| c.metadata.get(META_ID).and_then(id_text))
        .collect();

    let mut reserved: HashSet<String> = HashSet::new();
    let mut keep = vec![false; criteria.len()];
    for (idx, id) in explicit.iter().enumerate() {
        if let Some(id) = id {
            keep[idx] = reserved.insert(id.clone());
        }
    }

    for (idx, criterion) in criteria.iter_mut().enumerate() {
        let id = match (&explicit[idx], keep[idx]) {
            (Some(id), true) => id.clone(),
            (existing, _) => {
                let base = existing
                    .clone()
                    .unwrap_or_else(|| format!("C{}", idx + 1));
                let mut candidate = base.clone();
                let mut n = 2;
                while reserved.contains(&candidate) {
                    candidate = format!("{}-{}", base, n);
                    n += 1;
                }
                reserved.insert(candidate.clone());
                candidate
            }
        };
        criterion
            .metadata
            .insert(META_ID.to_string(), JsonValue::String(id));
    }
}

fn id_text(value: &JsonValue) -> Option<String> {
    let text = match value {
        JsonValue::String(s) => s.trim().to_string(),
        JsonValue::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn first_text(obj: &Map<String, JsonValue>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        let text = obj.get(*key)?.as_str()?.trim();
        (!text.is_empty()).then(|| text.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn max_of(rubric: &Rubric, name: &str) -> f64 {
        rubric
            .criteria
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.max_score)
            .unwrap()
    }

    #[test]
    fn test_even_split_of_remaining_total() {
        let rubric = normalize(&json!({
            "title": "Empathy Rubric",
            "criteria": [{"name": "Greeting"}, {"name": "Listening", "max_score": 5}],
            "max_total_score": 10
        }));
        assert_eq!(max_of(&rubric, "Greeting"), 5.0);
        assert_eq!(max_of(&rubric, "Listening"), 5.0);
        assert_eq!(rubric.max_total_score, 10.0);
    }

    #[test]
    fn test_defaults_without_total() {
        let rubric = normalize(&json!({
            "criteria": [{"name": "A"}, {"name": "B", "max_score": "3 points"}]
        }));
        assert_eq!(rubric.title, DEFAULT_TITLE);
        assert_eq!(rubric.rubric_type, RubricType::Analytic);
        assert_eq!(max_of(&rubric, "A"), UNSCORED_DEFAULT_MAX);
        assert_eq!(max_of(&rubric, "B"), 3.0);
        assert_eq!(rubric.max_total_score, 4.0);
    }

    #[test]
    fn test_checklist_items_default_to_one() {
        let rubric = normalize(&json!({
            "rubric_type": "checklist",
            "max_total_score": 10,
            "criteria": [
                {"name": "Introduces self", "item_type": "checklist", "checklist_required": true},
                {"name": "Summary"}
            ]
        }));
        let intro = &rubric.criteria[0];
        assert_eq!(intro.max_score, 1.0);
        assert_eq!(intro.checklist_required(), Some(true));
        assert_eq!(max_of(&rubric, "Summary"), 9.0);
        assert_eq!(rubric.criteria[1].checklist_required(), Some(false));
    }

    #[test]
    fn test_exhausted_pool_gives_zero() {
        let rubric = normalize(&json!({
            "max_total_score": 4,
            "criteria": [{"name": "A", "max_score": 5}, {"name": "B"}]
        }));
        assert_eq!(max_of(&rubric, "B"), 0.0);
        assert_eq!(rubric.max_total_score, 4.0);
    }

    #[test]
    fn test_non_positive_total_is_ignored() {
        let rubric = normalize(&json!({
            "max_total_score": 0,
            "criteria": [{"name": "A", "max_score": 2}, {"name": "B"}]
        }));
        assert_eq!(max_of(&rubric, "B"), 1.0);
        assert_eq!(rubric.max_total_score, 3.0);
    }

    #[test]
    fn test_nameless_and_non_object_entries_dropped() {
        let rubric = normalize(&json!({
            "criteria": [{"description": "orphan"}, "text", {"name": "  "}, {"name": "Kept"}]
        }));
        assert_eq!(rubric.criteria.len(), 1);
        assert_eq!(rubric.criteria[0].name, "Kept");
    }

    #[test]
    fn test_extraction_aliases() {
        let rubric = normalize(&json!({
            "rubric_title": "  OSCE Station 4 ",
            "rubric_summary": "History taking",
            "rubric_type": "Holistic",
            "max_total": "20",
            "holistic_levels": [
                {"label": "Excellent", "score": 18, "description": "Complete history"},
                {"score": 10}
            ],
            "criteria": [{"name": "Overall", "item_type": "holistic"}]
        }));
        assert_eq!(rubric.title, "OSCE Station 4");
        assert_eq!(rubric.summary, "History taking");
        assert_eq!(rubric.rubric_type, RubricType::Holistic);
        assert_eq!(rubric.max_total_score, 20.0);
        assert_eq!(rubric.levels.len(), 2);
        assert_eq!(rubric.levels[0].key, "overall_1");
        assert_eq!(rubric.levels[1].label, "Level 2");
        assert_eq!(rubric.criteria[0].max_score, 20.0);
    }

    #[test]
    fn test_duplicate_names_and_ids() {
        let rubric = normalize(&json!({
            "criteria": [
                {"name": "Greeting"},
                {"name": "Greeting", "metadata": {"id": "C1"}},
                {"name": "Greeting (2)"},
                {"name": "Closure", "id": 1.2}
            ]
        }));
        let names: Vec<&str> = rubric.criteria.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Greeting", "Greeting (2)", "Greeting (2) (2)", "Closure"]);
        let ids: Vec<&str> = rubric.criteria.iter().filter_map(|c| c.id()).collect();
        assert_eq!(ids, vec!["C1-2", "C1", "C3", "1.2"]);
    }

    #[test]
    fn test_metadata_preserved_and_extras_folded() {
        let levels = json!([{"label": "Met", "score": 2}]);
        let rubric = normalize(&json!({
            "rubric_type": "single point",
            "criteria": [{
                "name": "Empathy",
                "keywords": [" feelings ", "Feelings", "", "concern"],
                "target_description": "Names the emotion",
                "performance_levels": levels,
                "metadata": {"source_page": 3}
            }]
        }));
        let c = &rubric.criteria[0];
        assert_eq!(c.metadata["source_page"], json!(3));
        assert_eq!(c.metadata[META_PERFORMANCE_LEVELS], levels);
        assert_eq!(c.metadata[META_KEYWORDS], json!(["feelings", "concern"]));
        assert_eq!(
            c.metadata[META_SINGLE_POINT],
            json!({"target_description": "Names the emotion"})
        );
        assert_eq!(c.performance_levels()[0].label, "Met");
    }

    #[test]
    fn test_non_object_payload() {
        let rubric = normalize(&json!("not a rubric"));
        assert_eq!(rubric.title, DEFAULT_TITLE);
        assert!(rubric.criteria.is_empty());
        assert_eq!(rubric.max_total_score, 0.0);
    }

    #[test]
    fn test_save_path_is_noop_on_canonical() {
        let rubric = normalize(&json!({
            "title": "Empathy Rubric",
            "criteria": [{"name": "Greeting"}, {"name": "Greeting", "weight": 2}],
            "max_total_score": 7
        }));
        assert_eq!(normalize_rubric(&rubric), rubric);
    }

    fn raw_criterion() -> impl Strategy<Value = JsonValue> {
        (
            prop::sample::select(vec!["Greeting", "Listening", "Empathy", "Closure", ""]),
            prop::option::of(0u32..20),
            prop::option::of(prop::sample::select(vec!["criterion", "checklist", "holistic", "bogus"])),
            prop::option::of(0u32..4),
            prop::option::of(prop::sample::select(vec!["C1", "C2", "1.2"])),
        )
            .prop_map(|(name, max, item_type, weight, id)| {
                let mut entry = json!({ "name": name });
                if let Some(max) = max {
                    entry["max_score"] = json!(max);
                }
                if let Some(t) = item_type {
                    entry["item_type"] = json!(t);
                }
                if let Some(w) = weight {
                    entry["weight"] = json!(w);
                }
                if let Some(id) = id {
                    entry["metadata"] = json!({ "id": id });
                }
                entry
            })
    }

    fn raw_rubric() -> impl Strategy<Value = JsonValue> {
        (
            prop::collection::vec(raw_criterion(), 0..6),
            prop::option::of(0u32..40),
            prop::option::of(prop::sample::select(vec!["analytic", "Checklist", "single_point", "other"])),
        )
            .prop_map(|(criteria, total, rubric_type)| {
                let mut raw = json!({ "title": "Generated", "criteria": criteria });
                if let Some(total) = total {
                    raw["max_total_score"] = json!(total);
                }
                if let Some(t) = rubric_type {
                    raw["rubric_type"] = json!(t);
                }
                raw
            })
    }

    proptest! {
        #[test]
        fn prop_normalization_is_idempotent(raw in raw_rubric()) {
            let once = normalize(&raw);
            let twice = normalize_rubric(&once);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_even_split_conserves_total(
            explicit in prop::collection::vec(0u32..5, 0..4),
            unscored in 1usize..5,
            total in 20u32..60,
        ) {
            let mut criteria: Vec<JsonValue> = explicit
                .iter()
                .enumerate()
                .map(|(i, m)| json!({"name": format!("E{}", i), "max_score": m}))
                .collect();
            criteria.extend((0..unscored).map(|i| json!({"name": format!("U{}", i)})));
            let rubric = normalize(&json!({"criteria": criteria, "max_total_score": total}));
            let sum: f64 = rubric.criteria.iter().map(|c| c.max_score).sum();
            prop_assert!((sum - f64::from(total)).abs() < 1e-9);
        }

        #[test]
        fn prop_ids_and_names_unique(raw in raw_rubric()) {
            let rubric = normalize(&raw);
            let ids: HashSet<&str> = rubric.criteria.iter().filter_map(|c| c.id()).collect();
            let names: HashSet<&str> = rubric.criteria.iter().map(|c| c.name.as_str()).collect();
            prop_assert_eq!(ids.len(), rubric.criteria.len());
            prop_assert_eq!(names.len(), rubric.criteria.len());
        }
    }
}
