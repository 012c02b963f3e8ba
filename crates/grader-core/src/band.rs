//! Performance bands.
//!
//! A band is the label of the highest boundary whose `min_percent` the
//! evaluation percentage reaches. Boundaries are configuration: they
//! deserialize either from a list of `{min_percent, label}` records or from
//! a `{"90": "Excellent", ...}` map.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors from band configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BandError {
    #[error("Performance bands must contain at least one boundary")]
    Empty,

    #[error("Invalid band boundary '{0}': must be a finite percentage")]
    InvalidBoundary(String),

    #[error("Band label for boundary {0} is empty")]
    EmptyLabel(String),
}

/// One band boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BandBoundary {
    pub min_percent: f64,
    pub label: String,
}

/// Ordered performance band boundaries (highest first).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "BandsRepr", into = "Vec<BandBoundary>")]
pub struct PerformanceBands {
    boundaries: Vec<BandBoundary>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BandsRepr {
    List(Vec<BandBoundary>),
    Map(BTreeMap<String, String>),
}

impl TryFrom<BandsRepr> for PerformanceBands {
    type Error = BandError;

    fn try_from(repr: BandsRepr) -> Result<Self, Self::Error> {
        match repr {
            BandsRepr::List(boundaries) => Self::new(boundaries),
            BandsRepr::Map(map) => {
                let boundaries = map
                    .into_iter()
                    .map(|(key, label)| {
                        let min_percent = key
                            .trim()
                            .trim_end_matches('%')
                            .parse::<f64>()
                            .map_err(|_| BandError::InvalidBoundary(key.clone()))?;
                        Ok(BandBoundary { min_percent, label })
                    })
                    .collect::<Result<Vec<_>, BandError>>()?;
                Self::new(boundaries)
            }
        }
    }
}

impl From<PerformanceBands> for Vec<BandBoundary> {
    fn from(bands: PerformanceBands) -> Self {
        bands.boundaries
    }
}

impl Default for PerformanceBands {
    fn default() -> Self {
        let boundaries = [
            (90.0, "Excellent"),
            (75.0, "Proficient"),
            (60.0, "Developing"),
            (0.0, "Needs Improvement"),
        ]
        .into_iter()
        .map(|(min_percent, label)| BandBoundary {
            min_percent,
            label: label.to_string(),
        })
        .collect();
        Self { boundaries }
    }
}

impl PerformanceBands {
    /// Build bands from boundaries in any order.
    pub fn new(mut boundaries: Vec<BandBoundary>) -> Result<Self, BandError> {
        if boundaries.is_empty() {
            return Err(BandError::Empty);
        }
        for boundary in &boundaries {
            if !boundary.min_percent.is_finite() {
                return Err(BandError::InvalidBoundary(boundary.min_percent.to_string()));
            }
            if boundary.label.trim().is_empty() {
                return Err(BandError::EmptyLabel(boundary.min_percent.to_string()));
            }
        }
        boundaries.sort_by(|a, b| b.min_percent.total_cmp(&a.min_percent));
        Ok(Self { boundaries })
    }

    pub fn boundaries(&self) -> &[BandBoundary] {
        &self.boundaries
    }

    /// Label for a percentage in `[0, 100]`.
    ///
    /// Percentages below every boundary get the lowest band.
    pub fn classify(&self, percent: f64) -> &str {
        self.boundaries
            .iter()
            .find(|b| percent >= b.min_percent)
            .or_else(|| self.boundaries.last())
            .map(|b| b.label.as_str())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bands() {
        let bands = PerformanceBands::default();
        assert_eq!(bands.classify(80.0), "Proficient");
        assert_eq!(bands.classify(90.0), "Excellent");
        assert_eq!(bands.classify(59.99), "Needs Improvement");
        assert_eq!(bands.classify(0.0), "Needs Improvement");
    }

    #[test]
    fn test_map_form_matches_default() {
        let bands: PerformanceBands = serde_json::from_str(
            r#"{"90": "Excellent", "75": "Proficient", "60": "Developing", "0": "Needs Improvement"}"#,
        )
        .unwrap();
        assert_eq!(bands, PerformanceBands::default());
        assert_eq!(bands.classify(8.0 / 10.0 * 100.0), "Proficient");
    }

    #[test]
    fn test_list_form_sorted() {
        let bands: PerformanceBands = serde_yaml::from_str(
            "- min_percent: 50\n  label: Pass\n- min_percent: 85\n  label: Distinction\n",
        )
        .unwrap();
        assert_eq!(bands.boundaries()[0].label, "Distinction");
        assert_eq!(bands.classify(60.0), "Pass");
        assert_eq!(bands.classify(10.0), "Pass");
    }

    #[test]
    fn test_invalid_configuration() {
        assert_eq!(PerformanceBands::new(Vec::new()), Err(BandError::Empty));
        let bad: Result<PerformanceBands, _> = serde_json::from_str(r#"{"high": "Excellent"}"#);
        assert!(bad.is_err());
        let blank = PerformanceBands::new(vec![BandBoundary {
            min_percent: 0.0,
            label: " ".to_string(),
        }]);
        assert!(matches!(blank, Err(BandError::EmptyLabel(_))));
    }

    #[test]
    fn test_serializes_as_list() {
        let value = serde_json::to_value(PerformanceBands::default()).unwrap();
        assert_eq!(value[0]["label"], "Excellent");
        assert_eq!(value[3]["min_percent"], 0.0);
    }
}
