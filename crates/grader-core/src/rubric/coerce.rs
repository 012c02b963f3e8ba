//! Lenient numeric coercion for model- and user-supplied values.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value as JsonValue;

lazy_static! {
    /// A leading decimal number, optionally signed, with optional exponent
    /// (`"5"`, `" 2.5 points"`, `"-1"`, `".5"`, `"1e2"`).
    static ref LEADING_NUMBER: Regex =
        Regex::new(r"^\s*([-+]?(?:\d+(?:\.\d+)?|\.\d+)(?:[eE][-+]?\d+)?)").unwrap();
}

/// Read a finite number from a JSON number or a numeric-looking string.
pub fn coerce_number(value: &JsonValue) -> Option<f64> {
    let number = match value {
        JsonValue::Number(n) => n.as_f64()?,
        JsonValue::String(s) => parse_leading_number(s)?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

/// Like [`coerce_number`], discarding negative values.
pub fn coerce_non_negative(value: &JsonValue) -> Option<f64> {
    coerce_number(value).filter(|n| *n >= 0.0)
}

/// Like [`coerce_number`], keeping only strictly positive values.
pub fn coerce_positive(value: &JsonValue) -> Option<f64> {
    coerce_number(value).filter(|n| *n > 0.0)
}

fn parse_leading_number(text: &str) -> Option<f64> {
    LEADING_NUMBER
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}
