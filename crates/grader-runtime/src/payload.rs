//! Lenient JSON extraction from provider text content.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value as JsonValue;

lazy_static! {
    static ref FENCED_BLOCK: Regex =
        Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").expect("fenced block pattern");
}

/// Parse JSON out of model text.
///
/// Tries the whole text, then each fenced code block, then the outermost
/// `{...}` span. Returns `None` when nothing parses.
pub fn extract_json_payload(text: &str) -> Option<JsonValue> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    for captures in FENCED_BLOCK.captures_iter(trimmed) {
        if let Some(body) = captures.get(1) {
            if let Ok(value) = serde_json::from_str(body.as_str().trim()) {
                return Some(value);
            }
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_plain_json() {
        assert_eq!(
            extract_json_payload(r#" {"score": 4, "feedback": "ok"} "#),
            Some(json!({"score": 4, "feedback": "ok"}))
        );
    }

    #[test]
    fn test_fenced_block() {
        let text = "Here is the result:\n```json\n{\"summary\": \"Solid\"}\n```\nThanks.";
        assert_eq!(extract_json_payload(text), Some(json!({"summary": "Solid"})));
    }

    #[test]
    fn test_unlabelled_fence() {
        let text = "```\n{\"criteria\": []}\n```";
        assert_eq!(extract_json_payload(text), Some(json!({"criteria": []})));
    }

    #[test]
    fn test_embedded_object() {
        let text = "Sure! {\"score\": 2, \"feedback\": \"Brief {aside}\"} Hope that helps.";
        assert_eq!(
            extract_json_payload(text),
            Some(json!({"score": 2, "feedback": "Brief {aside}"}))
        );
    }

    #[test]
    fn test_unparseable() {
        assert_eq!(extract_json_payload(""), None);
        assert_eq!(extract_json_payload("no json here"), None);
        assert_eq!(extract_json_payload("} backwards {"), None);
        assert_eq!(extract_json_payload("{\"score\": }"), None);
    }

    proptest! {
        #[test]
        fn prop_arbitrary_text_never_panics(text in "\\PC*") {
            let _ = extract_json_payload(&text);
        }

        #[test]
        fn prop_object_found_inside_prose(
            prefix in "[a-zA-Z .,:!]{0,40}",
            suffix in "[a-zA-Z .,:!]{0,40}",
            score in 0u32..100,
        ) {
            let text = format!("{}{{\"score\": {}}}{}", prefix, score, suffix);
            prop_assert_eq!(extract_json_payload(&text), Some(json!({"score": score})));
        }
    }
}
