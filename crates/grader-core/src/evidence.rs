//! Evidence quote verification.
//!
//! Models are asked to back each score with a verbatim quote. This module
//! checks that the quote actually occurs in the transcript. Comparison is
//! case-insensitive and ignores whitespace differences and wrapping quote
//! marks.

const QUOTE_MARKS: &[char] = &['"', '\'', '\u{201C}', '\u{201D}', '\u{2018}', '\u{2019}'];

/// Whether `quote` appears in `source` after normalization.
///
/// Empty quotes never match.
pub fn quote_appears_in(source: &str, quote: &str) -> bool {
    let needle = normalize_whitespace(quote.trim().trim_matches(QUOTE_MARKS)).to_lowercase();
    if needle.is_empty() {
        return false;
    }
    normalize_whitespace(source).to_lowercase().contains(&needle)
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
