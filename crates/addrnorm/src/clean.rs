//! Scalar value cleaning applied to every field before any other stage.

use unicode_normalization::UnicodeNormalization;

use crate::text::{EDGE_RE, collapse_ws};

/// Tokens treated as "no value", compared case-insensitively after trimming.
const NULL_TOKENS: &[&str] = &["nan", "null", "none", "nil", "-", "n/a", "#n/a"];

/// Check whether a raw value is a null-like token.
pub fn is_null_value(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty()
        || NULL_TOKENS
            .iter()
            .any(|token| trimmed.eq_ignore_ascii_case(token))
}

/// Clean a raw scalar.
///
/// Returns `None` for null-like input. Otherwise the value is NFKC
/// normalized, whitespace runs are collapsed and separator punctuation is
/// stripped from both ends. Applying it twice gives the same result as
/// applying it once.
pub fn clean_value(value: &str) -> Option<String> {
    if is_null_value(value) {
        return None;
    }
    let normalized: String = value.trim().nfkc().collect();
    let collapsed = collapse_ws(&normalized);
    let stripped = EDGE_RE.replace_all(&collapsed, "");
    let cleaned = stripped.trim();
    if is_null_value(cleaned) {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Clean a value in place, returning whether it changed.
pub fn clean_in_place(value: &mut String) -> bool {
    let cleaned = clean_value(value).unwrap_or_default();
    if cleaned != *value {
        *value = cleaned;
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_tokens() {
        for raw in ["", "   ", "NaN", "null", "None", "-", "N/A", "nil", "#N/A"] {
            assert_eq!(clean_value(raw), None, "{raw:?} should be null");
        }
    }

    #[test]
    fn test_country_code_na_is_not_null() {
        assert_eq!(clean_value("NA"), Some("NA".to_string()));
    }

    #[test]
    fn test_whitespace_and_edges() {
        assert_eq!(
            clean_value("  ,123   Main\tSt.  "),
            Some("123 Main St".to_string())
        );
        assert_eq!(clean_value("--;"), None);
    }

    #[test]
    fn test_nfkc() {
        assert_eq!(clean_value("Ｂａｎｇｋｏｋ"), Some("Bangkok".to_string()));
        assert_eq!(clean_value("ｎａｎ"), None);
    }

    #[test]
    fn test_slash_inside_value_kept() {
        assert_eq!(clean_value("77/1 Soi 3"), Some("77/1 Soi 3".to_string()));
    }

    #[test]
    fn test_clean_in_place_reports_change() {
        let mut v = " Bangkok ".to_string();
        assert!(clean_in_place(&mut v));
        assert_eq!(v, "Bangkok");
        assert!(!clean_in_place(&mut v));
    }
}
