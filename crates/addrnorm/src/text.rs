//! Shared string helpers: folding keys, soft title-casing, basic cleanup.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Separator punctuation stripped from both ends of a value.
pub(crate) static EDGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\s,;/\-_.]+|[\s,;/\-_.]+$").unwrap());

static LATIN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z]").unwrap());

/// Letters that do not decompose into a base letter plus a combining mark.
fn fold_special(c: char) -> Option<&'static str> {
    match c {
        'ø' | 'Ø' => Some("o"),
        'ß' => Some("ss"),
        'æ' | 'Æ' => Some("ae"),
        'œ' | 'Œ' => Some("oe"),
        'đ' | 'Đ' => Some("d"),
        'ł' | 'Ł' => Some("l"),
        'ı' => Some("i"),
        'þ' | 'Þ' => Some("th"),
        _ => None,
    }
}

/// Case- and diacritic-insensitive comparison key.
///
/// `"  São   Paulo "` and `"sao paulo"` fold to the same key.
pub fn fold_key(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.nfkd() {
        if is_combining_mark(c) {
            continue;
        }
        match fold_special(c) {
            Some(s) => out.push_str(s),
            None => out.extend(c.to_lowercase()),
        }
    }
    collapse_ws(&out)
}

/// True when two values fold to the same non-empty key.
pub fn folded_eq(a: &str, b: &str) -> bool {
    let ka = fold_key(a);
    !ka.is_empty() && ka == fold_key(b)
}

/// Collapse whitespace runs into one space and trim.
pub fn collapse_ws(value: &str) -> String {
    WS_RE.replace_all(value, " ").trim().to_string()
}

/// Trim, strip edge punctuation and collapse whitespace.
pub fn cleanup_basic(value: &str) -> String {
    let trimmed = EDGE_RE.replace_all(value.trim(), "");
    collapse_ws(&trimmed)
}

/// Whether the value contains any ASCII Latin letter.
pub fn has_latin(value: &str) -> bool {
    LATIN_RE.is_match(value)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Soft title-casing for Latin-script values.
///
/// Words longer than two characters are capitalized, shorter ones
/// upper-cased (`"new york ny"` becomes `"New York NY"`). Values without
/// Latin letters are only trimmed.
pub fn smart_title(value: &str) -> String {
    if !has_latin(value) {
        return value.trim().to_string();
    }
    value
        .split_whitespace()
        .map(|word| {
            if word.chars().count() > 2 {
                capitalize(word)
            } else {
                word.to_uppercase()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
