//! Deterministic local address splitter used when no parsing service is
//! configured or it cannot answer.

use once_cell::sync::Lazy;
use regex::Regex;

use super::parser::{AddressParser, ParsedAddress};
use crate::error::Result;

static SEGMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,;]").unwrap());

static NUMERIC_POSTAL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{4,6}\b").unwrap());

static HOUSE_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d+[A-Za-z]?(?:/\d+[A-Za-z]?)?\b").unwrap());

static UNIT_SEGMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:unit|apt|apartment|room|rm|suite|ste|floor|fl|flr|level|lvl|bldg|building|block|blk)\.?\s*#?\s*[A-Za-z]?\d[A-Za-z0-9/\-]*$",
    )
    .unwrap()
});

/// Mixed letter/digit postal token such as `SW1A` or `H3Z-2Y7`.
fn is_mixed_postal(token: &str) -> bool {
    let len = token.chars().count();
    (3..=10).contains(&len)
        && token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        && token.chars().any(|c| c.is_ascii_digit())
        && token.chars().any(|c| c.is_ascii_alphabetic())
}

fn strip_token(segment: &str, token: &str) -> String {
    segment
        .replacen(token, "", 1)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Splits on commas and semicolons and assigns segments by position.
///
/// Slashes are not separators, so house numbers like `77/1` survive.
#[derive(Debug, Clone, Default)]
pub struct HeuristicParser;

impl HeuristicParser {
    pub fn new() -> Self {
        Self
    }

    /// Split an address into components. Never fails.
    pub fn split(&self, text: &str) -> ParsedAddress {
        let mut segments: Vec<String> = SEGMENT_RE
            .split(text)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if segments.is_empty() {
            return ParsedAddress::new();
        }

        let mut parsed = ParsedAddress::new();

        let zip = take_postal_code(&mut segments);
        if let Some(zip) = &zip {
            parsed = parsed.with("zip", zip.clone());
        }

        let units: Vec<String> = segments
            .iter()
            .filter(|s| UNIT_SEGMENT_RE.is_match(s))
            .cloned()
            .collect();
        segments.retain(|s| !UNIT_SEGMENT_RE.is_match(s));
        if !units.is_empty() {
            parsed = parsed.with("unit", units.join(", "));
        }

        match segments.len() {
            0 => {}
            1 => parsed = parsed.with("road", segments[0].clone()),
            2 => {
                parsed = parsed
                    .with("road", segments[0].clone())
                    .with("city", segments[1].clone());
            }
            n => {
                parsed = parsed
                    .with("road", segments[..n - 2].join(", "))
                    .with("city", segments[n - 2].clone())
                    .with("country", segments[n - 1].clone());
            }
        }

        let house_number = HOUSE_NUMBER_RE
            .find_iter(text)
            .map(|m| m.as_str())
            .find(|candidate| zip.as_deref() != Some(*candidate));
        if let Some(number) = house_number {
            parsed = parsed.with("house_number", number);
        }

        parsed
    }
}

/// Find and remove the postal code, scanning segments from the end.
///
/// A 4-6 digit number wins; otherwise a mixed letter/digit token in the
/// last segment. In the first segment of a multi-segment address a number
/// only counts when it is the whole segment, so a leading house number is
/// not mistaken for a postal code.
fn take_postal_code(segments: &mut Vec<String>) -> Option<String> {
    let count = segments.len();
    for idx in (0..count).rev() {
        let segment = &segments[idx];
        let Some(found) = NUMERIC_POSTAL_RE.find(segment) else {
            continue;
        };
        let token = found.as_str().to_string();
        if idx == 0 && count > 1 && segment.trim() != token {
            continue;
        }
        consume(segments, idx, &token);
        return Some(token);
    }

    let last = count - 1;
    let token = segments[last]
        .split_whitespace()
        .rev()
        .find(|t| is_mixed_postal(t))
        .map(str::to_string)?;
    if last == 0 && segments[last].trim() != token {
        return None;
    }
    consume(segments, last, &token);
    Some(token.to_uppercase())
}

fn consume(segments: &mut Vec<String>, idx: usize, token: &str) {
    let rest = strip_token(&segments[idx], token);
    if rest.is_empty() {
        segments.remove(idx);
    } else {
        segments[idx] = rest;
    }
}

impl AddressParser for HeuristicParser {
    fn parse(&self, text: &str) -> Result<ParsedAddress> {
        Ok(self.split(text))
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}
