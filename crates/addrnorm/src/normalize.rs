//! Field normalization: country resolution, alias tables, street cleanup,
//! zip extraction and locality/region echo suppression.
//!
//! Country is resolved first because its code scopes the alias lookups of
//! every other place field. The code is returned with the normalized values
//! instead of being stored anywhere shared.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::io::{EMAIL_RE, PHONE_RE};
use crate::record::{Field, Record};
use crate::reference::CountryTable;
use crate::rules::RuleSet;
use crate::text::{cleanup_basic, collapse_ws, folded_eq, smart_title};

static HASHTAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#\w+").unwrap());

static UNIT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:FL|FLOOR|LVL|LEVEL|RM|ROOM|APT|SUITE|STE|UNIT|BLDG|BLK|BLOCK)\b\.?\s*#?\s*\d+[A-Z\-/]*",
    )
    .unwrap()
});

static UNIT_WORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:FLOOR|LVL|LEVEL|RM|ROOM|APT|SUITE|STE|UNIT)\b\.?").unwrap()
});

static SEPARATOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*[,;][\s,;]*").unwrap());

static NON_ADDRESSY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z]{2,}$").unwrap());

static TOKEN_SPLIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s,;./\\\-]+").unwrap());

static NUMERIC_ZIP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{4,6}\b").unwrap());

static GENERIC_ZIP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z0-9\-]{3,10}$").unwrap());

/// Result of normalizing one record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedRow {
    /// Values in [`Field::ALL`] order.
    pub values: [String; 6],
    /// Alpha-2 code of the resolved country.
    pub country_code: Option<String>,
}

impl NormalizedRow {
    pub fn get(&self, field: Field) -> &str {
        &self.values[field as usize]
    }

    fn set(&mut self, field: Field, value: String) {
        self.values[field as usize] = value;
    }

    /// Write the values into a record, returning the fields that changed
    /// as (field, before, after).
    pub fn apply_to(&self, record: &mut Record) -> Vec<(Field, String, String)> {
        let mut changes = Vec::new();
        for field in Field::ALL {
            let after = self.get(field);
            if record.get(field) != after {
                let before = record.take(field);
                record.set(field, after);
                changes.push((field, before, after.to_string()));
            }
        }
        changes
    }
}

/// Rewrites the six canonical fields according to a rule set.
#[derive(Debug, Clone)]
pub struct Normalizer {
    rules: Arc<RuleSet>,
    countries: &'static CountryTable,
}

impl Normalizer {
    pub fn new(rules: Arc<RuleSet>) -> Self {
        Self {
            rules,
            countries: CountryTable::builtin(),
        }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Normalize every canonical field of a record.
    pub fn normalize(&self, record: &Record) -> NormalizedRow {
        let mut row = NormalizedRow::default();

        let (country, code) = self.normalize_country(record.get(Field::Country));
        row.set(Field::Country, country);
        row.country_code = code;

        for field in [Field::Region, Field::Locality, Field::District] {
            let value = self.normalize_place(field, record.get(field), row.country_code.as_deref());
            row.set(field, value);
        }

        row.set(Field::Street, self.normalize_street(record.get(Field::Street)));
        row.set(Field::Zip, normalize_zip(record.get(Field::Zip)));

        if self.rules.flags().fix_echo_locality_region
            && folded_eq(row.get(Field::Locality), row.get(Field::Region))
        {
            row.set(Field::Region, String::new());
        }
        row
    }

    /// Resolve a country value to its display name and alpha-2 code.
    ///
    /// Unresolved values are soft title-cased and carry no code.
    pub fn normalize_country(&self, raw: &str) -> (String, Option<String>) {
        let base = cleanup_basic(raw);
        if base.is_empty() {
            return (String::new(), None);
        }

        let mut key = base.to_lowercase();
        for suffix in self.rules.stop_country_suffixes() {
            let suffix = suffix.to_lowercase();
            if let Some(stripped) = key.strip_suffix(suffix.as_str()) {
                key = stripped.trim().to_string();
            }
        }
        if let Some(alias) = self.rules.country_alias(&key) {
            key = alias.to_string();
        }

        // Edge cleanup eats the final dot of names like "Virgin Islands, U.S."
        let found = self
            .countries
            .lookup(&key)
            .or_else(|| self.countries.lookup(raw.trim()));
        match found {
            Some(country) => (
                country.display_name().to_string(),
                Some(country.alpha2.clone()),
            ),
            None => (smart_title(&key), None),
        }
    }

    /// Alias lookup and title-casing for district, locality or region.
    pub fn normalize_place(&self, field: Field, raw: &str, country_code: Option<&str>) -> String {
        let mut value = cleanup_basic(raw);
        if value.is_empty() {
            return value;
        }
        if let Some(alias) = self.rules.place_alias(field, &value.to_lowercase()) {
            value = alias.to_string();
        }
        if let Some(cc) = country_code {
            if let Some(alias) = self.rules.scoped_place_alias(field, cc, &value.to_lowercase()) {
                value = alias.to_string();
            }
        }
        smart_title(&value)
    }

    /// Clean a street line.
    pub fn normalize_street(&self, raw: &str) -> String {
        if !raw.chars().any(char::is_alphabetic) {
            return String::new();
        }
        let flags = self.rules.flags();
        let mut value = raw.to_string();

        if flags.drop_emails_phones_from_street {
            value = EMAIL_RE.replace_all(&value, " ").into_owned();
            value = PHONE_RE.replace_all(&value, " ").into_owned();
            value = HASHTAG_RE.replace_all(&value, " ").into_owned();
        }
        if flags.drop_unit_attrs {
            value = UNIT_RE.replace_all(&value, " ").into_owned();
            value = UNIT_WORD_RE.replace_all(&value, " ").into_owned();
        }

        value = SEPARATOR_RE.replace_all(&value, ", ").into_owned();
        value = cleanup_basic(&value);

        if flags.drop_non_addressy_single_tokens && NON_ADDRESSY_RE.is_match(&value) {
            return String::new();
        }
        let addressy = TOKEN_SPLIT_RE
            .split(&value)
            .any(|token| token.chars().filter(|c| c.is_alphabetic()).count() >= 3);
        if !addressy {
            return String::new();
        }

        if self.rules.has_street_suffixes() {
            value = value
                .split(' ')
                .map(|token| self.map_suffix(token))
                .collect::<Vec<_>>()
                .join(" ");
        }
        smart_title(&collapse_ws(&value))
    }

    /// Replace a suffix token, keeping a trailing comma.
    fn map_suffix(&self, token: &str) -> String {
        let (word, tail) = match token.strip_suffix(',') {
            Some(word) => (word, ","),
            None => (token, ""),
        };
        let key = word.trim_end_matches('.').to_lowercase();
        match self.rules.street_suffix(&key) {
            Some(replacement) => format!("{}{}", replacement, tail),
            None => token.to_string(),
        }
    }
}

/// Upper-case and keep the first postal-code-shaped token.
///
/// A 4-6 digit number wins; otherwise the first whitespace token of 3-10
/// `A-Z0-9-` characters containing a digit. Anything else clears the zip.
pub fn normalize_zip(raw: &str) -> String {
    let upper = raw.trim().to_uppercase();
    if let Some(found) = NUMERIC_ZIP_RE.find(&upper) {
        return found.as_str().to_string();
    }
    upper
        .split_whitespace()
        .find(|token| GENERIC_ZIP_RE.is_match(token) && token.chars().any(|c| c.is_ascii_digit()))
        .map(str::to_string)
        .unwrap_or_default()
}
