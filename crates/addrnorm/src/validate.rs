//! Validation of normalized values against reference data.
//!
//! Zip codes are checked against per-country patterns, localities against
//! the geographic reference index, and regions against per-country
//! whitelists. `loose` mode repairs near misses with a deterministic
//! similarity score; `strict` only reports them (and clears bad zips).

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::record::{Field, Record};
use crate::reference::LazyReference;
use crate::rules::RuleSet;
use crate::text::fold_key;

/// Scores below this are never candidates.
const MIN_CANDIDATE_SCORE: u32 = 80;

/// Validation strictness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    Off,
    #[default]
    Loose,
    Strict,
}

impl FromStr for ValidationMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "off" => Ok(ValidationMode::Off),
            "loose" => Ok(ValidationMode::Loose),
            "strict" => Ok(ValidationMode::Strict),
            _ => Err(format!("Unknown validation mode: {}. Use off, loose or strict.", s)),
        }
    }
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationMode::Off => write!(f, "off"),
            ValidationMode::Loose => write!(f, "loose"),
            ValidationMode::Strict => write!(f, "strict"),
        }
    }
}

/// Validator settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationConfig {
    pub mode: ValidationMode,
    /// Minimum score (0-100) for an automatic repair.
    pub fuzzy_threshold: u32,
    /// Candidates kept per fuzzy lookup.
    pub max_candidates: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            mode: ValidationMode::Loose,
            fuzzy_threshold: 90,
            max_candidates: 3,
        }
    }
}

impl ValidationConfig {
    pub fn with_mode(mut self, mode: ValidationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.fuzzy_threshold = threshold.min(100);
        self
    }

    pub fn with_max_candidates(mut self, max: usize) -> Self {
        self.max_candidates = max.max(1);
        self
    }
}

/// Outcome markers raised while validating one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationFlag {
    BadZipFormat,
    ZipPatternError,
    LocalityFuzzyFixed,
    CityNotFound,
    RegionFuzzyFixed,
    RegionNotInWhitelist,
}

impl ValidationFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationFlag::BadZipFormat => "bad_zip_format",
            ValidationFlag::ZipPatternError => "zip_pattern_error",
            ValidationFlag::LocalityFuzzyFixed => "locality_fuzzy_fixed",
            ValidationFlag::CityNotFound => "city_not_found",
            ValidationFlag::RegionFuzzyFixed => "region_fuzzy_fixed",
            ValidationFlag::RegionNotInWhitelist => "region_not_in_whitelist",
        }
    }
}

impl fmt::Display for ValidationFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Similarity between two folded keys, 0-100.
///
/// Exact match scores 100, a prefix relation 92, a substring relation 88;
/// otherwise 85 minus 3 per character of length difference, floored at 0.
pub fn similarity(a: &str, b: &str) -> u32 {
    if a == b {
        100
    } else if a.starts_with(b) || b.starts_with(a) {
        92
    } else if a.contains(b) || b.contains(a) {
        88
    } else {
        let delta = a.chars().count().abs_diff(b.chars().count()) as u32;
        85u32.saturating_sub(delta * 3)
    }
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.chars().zip(b.chars()).take_while(|(x, y)| x == y).count()
}

/// Score and rank candidates for a folded key.
///
/// Candidates under the minimum score are dropped; the rest are ordered by
/// score, then common prefix length, then key, and truncated to `limit`.
pub fn rank_candidates<'a, I>(key: &str, candidates: I, limit: usize) -> Vec<(&'a str, u32)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut scored: Vec<(&str, u32, usize)> = candidates
        .into_iter()
        .map(|cand| (cand, similarity(key, cand), common_prefix_len(key, cand)))
        .filter(|(_, score, _)| *score >= MIN_CANDIDATE_SCORE)
        .collect();
    scored.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)).then(a.0.cmp(b.0)));
    scored.truncate(limit);
    scored.into_iter().map(|(cand, score, _)| (cand, score)).collect()
}

/// Remembered answer for a locality that missed the exact lookup.
#[derive(Debug, Clone)]
enum CachedLocality {
    Fixed(String),
    NotFound,
}

/// Per-country region whitelist with folded keys.
#[derive(Debug, Clone, Default)]
struct RegionWhitelist {
    /// Folded key → original spelling, sorted by key.
    entries: Vec<(String, String)>,
}

impl RegionWhitelist {
    fn new(regions: &[String]) -> Self {
        let mut entries: Vec<(String, String)> = Vec::with_capacity(regions.len());
        for region in regions {
            let key = fold_key(region);
            if !key.is_empty() && !entries.iter().any(|(k, _)| *k == key) {
                entries.push((key, region.clone()));
            }
        }
        entries.sort();
        Self { entries }
    }

    fn exact(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    fn original(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Checks and repairs normalized rows. Holds a locality cache for the
/// lifetime of the job.
#[derive(Debug)]
pub struct Validator {
    config: ValidationConfig,
    reference: Arc<LazyReference>,
    zip_patterns: HashMap<String, Option<Regex>>,
    whitelists: HashMap<String, RegionWhitelist>,
    cache: HashMap<(String, String), CachedLocality>,
}

impl Validator {
    pub fn new(config: ValidationConfig, reference: Arc<LazyReference>, rules: &RuleSet) -> Self {
        let mut zip_patterns = HashMap::new();
        for (cc, pattern) in rules.zip_patterns() {
            let compiled = match Regex::new(&format!("(?i)^(?:{})$", pattern)) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(country = %cc, error = %e, "invalid zip pattern");
                    None
                }
            };
            zip_patterns.insert(cc.clone(), compiled);
        }

        let whitelists = rules
            .region_lists()
            .iter()
            .filter(|(_, regions)| !regions.is_empty())
            .map(|(cc, regions)| (cc.clone(), RegionWhitelist::new(regions)))
            .collect();

        Self {
            config,
            reference,
            zip_patterns,
            whitelists,
            cache: HashMap::new(),
        }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Number of cached locality answers.
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Validate one normalized record in place.
    pub fn validate(&mut self, record: &mut Record, country_code: Option<&str>) -> Vec<ValidationFlag> {
        let mut flags = Vec::new();
        if self.config.mode == ValidationMode::Off {
            return flags;
        }
        let cc = country_code.map(str::to_uppercase);
        let cc = cc.as_deref();

        self.check_zip(record, cc, &mut flags);
        self.check_locality(record, cc, &mut flags);
        self.check_region(record, cc, &mut flags);
        flags
    }

    fn check_zip(&self, record: &mut Record, cc: Option<&str>, flags: &mut Vec<ValidationFlag>) {
        let zip = record.get(Field::Zip).trim();
        let (Some(cc), false) = (cc, zip.is_empty()) else {
            return;
        };
        match self.zip_patterns.get(cc) {
            None => {}
            Some(None) => flags.push(ValidationFlag::ZipPatternError),
            Some(Some(re)) => {
                if !re.is_match(zip) {
                    flags.push(ValidationFlag::BadZipFormat);
                    if self.config.mode == ValidationMode::Strict {
                        record.take(Field::Zip);
                    }
                }
            }
        }
    }

    fn check_locality(&mut self, record: &mut Record, cc: Option<&str>, flags: &mut Vec<ValidationFlag>) {
        let key = fold_key(record.get(Field::Locality));
        if key.is_empty() {
            return;
        }
        let cc = cc.unwrap_or("");
        let reference = self.reference.get();
        if reference.get(cc, &key).is_some() {
            return;
        }

        let cache_key = (cc.to_string(), key);
        if let Some(cached) = self.cache.get(&cache_key) {
            match cached {
                CachedLocality::Fixed(name) => {
                    record.set(Field::Locality, name.clone());
                    flags.push(ValidationFlag::LocalityFuzzyFixed);
                }
                CachedLocality::NotFound => flags.push(ValidationFlag::CityNotFound),
            }
            return;
        }

        let mut answer = CachedLocality::NotFound;
        if self.config.mode == ValidationMode::Loose && reference.has_country(cc) {
            let candidates = reference.candidates(cc, &cache_key.1).iter().map(String::as_str);
            let ranked = rank_candidates(&cache_key.1, candidates, self.config.max_candidates);
            if let Some(&(best, score)) = ranked.first() {
                if score >= self.config.fuzzy_threshold {
                    if let Some(city) = reference.get(cc, best) {
                        debug!(from = %record.get(Field::Locality), to = %city.name, score, "locality fixed");
                        answer = CachedLocality::Fixed(city.name.clone());
                    }
                }
            }
        }

        match &answer {
            CachedLocality::Fixed(name) => {
                record.set(Field::Locality, name.clone());
                flags.push(ValidationFlag::LocalityFuzzyFixed);
            }
            CachedLocality::NotFound => flags.push(ValidationFlag::CityNotFound),
        }
        self.cache.insert(cache_key, answer);
    }

    fn check_region(&self, record: &mut Record, cc: Option<&str>, flags: &mut Vec<ValidationFlag>) {
        let Some(whitelist) = cc.and_then(|cc| self.whitelists.get(cc)) else {
            return;
        };
        let key = fold_key(record.get(Field::Region));
        if key.is_empty() || whitelist.exact(&key) {
            return;
        }

        if self.config.mode == ValidationMode::Loose {
            let ranked = rank_candidates(
                &key,
                whitelist.entries.iter().map(|(k, _)| k.as_str()),
                self.config.max_candidates,
            );
            if let Some(&(best, score)) = ranked.first() {
                if score >= self.config.fuzzy_threshold {
                    if let Some(original) = whitelist.original(best) {
                        record.set(Field::Region, original);
                        flags.push(ValidationFlag::RegionFuzzyFixed);
                        return;
                    }
                }
            }
        }
        flags.push(ValidationFlag::RegionNotInWhitelist);
    }
}
