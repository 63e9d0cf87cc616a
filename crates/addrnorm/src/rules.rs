//! Rule sets: alias tables, zip patterns, region whitelists and behavior
//! flags, merged from profile layers and an optional user rules document.
//!
//! Layers merge in order. Scalars overwrite, lists append without
//! duplicates and nested maps merge key by key.
//!
//! ```ignore
//! use addrnorm::rules::RuleSet;
//!
//! let rules = RuleSet::from_profiles(&["base", "TH"], None)
//!     .with_layer(RuleSet::load_user_rules("rules.yaml"));
//! ```

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AddrNormError, Result};
use crate::record::Field;
use crate::reference::CountryTable;

type AliasMap = IndexMap<String, String>;
type ScopedAliasMap = IndexMap<String, AliasMap>;

/// Profiles compiled into the binary, resolvable without a profiles directory.
const BUILTIN_PROFILES: &[(&str, &str)] = &[
    ("base", include_str!("../profiles/base.yml")),
    ("TH", include_str!("../profiles/TH.yml")),
];

/// Behavior switches for optional cleanup steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleFlags {
    /// Remove unit/apartment/floor designators from street.
    pub drop_unit_attrs: bool,
    /// Remove emails, phone numbers and hashtags from street.
    pub drop_emails_phones_from_street: bool,
    /// Clear region when it repeats locality.
    pub fix_echo_locality_region: bool,
    /// Clear a street consisting of a single bare word.
    pub drop_non_addressy_single_tokens: bool,
}

impl Default for RuleFlags {
    fn default() -> Self {
        Self {
            drop_unit_attrs: false,
            drop_emails_phones_from_street: false,
            fix_echo_locality_region: true,
            drop_non_addressy_single_tokens: false,
        }
    }
}

/// One partial configuration layer (a profile or the user rules).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleLayer {
    pub country_aliases: AliasMap,
    pub stop_country_suffixes: Vec<String>,
    pub locality_aliases: AliasMap,
    pub region_aliases: AliasMap,
    pub district_aliases: AliasMap,
    pub locality_aliases_by_country: ScopedAliasMap,
    pub region_aliases_by_country: ScopedAliasMap,
    pub district_aliases_by_country: ScopedAliasMap,
    pub street_suffix_normalization: AliasMap,
    pub zip_patterns: IndexMap<String, String>,
    pub region_lists_by_country: IndexMap<String, Vec<String>>,
    pub drop_unit_attrs: Option<bool>,
    pub drop_emails_phones_from_street: Option<bool>,
    pub fix_echo_locality_region: Option<bool>,
    pub drop_non_addressy_single_tokens: Option<bool>,
}

impl RuleLayer {
    /// Parse a YAML profile.
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }
}

/// The user-facing rules document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct UserRules {
    /// Country name → zip regex.
    country_zip_regex: IndexMap<String, String>,
    /// Place spelling → canonical spelling.
    synonyms: IndexMap<String, String>,
    drop_unit_attrs: Option<bool>,
    drop_emails_phones_from_street: Option<bool>,
    fix_echo_locality_region: Option<bool>,
    drop_non_addressy_single_tokens: Option<bool>,
}

impl UserRules {
    fn into_layer(self, countries: &CountryTable) -> RuleLayer {
        let mut zip_patterns = IndexMap::new();
        for (country, pattern) in self.country_zip_regex {
            let pattern = pattern.trim();
            if pattern.is_empty() {
                continue;
            }
            match countries.lookup(&country) {
                Some(c) => {
                    zip_patterns.insert(c.alpha2.clone(), pattern.to_string());
                }
                None => debug!(country = %country, "zip pattern for unknown country ignored"),
            }
        }

        let synonyms: AliasMap = self
            .synonyms
            .into_iter()
            .filter(|(k, v)| !k.trim().is_empty() && !v.trim().is_empty())
            .collect();

        RuleLayer {
            zip_patterns,
            locality_aliases: synonyms.clone(),
            region_aliases: synonyms,
            drop_unit_attrs: self.drop_unit_attrs,
            drop_emails_phones_from_street: self.drop_emails_phones_from_street,
            fix_echo_locality_region: self.fix_echo_locality_region,
            drop_non_addressy_single_tokens: self.drop_non_addressy_single_tokens,
            ..Default::default()
        }
    }
}

/// Fully merged, read-only rules for one job.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RuleSet {
    country_aliases: AliasMap,
    stop_country_suffixes: Vec<String>,
    locality_aliases: AliasMap,
    region_aliases: AliasMap,
    district_aliases: AliasMap,
    locality_aliases_by_country: ScopedAliasMap,
    region_aliases_by_country: ScopedAliasMap,
    district_aliases_by_country: ScopedAliasMap,
    street_suffix_normalization: AliasMap,
    zip_patterns: IndexMap<String, String>,
    region_lists_by_country: IndexMap<String, Vec<String>>,
    flags: RuleFlags,
    /// Names of layers merged so far, for the report.
    layers: Vec<String>,
}

fn merge_aliases(target: &mut AliasMap, source: AliasMap) {
    for (key, value) in source {
        let key = key.trim().to_lowercase();
        if !key.is_empty() {
            target.insert(key, value.trim().to_string());
        }
    }
}

fn merge_scoped(target: &mut ScopedAliasMap, source: ScopedAliasMap) {
    for (country, aliases) in source {
        merge_aliases(target.entry(country.trim().to_uppercase()).or_default(), aliases);
    }
}

fn append_unique(target: &mut Vec<String>, source: Vec<String>) {
    for item in source {
        let item = item.trim().to_string();
        if !item.is_empty() && !target.contains(&item) {
            target.push(item);
        }
    }
}

impl RuleSet {
    /// Empty rules with default flags.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one layer into this set.
    pub fn merge(&mut self, layer: RuleLayer) {
        merge_aliases(&mut self.country_aliases, layer.country_aliases);
        append_unique(&mut self.stop_country_suffixes, layer.stop_country_suffixes);
        merge_aliases(&mut self.locality_aliases, layer.locality_aliases);
        merge_aliases(&mut self.region_aliases, layer.region_aliases);
        merge_aliases(&mut self.district_aliases, layer.district_aliases);
        merge_scoped(&mut self.locality_aliases_by_country, layer.locality_aliases_by_country);
        merge_scoped(&mut self.region_aliases_by_country, layer.region_aliases_by_country);
        merge_scoped(&mut self.district_aliases_by_country, layer.district_aliases_by_country);
        merge_aliases(&mut self.street_suffix_normalization, layer.street_suffix_normalization);

        for (country, pattern) in layer.zip_patterns {
            self.zip_patterns.insert(country.trim().to_uppercase(), pattern);
        }
        for (country, regions) in layer.region_lists_by_country {
            append_unique(
                self.region_lists_by_country
                    .entry(country.trim().to_uppercase())
                    .or_default(),
                regions,
            );
        }

        if let Some(v) = layer.drop_unit_attrs {
            self.flags.drop_unit_attrs = v;
        }
        if let Some(v) = layer.drop_emails_phones_from_street {
            self.flags.drop_emails_phones_from_street = v;
        }
        if let Some(v) = layer.fix_echo_locality_region {
            self.flags.fix_echo_locality_region = v;
        }
        if let Some(v) = layer.drop_non_addressy_single_tokens {
            self.flags.drop_non_addressy_single_tokens = v;
        }
    }

    /// Builder-style merge.
    pub fn with_layer(mut self, layer: RuleLayer) -> Self {
        self.merge(layer);
        self
    }

    /// Merge named profiles in order.
    ///
    /// `<dir>/<name>.yml` is preferred when a directory is given; otherwise
    /// the built-in profile of that name is used. Missing or unreadable
    /// profiles are skipped with a warning.
    pub fn from_profiles<S: AsRef<str>>(names: &[S], dir: Option<&Path>) -> Self {
        let mut rules = Self::new();
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() {
                continue;
            }
            match load_profile(name, dir) {
                Ok(layer) => {
                    rules.merge(layer);
                    rules.layers.push(name.to_string());
                }
                Err(e) => warn!(profile = name, error = %e, "profile not loaded"),
            }
        }
        rules
    }

    /// Parse a user rules document. JSON when `is_json`, YAML otherwise.
    pub fn parse_user_rules(content: &str, is_json: bool) -> Result<RuleLayer> {
        if content.trim().is_empty() {
            return Ok(RuleLayer::default());
        }
        let doc: UserRules = if is_json {
            serde_json::from_str(content)?
        } else {
            serde_yaml::from_str(content)?
        };
        Ok(doc.into_layer(CountryTable::builtin()))
    }

    /// Load a user rules file; any failure yields an empty layer.
    pub fn load_user_rules(path: impl AsRef<Path>) -> RuleLayer {
        let path = path.as_ref();
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let loaded = fs::read_to_string(path)
            .map_err(|e| AddrNormError::io(path, e))
            .and_then(|content| Self::parse_user_rules(&content, is_json));
        match loaded {
            Ok(layer) => layer,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "rules file not loaded");
                RuleLayer::default()
            }
        }
    }

    pub fn flags(&self) -> RuleFlags {
        self.flags
    }

    /// Mutable flags, for callers overriding profile values.
    pub fn flags_mut(&mut self) -> &mut RuleFlags {
        &mut self.flags
    }

    /// Names of the profiles merged into this set.
    pub fn layer_names(&self) -> &[String] {
        &self.layers
    }

    pub fn stop_country_suffixes(&self) -> &[String] {
        &self.stop_country_suffixes
    }

    /// Global country alias for a lower-cased key.
    pub fn country_alias(&self, key: &str) -> Option<&str> {
        self.country_aliases.get(key).map(String::as_str)
    }

    /// Alias for a place field, global table only.
    pub fn place_alias(&self, field: Field, key: &str) -> Option<&str> {
        let table = match field {
            Field::Locality => &self.locality_aliases,
            Field::Region => &self.region_aliases,
            Field::District => &self.district_aliases,
            _ => return None,
        };
        table.get(key).map(String::as_str)
    }

    /// Alias for a place field scoped to one country.
    pub fn scoped_place_alias(&self, field: Field, country_code: &str, key: &str) -> Option<&str> {
        let table = match field {
            Field::Locality => &self.locality_aliases_by_country,
            Field::Region => &self.region_aliases_by_country,
            Field::District => &self.district_aliases_by_country,
            _ => return None,
        };
        table
            .get(country_code)
            .and_then(|aliases| aliases.get(key))
            .map(String::as_str)
    }

    /// Replacement for a street suffix token (lower-case, no trailing dot).
    pub fn street_suffix(&self, token: &str) -> Option<&str> {
        self.street_suffix_normalization.get(token).map(String::as_str)
    }

    pub fn has_street_suffixes(&self) -> bool {
        !self.street_suffix_normalization.is_empty()
    }

    /// Configured zip patterns keyed by alpha-2 code.
    pub fn zip_patterns(&self) -> &IndexMap<String, String> {
        &self.zip_patterns
    }

    /// Region whitelists keyed by alpha-2 code.
    pub fn region_lists(&self) -> &IndexMap<String, Vec<String>> {
        &self.region_lists_by_country
    }
}

fn load_profile(name: &str, dir: Option<&Path>) -> Result<RuleLayer> {
    if let Some(dir) = dir {
        let path = dir.join(format!("{}.yml", name));
        if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| AddrNormError::io(&path, e))?;
            return RuleLayer::from_yaml(&content);
        }
    }
    let builtin = BUILTIN_PROFILES
        .iter()
        .find(|(n, _)| *n == name)
        .or_else(|| BUILTIN_PROFILES.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)));
    match builtin {
        Some((_, content)) => RuleLayer::from_yaml(content),
        None => Err(AddrNormError::Config(format!("unknown profile '{}'", name))),
    }
}
