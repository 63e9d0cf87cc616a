//! Property-based tests for the cleaning, normalization and validation stages.
//!
//! # Running Property Tests
//!
//! ```bash
//! cargo test -p addrnorm --test property_tests
//!
//! # More cases
//! PROPTEST_CASES=10000 cargo test -p addrnorm --test property_tests
//! ```

use std::sync::Arc;

use proptest::prelude::*;

use addrnorm::reference::{CountryTable, LazyReference};
use addrnorm::text::folded_eq;
use addrnorm::validate::{rank_candidates, similarity};
use addrnorm::{
    Field, Normalizer, Record, RuleSet, ValidationConfig, ValidationFlag, ValidationMode,
    Validator, clean_value,
};

// =============================================================================
// Test Strategies
// =============================================================================

/// Messy cell values: punctuation at the edges, odd whitespace, accents.
fn messy_value() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9 ,;/._\\-\t]{0,40}",
        "[ ,;.\\-]{0,3}[A-Za-zéüñøç ]{1,20}[ ,;.\\-]{0,3}",
        "[ \u{00A0}\u{2003}]{0,2}(nan|NULL|None|-|n/a|N/A)[ \u{00A0}]{0,2}",
        "[A-Za-z]{1,10}[\u{FF10}-\u{FF19}\u{FF21}-\u{FF3A}]{1,5}",
    ]
}

/// Flip the case of characters selected by the mask.
fn recase(value: &str, mask: &[bool]) -> String {
    value
        .chars()
        .zip(mask.iter().cycle())
        .map(|(c, upper)| {
            if *upper {
                c.to_uppercase().collect::<String>()
            } else {
                c.to_lowercase().collect::<String>()
            }
        })
        .collect()
}

fn place_name() -> impl Strategy<Value = String> {
    prop::sample::select(vec![
        "Bangkok",
        "bangkok",
        "BANGKOK",
        "bkk",
        "Chiang Mai",
        "chiang mai",
        "Pattaya",
        "São Paulo",
        "Sao Paulo",
        "Zürich",
        "ZURICH",
        "Chonburi",
        "",
    ])
    .prop_map(str::to_string)
}

fn th_rules() -> RuleSet {
    RuleSet::from_profiles(&["base", "TH"], None)
}

fn validator(mode: ValidationMode, threshold: u32) -> Validator {
    let config = ValidationConfig::default()
        .with_mode(mode)
        .with_threshold(threshold);
    Validator::new(config, Arc::new(LazyReference::builtin()), &th_rules())
}

// =============================================================================
// Value Cleaner Properties
// =============================================================================

mod clean_tests {
    use super::*;

    proptest! {
        /// Cleaning twice equals cleaning once.
        #[test]
        fn clean_is_idempotent(input in messy_value()) {
            let once = clean_value(&input);
            let twice = once.as_deref().and_then(clean_value);
            prop_assert_eq!(once, twice);
        }

        /// Cleaned values never carry edge whitespace or separators.
        #[test]
        fn clean_trims_edges(input in messy_value()) {
            if let Some(cleaned) = clean_value(&input) {
                prop_assert!(!cleaned.is_empty());
                prop_assert_eq!(cleaned.trim(), cleaned.as_str());
                let last = cleaned.chars().last().unwrap();
                prop_assert!(!matches!(last, ',' | ';' | '-' | '.' | '/' | '_'));
            }
        }
    }
}

// =============================================================================
// Normalizer Properties
// =============================================================================

mod normalize_tests {
    use super::*;

    fn countries() -> Vec<(String, String)> {
        CountryTable::builtin()
            .iter()
            .map(|c| (c.name.clone(), c.alpha2.clone()))
            .collect()
    }

    #[test]
    fn every_country_name_resolves() {
        let normalizer = Normalizer::new(Arc::new(th_rules()));
        for (name, _) in countries() {
            let (_, code) = normalizer.normalize_country(&name);
            assert!(code.is_some(), "{} did not resolve", name);
        }
    }

    #[test]
    fn country_resolves_without_diacritics() {
        let normalizer = Normalizer::new(Arc::new(th_rules()));
        for (name, _) in countries() {
            let plain = addrnorm::text::fold_key(&name);
            assert_eq!(
                normalizer.normalize_country(&plain).1,
                normalizer.normalize_country(&name).1,
                "{} vs {}",
                name,
                plain
            );
        }
    }

    proptest! {
        /// Case never changes which country a name resolves to.
        #[test]
        fn country_code_ignores_case(
            (name, _) in prop::sample::select(countries()),
            mask in prop::collection::vec(any::<bool>(), 1..8),
        ) {
            let normalizer = Normalizer::new(Arc::new(th_rules()));
            let expected = normalizer.normalize_country(&name).1;
            let recased = recase(&name, &mask);
            prop_assert_eq!(normalizer.normalize_country(&recased).1, expected);
        }

        /// Locality and region never fold to the same value after normalization.
        #[test]
        fn echo_region_cleared(
            locality in place_name(),
            region in place_name(),
            country in prop::sample::select(vec!["Thailand", "", "Brazil"]),
        ) {
            let normalizer = Normalizer::new(Arc::new(th_rules()));
            let record = Record::new(1)
                .with(Field::Locality, locality)
                .with(Field::Region, region)
                .with(Field::Country, country);
            let row = normalizer.normalize(&record);
            prop_assert!(!folded_eq(row.get(Field::Locality), row.get(Field::Region)));
        }

        /// Normalizing an already normalized row changes nothing.
        #[test]
        fn normalize_is_stable(
            locality in place_name(),
            region in place_name(),
            street in "[A-Za-z ]{0,12}(St|Rd|Road|Soi)?",
            zip in "[0-9A-Za-z ]{0,8}",
        ) {
            let normalizer = Normalizer::new(Arc::new(th_rules()));
            let mut record = Record::new(1)
                .with(Field::Street, street)
                .with(Field::Locality, locality)
                .with(Field::Region, region)
                .with(Field::Country, "thailand")
                .with(Field::Zip, zip);
            let first = normalizer.normalize(&record);
            first.apply_to(&mut record);
            let second = normalizer.normalize(&record);
            for field in Field::ALL {
                prop_assert_eq!(first.get(field), second.get(field));
            }
        }
    }
}

// =============================================================================
// Validator Properties
// =============================================================================

mod validate_tests {
    use super::*;

    /// A misspelling of a real Thai city: one character replaced, dropped or added.
    fn misspelled_city() -> impl Strategy<Value = String> {
        (
            prop::sample::select(vec!["Bangkok", "Chiang Mai", "Pattaya", "Phuket", "Hat Yai"]),
            0usize..16,
            prop::sample::select(vec!['a', 'e', 'g', 'k', 'o', 'x']),
            0u8..3,
        )
            .prop_map(|(city, pos, c, op)| {
                let mut chars: Vec<char> = city.chars().collect();
                let pos = pos % chars.len();
                match op {
                    0 => chars[pos] = c,
                    1 => {
                        chars.remove(pos);
                    }
                    _ => chars.insert(pos, c),
                }
                chars.into_iter().collect()
            })
    }

    fn accepted(locality: &str, threshold: u32) -> bool {
        let mut validator = validator(ValidationMode::Loose, threshold);
        let mut record = Record::new(1).with(Field::Locality, locality);
        validator
            .validate(&mut record, Some("TH"))
            .contains(&ValidationFlag::LocalityFuzzyFixed)
    }

    proptest! {
        /// A stricter threshold never accepts what a looser one rejected.
        #[test]
        fn fuzzy_threshold_is_monotonic(
            locality in misspelled_city(),
            low in 80u32..=100,
            high in 80u32..=100,
        ) {
            let (low, high) = (low.min(high), low.max(high));
            if accepted(&locality, high) {
                prop_assert!(accepted(&locality, low));
            }
            if !accepted(&locality, low) {
                prop_assert!(!accepted(&locality, high));
            }
        }

        /// Ranking is sorted by score and never returns weak candidates.
        #[test]
        fn ranking_is_sorted(
            key in "[a-z]{1,10}",
            candidates in prop::collection::vec("[a-z]{1,10}", 0..20),
            limit in 1usize..5,
        ) {
            let ranked = rank_candidates(&key, candidates.iter().map(String::as_str), limit);
            prop_assert!(ranked.len() <= limit);
            for pair in ranked.windows(2) {
                prop_assert!(pair[0].1 >= pair[1].1);
            }
            for (candidate, score) in &ranked {
                prop_assert!(*score >= 80);
                prop_assert_eq!(*score, similarity(&key, candidate));
            }
        }

        /// The scorer is symmetric and only exact matches reach 100.
        #[test]
        fn similarity_symmetric(a in "[a-z ]{0,12}", b in "[a-z ]{0,12}") {
            prop_assert_eq!(similarity(&a, &b), similarity(&b, &a));
            prop_assert_eq!(similarity(&a, &b) == 100, a == b);
        }

        /// Canonical rows pass every validation mode untouched.
        #[test]
        fn canonical_rows_untouched(
            (locality, region, zip) in prop::sample::select(vec![
                ("Bangkok", "", "10110"),
                ("Pattaya", "Chonburi", "20150"),
                ("Chiang Mai", "", "50200"),
                ("Phuket", "Phuket", "83000"),
                ("Hat Yai", "Songkhla", "90110"),
            ]),
            mode in prop::sample::select(vec![
                ValidationMode::Off,
                ValidationMode::Loose,
                ValidationMode::Strict,
            ]),
        ) {
            let mut validator = validator(mode, 90);
            let mut record = Record::new(1)
                .with(Field::Locality, locality)
                .with(Field::Region, region)
                .with(Field::Country, "Thailand")
                .with(Field::Zip, zip);
            let before = record.clone();
            let flags = validator.validate(&mut record, Some("TH"));
            prop_assert!(flags.is_empty(), "{:?}", flags);
            prop_assert_eq!(record, before);
        }
    }
}
