//! Fuzz target for the per-row stages.
//!
//! Arbitrary text goes through cleaning, the local splitter, realignment,
//! normalization and validation. None of them may panic, and cleaning
//! must stay idempotent.

#![no_main]

use std::sync::{Arc, LazyLock};

use addrnorm::extract::HeuristicParser;
use addrnorm::realign::{promote_address_like, repair_misaligned};
use addrnorm::reference::LazyReference;
use addrnorm::{
    Field, Normalizer, Record, RuleSet, ValidationConfig, ValidationMode, Validator, clean_value,
};
use libfuzzer_sys::fuzz_target;

static RULES: LazyLock<Arc<RuleSet>> =
    LazyLock::new(|| Arc::new(RuleSet::from_profiles(&["base", "TH"], None)));

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    if input.len() > 4_096 {
        return;
    }

    let once = clean_value(input);
    assert_eq!(once.as_deref().and_then(clean_value), once);

    let parsed = HeuristicParser::new().split(input);
    let _ = parsed.compose_street();

    let mut record = Record::new(1)
        .with(Field::Street, parsed.get("road").unwrap_or(input))
        .with(Field::Locality, parsed.get("city").unwrap_or(""))
        .with(Field::Region, input)
        .with(Field::Country, parsed.get("country").unwrap_or(""))
        .with(Field::Zip, parsed.get("zip").unwrap_or(input));
    promote_address_like(&mut record);
    repair_misaligned(&mut record);

    let normalizer = Normalizer::new(Arc::clone(&RULES));
    let row = normalizer.normalize(&record);
    row.apply_to(&mut record);

    let config = ValidationConfig::default()
        .with_mode(ValidationMode::Strict)
        .with_threshold(85);
    let mut validator = Validator::new(config, Arc::new(LazyReference::builtin()), &RULES);
    let _ = validator.validate(&mut record, row.country_code.as_deref());
});
