//! Realignment of values that landed in the wrong column.
//!
//! Promotion moves a full address found in a single field into the
//! catch-all so the extractor can split it. Repair then drops values that
//! cannot belong to their column once a catch-all exists. Each pass runs
//! once per row, promotion first.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::record::{Field, Record};
use crate::reference::CountryTable;

static STREET_WORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:st|street|road|rd|ave|avenue|blvd|lane|ln|hwy|highway|rue|soi|jalan|jl|av|calle|via|str)\b",
    )
    .unwrap()
});

/// A letter followed later by a digit, or the reverse.
static GLUED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z].*\d|\d.*[A-Za-z]").unwrap());

static PURE_ZIP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4,6}$").unwrap());

/// Fields checked for a full address, in priority order.
const PROMOTION_ORDER: [Field; 4] = [Field::Region, Field::Street, Field::District, Field::Locality];

fn has_digit(value: &str) -> bool {
    value.chars().any(|c| c.is_ascii_digit())
}

/// Whether a value reads like a complete address line.
pub fn looks_like_address(value: &str) -> bool {
    value.matches(',').count() >= 2 || (has_digit(value) && STREET_WORD_RE.is_match(value))
}

/// Whether a value reads like a postal code.
pub fn looks_like_postal_code(value: &str) -> bool {
    let value = value.trim();
    if PURE_ZIP_RE.is_match(value) {
        return true;
    }
    let len = value.chars().count();
    (3..=10).contains(&len)
        && value.chars().all(|c| c.is_ascii_alphanumeric())
        && has_digit(value)
}

/// Move a full address from a canonical field into the catch-all.
///
/// Only runs while the catch-all is empty. Returns the field the address
/// was taken from.
pub fn promote_address_like(record: &mut Record) -> Option<Field> {
    if !record.address.trim().is_empty() {
        return None;
    }

    let street = record.get(Field::Street);
    if !street.is_empty()
        && looks_like_postal_code(record.get(Field::Locality))
        && (street.contains(',') || has_digit(street))
    {
        record.address = record.take(Field::Street);
        return Some(Field::Street);
    }

    let source = PROMOTION_ORDER
        .into_iter()
        .find(|&field| looks_like_address(record.get(field)))?;
    record.address = record.take(source);
    Some(source)
}

/// Clear values that cannot belong to their column.
///
/// Only runs when the catch-all holds text. Returns the fields that were
/// cleared or moved.
pub fn repair_misaligned(record: &mut Record) -> Vec<Field> {
    let mut touched = Vec::new();
    if record.address.trim().is_empty() {
        return touched;
    }
    let countries = CountryTable::builtin();

    if record.has(Field::Country) && countries.lookup(record.get(Field::Country).trim()).is_none() {
        record.take(Field::Country);
        touched.push(Field::Country);
    }
    if has_digit(record.get(Field::Region)) {
        record.take(Field::Region);
        touched.push(Field::Region);
    }
    if !record.has(Field::Country)
        && record.has(Field::District)
        && countries.lookup(record.get(Field::District).trim()).is_some()
    {
        let district = record.take(Field::District);
        record.set(Field::Country, district);
        touched.push(Field::District);
    }
    for field in [Field::Country, Field::Region, Field::District] {
        if GLUED_RE.is_match(record.get(field)) {
            record.take(field);
            if !touched.contains(&field) {
                touched.push(field);
            }
        }
    }
    touched
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_detection() {
        assert!(looks_like_address("a, b, c"));
        assert!(looks_like_address("123 Main St"));
        assert!(looks_like_address("Soi 11"));
        assert!(!looks_like_address("Main Street"));
        assert!(!looks_like_address("Stockholm 11"));
    }

    #[test]
    fn test_postal_code_detection() {
        assert!(looks_like_postal_code("10220"));
        assert!(looks_like_postal_code("SW1A"));
        assert!(!looks_like_postal_code("BKK"));
        assert!(!looks_like_postal_code("Bangkok"));
    }

    #[test]
    fn test_street_promoted() {
        let mut record = Record::new(1)
            .with(Field::Street, "123 Main St, Apt 4")
            .with(Field::Locality, "BKK");
        assert_eq!(promote_address_like(&mut record), Some(Field::Street));
        assert_eq!(record.address, "123 Main St, Apt 4");
        assert_eq!(record.get(Field::Street), "");
    }

    #[test]
    fn test_postal_locality_moves_street() {
        let mut record = Record::new(1)
            .with(Field::Street, "Rama IV, Silom")
            .with(Field::Locality, "10500");
        assert_eq!(promote_address_like(&mut record), Some(Field::Street));
        assert_eq!(record.address, "Rama IV, Silom");
    }

    #[test]
    fn test_region_checked_first() {
        let mut record = Record::new(1)
            .with(Field::Street, "9 Soi Nana")
            .with(Field::Region, "1 Road, Khlong Toei, Bangkok");
        assert_eq!(promote_address_like(&mut record), Some(Field::Region));
        assert_eq!(record.get(Field::Street), "9 Soi Nana");
    }

    #[test]
    fn test_no_promotion_with_address() {
        let mut record = Record::new(1)
            .with(Field::Street, "123 Main St")
            .with_address("somewhere");
        assert_eq!(promote_address_like(&mut record), None);
        assert_eq!(record.get(Field::Street), "123 Main St");
    }

    #[test]
    fn test_repair() {
        let mut record = Record::new(1)
            .with(Field::Country, "Sukhumvit")
            .with(Field::Region, "Bangkok 10110")
            .with(Field::District, "Thailand")
            .with_address("77/1 Sukhumvit Road");
        let touched = repair_misaligned(&mut record);
        assert_eq!(record.get(Field::Country), "Thailand");
        assert_eq!(record.get(Field::District), "");
        assert_eq!(record.get(Field::Region), "");
        assert_eq!(touched, vec![Field::Country, Field::Region, Field::District]);
    }

    #[test]
    fn test_repair_glued_district() {
        let mut record = Record::new(1)
            .with(Field::Country, "TH")
            .with(Field::District, "Bangrak2")
            .with_address("x");
        repair_misaligned(&mut record);
        assert_eq!(record.get(Field::Country), "TH");
        assert_eq!(record.get(Field::District), "");
    }

    #[test]
    fn test_repair_skipped_without_address() {
        let mut record = Record::new(1).with(Field::Country, "Narnia");
        assert!(repair_misaligned(&mut record).is_empty());
        assert_eq!(record.get(Field::Country), "Narnia");
    }
}
