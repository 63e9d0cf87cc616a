//! ISO 3166-1 country table with exact and diacritic-insensitive lookup.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::Serialize;

use crate::text::fold_key;

const COUNTRIES_TSV: &str = include_str!("../../data/countries.tsv");

/// One ISO 3166-1 entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Country {
    pub alpha2: String,
    pub alpha3: String,
    pub name: String,
    pub official_name: Option<String>,
    pub common_name: Option<String>,
}

impl Country {
    /// Name written to output: the common name when one exists.
    pub fn display_name(&self) -> &str {
        self.common_name.as_deref().unwrap_or(&self.name)
    }

    /// All spellings usable for name lookup.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str())
            .chain(self.official_name.as_deref())
            .chain(self.common_name.as_deref())
    }
}

/// Country lookup indexes over the built-in table.
#[derive(Debug)]
pub struct CountryTable {
    countries: Vec<Country>,
    /// Lower-cased codes and names.
    exact: HashMap<String, usize>,
    /// Folded names only.
    loose: HashMap<String, usize>,
}

static BUILTIN: Lazy<CountryTable> = Lazy::new(|| CountryTable::from_tsv(COUNTRIES_TSV));

impl CountryTable {
    /// Shared table built from the embedded ISO data.
    pub fn builtin() -> &'static CountryTable {
        &BUILTIN
    }

    fn from_tsv(content: &str) -> Self {
        let non_empty = |s: &str| {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        };

        let countries: Vec<Country> = content
            .lines()
            .filter(|line| !line.starts_with('#') && !line.trim().is_empty())
            .filter_map(|line| {
                let mut cols = line.split('\t');
                let alpha2 = non_empty(cols.next()?)?;
                let alpha3 = non_empty(cols.next()?)?;
                let name = non_empty(cols.next()?)?;
                Some(Country {
                    alpha2,
                    alpha3,
                    name,
                    official_name: cols.next().and_then(non_empty),
                    common_name: cols.next().and_then(non_empty),
                })
            })
            .collect();

        let mut exact = HashMap::new();
        let mut loose = HashMap::new();
        for (idx, country) in countries.iter().enumerate() {
            exact.entry(country.alpha2.to_lowercase()).or_insert(idx);
            exact.entry(country.alpha3.to_lowercase()).or_insert(idx);
            for name in country.names() {
                exact.entry(name.to_lowercase()).or_insert(idx);
                loose.entry(fold_key(name)).or_insert(idx);
            }
        }

        Self {
            countries,
            exact,
            loose,
        }
    }

    /// Exact, case-insensitive lookup by alpha-2, alpha-3 or any name.
    pub fn lookup_exact(&self, query: &str) -> Option<&Country> {
        let key = query.trim().to_lowercase();
        self.exact.get(&key).map(|&i| &self.countries[i])
    }

    /// Exact lookup first, then a diacritic-folded name match.
    pub fn lookup(&self, query: &str) -> Option<&Country> {
        if query.trim().is_empty() {
            return None;
        }
        self.lookup_exact(query)
            .or_else(|| self.loose.get(&fold_key(query)).map(|&i| &self.countries[i]))
    }

    /// Entry for an alpha-2 code.
    pub fn by_alpha2(&self, code: &str) -> Option<&Country> {
        let code = code.trim();
        if code.len() != 2 {
            return None;
        }
        self.lookup_exact(code)
    }

    /// Every entry in table order.
    pub fn iter(&self) -> impl Iterator<Item = &Country> {
        self.countries.iter()
    }

    pub fn len(&self) -> usize {
        self.countries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.countries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_loaded() {
        let table = CountryTable::builtin();
        assert!(table.len() >= 249);
    }

    #[test]
    fn test_lookup_by_code_and_name() {
        let table = CountryTable::builtin();
        assert_eq!(table.lookup("TH").unwrap().alpha2, "TH");
        assert_eq!(table.lookup("tha").unwrap().alpha2, "TH");
        assert_eq!(table.lookup("thailand").unwrap().alpha2, "TH");
        assert_eq!(table.lookup("Kingdom of Thailand").unwrap().alpha2, "TH");
        assert!(table.lookup("Atlantis").is_none());
        assert!(table.lookup("").is_none());
    }

    #[test]
    fn test_lookup_folds_diacritics() {
        let table = CountryTable::builtin();
        assert_eq!(table.lookup("Cote d'Ivoire").unwrap().alpha2, "CI");
        assert_eq!(table.lookup("CÔTE D'IVOIRE").unwrap().alpha2, "CI");
    }

    #[test]
    fn test_display_prefers_common_name() {
        let table = CountryTable::builtin();
        assert_eq!(table.lookup("VN").unwrap().display_name(), "Vietnam");
        assert_eq!(table.lookup("TH").unwrap().display_name(), "Thailand");
    }

    #[test]
    fn test_by_alpha2_rejects_other_lengths() {
        let table = CountryTable::builtin();
        assert!(table.by_alpha2("THA").is_none());
        assert_eq!(table.by_alpha2("na").unwrap().name, "Namibia");
    }
}
