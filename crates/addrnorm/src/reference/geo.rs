//! Geographic reference index: canonical city names per country with a
//! prefix-bucket index for fuzzy-candidate narrowing.
//!
//! The index can be built from:
//! 1. The built-in table of common cities (`data/cities.tsv`)
//! 2. A GeoNames `cities*.txt` dump (tab separated, 19 columns)

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use once_cell::sync::OnceCell;

use crate::error::{AddrNormError, Result};
use crate::text::fold_key;

const CITIES_TSV: &str = include_str!("../../data/cities.tsv");

/// A canonical place name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CityRecord {
    pub name: String,
    pub population: u64,
}

/// Statistics about loaded reference data.
#[derive(Debug, Clone, Default)]
pub struct ReferenceStats {
    pub countries: usize,
    pub keys: usize,
    pub source: String,
}

/// Read-only country → {folded name → city} index.
#[derive(Debug, Default)]
pub struct GeoReference {
    cities: HashMap<String, HashMap<String, CityRecord>>,
    /// Country → 1-2 character prefix → sorted folded keys.
    prefixes: HashMap<String, HashMap<String, Vec<String>>>,
    /// Country → all folded keys, sorted.
    pools: HashMap<String, Vec<String>>,
    source: String,
}

/// Bucket key for a folded name: its first two characters (one when shorter).
pub fn prefix_bucket(key: &str) -> String {
    key.chars().take(2).collect()
}

impl GeoReference {
    /// Build from the embedded city table.
    pub fn builtin() -> Self {
        let mut builder = GeoReferenceBuilder::default();
        for line in CITIES_TSV.lines() {
            if line.starts_with('#') || line.trim().is_empty() {
                continue;
            }
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 3 {
                continue;
            }
            let population = cols[2].trim().parse().unwrap_or(0);
            let alternates = cols.get(3).copied().unwrap_or("").split(',');
            builder.add(cols[0], cols[1], population, alternates);
        }
        builder.build("built-in")
    }

    /// Build from a GeoNames cities dump.
    ///
    /// Columns used: 2 (name), 3 (ascii name), 4 (alternate names),
    /// 9 (country code) and 15 (population).
    pub fn from_geonames(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| AddrNormError::io(path, e))?;
        let reader = BufReader::new(file);
        let mut builder = GeoReferenceBuilder::default();

        for line in reader.lines() {
            let line = line.map_err(|e| AddrNormError::io(path, e))?;
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 15 {
                continue;
            }
            let population = cols[14].trim().parse().unwrap_or(0);
            let alternates = std::iter::once(cols[2]).chain(cols[3].split(','));
            builder.add(cols[8], cols[1], population, alternates);
        }

        let reference = builder.build(&format!("GeoNames: {}", path.display()));
        if reference.cities.is_empty() {
            return Err(AddrNormError::Config(format!(
                "no cities found in reference file {}",
                path.display()
            )));
        }
        Ok(reference)
    }

    /// Whether a country has any reference entries.
    pub fn has_country(&self, country_code: &str) -> bool {
        self.cities.contains_key(&country_code.to_uppercase())
    }

    /// Exact lookup by folded key.
    pub fn get(&self, country_code: &str, key: &str) -> Option<&CityRecord> {
        self.cities
            .get(&country_code.to_uppercase())
            .and_then(|m| m.get(key))
    }

    /// Candidate keys sharing the query's prefix bucket, or the whole
    /// country pool when that bucket is empty.
    pub fn candidates(&self, country_code: &str, key: &str) -> &[String] {
        let cc = country_code.to_uppercase();
        let bucket = self
            .prefixes
            .get(&cc)
            .and_then(|buckets| buckets.get(&prefix_bucket(key)))
            .filter(|keys| !keys.is_empty());
        match bucket {
            Some(keys) => keys.as_slice(),
            None => self.pools.get(&cc).map(Vec::as_slice).unwrap_or(&[]),
        }
    }

    pub fn stats(&self) -> ReferenceStats {
        ReferenceStats {
            countries: self.cities.len(),
            keys: self.cities.values().map(HashMap::len).sum(),
            source: self.source.clone(),
        }
    }
}

#[derive(Default)]
struct GeoReferenceBuilder {
    cities: HashMap<String, HashMap<String, CityRecord>>,
}

impl GeoReferenceBuilder {
    fn add<'a>(
        &mut self,
        country_code: &str,
        name: &'a str,
        population: u64,
        alternates: impl Iterator<Item = &'a str>,
    ) {
        let cc = country_code.trim().to_uppercase();
        let name = name.trim();
        if cc.is_empty() || name.is_empty() {
            return;
        }
        let record = CityRecord {
            name: name.to_string(),
            population,
        };
        let by_key = self.cities.entry(cc).or_default();
        for spelling in std::iter::once(name).chain(alternates) {
            let key = fold_key(spelling);
            if key.is_empty() {
                continue;
            }
            let keep_existing = by_key
                .get(&key)
                .is_some_and(|existing| existing.population >= population);
            if !keep_existing {
                by_key.insert(key, record.clone());
            }
        }
    }

    fn build(self, source: &str) -> GeoReference {
        let mut prefixes: HashMap<String, HashMap<String, Vec<String>>> = HashMap::new();
        let mut pools = HashMap::new();
        for (cc, by_key) in &self.cities {
            let mut all: Vec<String> = by_key.keys().cloned().collect();
            all.sort();
            let buckets = prefixes.entry(cc.clone()).or_default();
            for key in &all {
                buckets.entry(prefix_bucket(key)).or_default().push(key.clone());
            }
            pools.insert(cc.clone(), all);
        }
        GeoReference {
            cities: self.cities,
            prefixes,
            pools,
            source: source.to_string(),
        }
    }
}

/// Reference index built on first use and shared read-only afterwards.
pub struct LazyReference {
    cell: OnceCell<GeoReference>,
    loader: Box<dyn Fn() -> GeoReference + Send + Sync>,
}

impl LazyReference {
    /// Lazily build the embedded city table.
    pub fn builtin() -> Self {
        Self::with_loader(GeoReference::builtin)
    }

    /// Lazily build with a custom loader.
    pub fn with_loader(loader: impl Fn() -> GeoReference + Send + Sync + 'static) -> Self {
        Self {
            cell: OnceCell::new(),
            loader: Box::new(loader),
        }
    }

    /// Wrap an index that is already built.
    pub fn ready(reference: GeoReference) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(reference);
        Self {
            cell,
            loader: Box::new(GeoReference::default),
        }
    }

    /// The index, building it on the first call.
    pub fn get(&self) -> &GeoReference {
        self.cell.get_or_init(|| (self.loader)())
    }

    /// Whether the index has been built yet.
    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl std::fmt::Debug for LazyReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyReference")
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
