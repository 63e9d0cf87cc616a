//! Address extraction: splitting free-form address text into fields.
//!
//! Text is sent to an external parsing service (see [`LibpostalClient`])
//! when one is configured; any failure or empty answer falls back to the
//! local [`HeuristicParser`]. Lookups for one batch run on a bounded pool
//! of worker threads and are applied to records only after every worker
//! has finished.
//!
//! # Example
//!
//! ```no_run
//! use addrnorm::extract::{ExtractionConfig, Extractor};
//!
//! let config = ExtractionConfig::default().with_parser_url("http://localhost:8080/parser");
//! let extractor = Extractor::new(config).unwrap();
//! let parsed = extractor.resolve("77/1 Sukhumvit Road, Bangkok 10110");
//! println!("zip: {:?}", parsed.get("zip"));
//! ```

mod heuristic;
mod libpostal;
mod mock;
mod parser;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

pub use heuristic::HeuristicParser;
pub use libpostal::{DEFAULT_TIMEOUT, LibpostalClient, LibpostalConfig};
pub use mock::MockParser;
pub use parser::{AddressParser, ParsedAddress};

use crate::error::Result;
use crate::record::{Field, Record};
use crate::text::folded_eq;

/// How extracted components are merged into records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionMode {
    /// No extraction unless another option requests it.
    Off,
    /// Fill only fields that are empty.
    #[default]
    FillMissingOnly,
    /// Overwrite fields with extracted values.
    ExtractAllToFill,
}

impl FromStr for ExtractionMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "off" | "none" => Ok(ExtractionMode::Off),
            "fill-missing-only" => Ok(ExtractionMode::FillMissingOnly),
            "extract-all-to-fill" => Ok(ExtractionMode::ExtractAllToFill),
            _ => Err(format!(
                "Unknown mode: {}. Use off, fill-missing-only or extract-all-to-fill.",
                s
            )),
        }
    }
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionMode::Off => write!(f, "off"),
            ExtractionMode::FillMissingOnly => write!(f, "fill-missing-only"),
            ExtractionMode::ExtractAllToFill => write!(f, "extract-all-to-fill"),
        }
    }
}

/// Extraction settings for a job.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    pub mode: ExtractionMode,
    /// Only compose street from the address, leaving other fields alone.
    pub street_from_address: bool,
    /// Also extract rows without address text, from their joined fields.
    pub always_extract: bool,
    /// Worker threads per batch.
    pub concurrency: usize,
    /// Primary parsing service endpoint; `None` uses the heuristic only.
    pub parser_url: Option<String>,
    pub alternate_url: Option<String>,
    pub timeout: Duration,
    pub max_attempts: u32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            mode: ExtractionMode::default(),
            street_from_address: false,
            always_extract: false,
            concurrency: 1,
            parser_url: None,
            alternate_url: None,
            timeout: DEFAULT_TIMEOUT,
            max_attempts: 3,
        }
    }
}

impl ExtractionConfig {
    pub fn with_mode(mut self, mode: ExtractionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_parser_url(mut self, url: impl Into<String>) -> Self {
        self.parser_url = Some(url.into());
        self
    }

    pub fn with_concurrency(mut self, workers: usize) -> Self {
        self.concurrency = workers.max(1);
        self
    }

    pub fn with_street_from_address(mut self, enabled: bool) -> Self {
        self.street_from_address = enabled;
        self
    }

    pub fn with_always_extract(mut self, enabled: bool) -> Self {
        self.always_extract = enabled;
        self
    }

    /// Whether any option asks for extraction.
    pub fn is_active(&self) -> bool {
        self.mode != ExtractionMode::Off || self.street_from_address || self.always_extract
    }
}

/// What applying one parse result did to a record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Fields written: (field, before, after).
    pub filled: Vec<(Field, String, String)>,
    /// Populated fields kept although the address disagreed.
    pub conflicts: Vec<Field>,
    /// Region cleared because it repeated locality.
    pub echo_cleared: bool,
}

/// Targets filled from parsed components, in application order.
const FILL_TARGETS: &[(Field, &str)] = &[
    (Field::Street, "road"),
    (Field::Locality, "city"),
    (Field::District, "suburb"),
    (Field::Region, "state"),
    (Field::Country, "country"),
    (Field::Zip, "zip"),
];

/// Resolves address text and merges the result into records.
pub struct Extractor {
    config: ExtractionConfig,
    remote: Option<Arc<dyn AddressParser>>,
    heuristic: HeuristicParser,
}

impl Extractor {
    /// Build from configuration, connecting to the parsing service if a URL
    /// is set.
    pub fn new(config: ExtractionConfig) -> Result<Self> {
        let remote: Option<Arc<dyn AddressParser>> = match config.parser_url.as_deref() {
            Some(url) if !url.trim().is_empty() => {
                let mut client_config = LibpostalConfig::new(url.trim())
                    .with_timeout(config.timeout)
                    .with_retries(config.max_attempts, Duration::from_millis(200));
                if let Some(alt) = &config.alternate_url {
                    client_config = client_config.with_alternate_url(alt.clone());
                }
                Some(Arc::new(LibpostalClient::new(client_config)?))
            }
            _ => None,
        };
        Ok(Self {
            config,
            remote,
            heuristic: HeuristicParser::new(),
        })
    }

    /// Use a specific parser in front of the heuristic.
    pub fn with_parser(config: ExtractionConfig, parser: Arc<dyn AddressParser>) -> Self {
        Self {
            config,
            remote: Some(parser),
            heuristic: HeuristicParser::new(),
        }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.config.is_active()
    }

    /// Parse one text, falling back to the heuristic on any failure.
    pub fn resolve(&self, text: &str) -> ParsedAddress {
        if let Some(remote) = &self.remote {
            match remote.parse(text) {
                Ok(parsed) if !parsed.is_empty() => return parsed,
                Ok(_) => debug!(parser = remote.name(), "empty parse, using heuristic"),
                Err(e) => debug!(parser = remote.name(), error = %e, "parser failed, using heuristic"),
            }
        }
        self.heuristic.split(text)
    }

    /// Rows of a batch that need extraction, as (batch index, text).
    pub fn work_items(&self, records: &[Record]) -> Vec<(usize, String)> {
        if !self.is_active() {
            return Vec::new();
        }
        records
            .iter()
            .enumerate()
            .filter_map(|(idx, record)| {
                let address = record.address.trim();
                if !address.is_empty() {
                    return Some((idx, address.to_string()));
                }
                if !self.config.always_extract {
                    return None;
                }
                let composed = synthetic_address(record);
                (!composed.is_empty()).then_some((idx, composed))
            })
            .collect()
    }

    /// Resolve every item with up to `concurrency` workers.
    ///
    /// Workers share a read-only job queue and send results back over a
    /// channel; the map is assembled after all of them have joined, so the
    /// result does not depend on the worker count.
    pub fn resolve_batch(&self, items: &[(usize, String)]) -> HashMap<usize, ParsedAddress> {
        let workers = self.config.concurrency.max(1).min(items.len());
        if workers <= 1 {
            return items
                .iter()
                .map(|(idx, text)| (*idx, self.resolve(text)))
                .collect();
        }

        let (job_tx, job_rx) = crossbeam_channel::unbounded::<&(usize, String)>();
        for item in items {
            // receiver is alive until the scope below ends
            let _ = job_tx.send(item);
        }
        drop(job_tx);

        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        thread::scope(|scope| {
            for _ in 0..workers {
                let jobs = job_rx.clone();
                let results = result_tx.clone();
                scope.spawn(move || {
                    for (idx, text) in jobs.iter() {
                        if results.send((*idx, self.resolve(text))).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(result_tx);

        let mut resolved = HashMap::with_capacity(items.len());
        for (idx, parsed) in result_rx.iter() {
            resolved.entry(idx).or_insert(parsed);
        }
        resolved
    }

    /// Merge one parse result into a record.
    pub fn apply(&self, record: &mut Record, parsed: &ParsedAddress) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();
        if parsed.is_empty() {
            return outcome;
        }

        if self.config.street_from_address {
            if !record.has(Field::Street) {
                let street = parsed.compose_street();
                if !street.is_empty() {
                    record.set(Field::Street, street.clone());
                    outcome.filled.push((Field::Street, String::new(), street));
                }
            }
        } else {
            // Only fill-missing-only keeps populated fields
            let overwrite = self.config.mode != ExtractionMode::FillMissingOnly;
            for &(field, component) in FILL_TARGETS {
                let value = if field == Field::Street {
                    parsed.compose_street()
                } else {
                    parsed.get(component).unwrap_or("").to_string()
                };
                if value.is_empty() {
                    continue;
                }

                let current = record.get(field);
                if !overwrite && !current.is_empty() {
                    let compared = matches!(field, Field::Locality | Field::Region | Field::Country);
                    if compared && !folded_eq(current, &value) {
                        outcome.conflicts.push(field);
                    }
                    continue;
                }

                if matches!(field, Field::Locality | Field::Region) {
                    if let Some(name) = &record.person_name {
                        if folded_eq(name, &value) {
                            continue;
                        }
                    }
                }

                if current != value {
                    let before = record.take(field);
                    record.set(field, value.clone());
                    outcome.filled.push((field, before, value));
                }
            }
        }

        if record.has(Field::Locality) && folded_eq(record.get(Field::Locality), record.get(Field::Region)) {
            record.take(Field::Region);
            outcome.echo_cleared = true;
        }
        outcome
    }
}

/// Non-empty fields joined in canonical order (zip before country).
fn synthetic_address(record: &Record) -> String {
    [
        Field::Street,
        Field::District,
        Field::Locality,
        Field::Region,
        Field::Zip,
        Field::Country,
    ]
    .iter()
    .map(|&f| record.get(f).trim())
    .filter(|v| !v.is_empty())
    .collect::<Vec<_>>()
    .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heuristic_only(mode: ExtractionMode) -> Extractor {
        Extractor::new(ExtractionConfig::default().with_mode(mode)).unwrap()
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("fill-missing-only".parse::<ExtractionMode>().unwrap(), ExtractionMode::FillMissingOnly);
        assert_eq!("EXTRACT_ALL_TO_FILL".parse::<ExtractionMode>().unwrap(), ExtractionMode::ExtractAllToFill);
        assert!("sometimes".parse::<ExtractionMode>().is_err());
        assert_eq!(ExtractionMode::Off.to_string(), "off");
    }

    #[test]
    fn test_work_items_selection() {
        let extractor = heuristic_only(ExtractionMode::FillMissingOnly);
        let records = vec![
            Record::new(1).with_address("77/1 Sukhumvit Road"),
            Record::new(2).with(Field::Locality, "Pattaya"),
        ];
        let items = extractor.work_items(&records);
        assert_eq!(items, vec![(0, "77/1 Sukhumvit Road".to_string())]);

        let off = heuristic_only(ExtractionMode::Off);
        assert!(off.work_items(&records).is_empty());
    }

    #[test]
    fn test_always_extract_composes_address() {
        let config = ExtractionConfig::default()
            .with_mode(ExtractionMode::Off)
            .with_always_extract(true);
        let extractor = Extractor::new(config).unwrap();
        let records = vec![Record::new(1)
            .with(Field::Street, "Soi 3")
            .with(Field::Country, "Thailand")
            .with(Field::Zip, "10110")];
        let items = extractor.work_items(&records);
        assert_eq!(items[0].1, "Soi 3, 10110, Thailand");
    }

    #[test]
    fn test_fill_missing_only_keeps_populated_and_counts_conflicts() {
        let extractor = heuristic_only(ExtractionMode::FillMissingOnly);
        let mut record = Record::new(1)
            .with(Field::Locality, "Pattaya")
            .with_address("77/1, Sukhumvit Road, Bangkok, 10110, Thailand");
        let parsed = extractor.resolve(&record.address.clone());
        let outcome = extractor.apply(&mut record, &parsed);

        assert_eq!(record.get(Field::Locality), "Pattaya");
        assert_eq!(record.get(Field::Zip), "10110");
        assert_eq!(record.get(Field::Country), "Thailand");
        assert_eq!(outcome.conflicts, vec![Field::Locality]);
        assert!(outcome.filled.iter().any(|(f, _, _)| *f == Field::Street));
    }

    #[test]
    fn test_extract_all_overwrites() {
        let extractor = heuristic_only(ExtractionMode::ExtractAllToFill);
        let mut record = Record::new(1)
            .with(Field::Locality, "Pattaya")
            .with_address("Soi 3, Bangkok, 10110");
        let parsed = extractor.resolve(&record.address.clone());
        extractor.apply(&mut record, &parsed);
        assert_eq!(record.get(Field::Locality), "Bangkok");
    }

    #[test]
    fn test_always_extract_with_mode_off_overwrites() {
        let config = ExtractionConfig::default()
            .with_mode(ExtractionMode::Off)
            .with_always_extract(true);
        let extractor = Extractor::new(config).unwrap();
        let mut record = Record::new(1)
            .with(Field::Locality, "Pattaya")
            .with(Field::Zip, "20150");
        let parsed = ParsedAddress::new().with("city", "Bangkok").with("zip", "10110");
        let outcome = extractor.apply(&mut record, &parsed);

        assert_eq!(record.get(Field::Locality), "Bangkok");
        assert_eq!(record.get(Field::Zip), "10110");
        assert!(outcome.conflicts.is_empty());
        assert_eq!(outcome.filled.len(), 2);
    }

    #[test]
    fn test_street_from_address_only_sets_empty_street() {
        let config = ExtractionConfig::default().with_street_from_address(true);
        let extractor = Extractor::new(config).unwrap();
        let parsed = ParsedAddress::new()
            .with("road", "Sukhumvit Road")
            .with("house_number", "77/1")
            .with("city", "Bangkok");

        let mut empty = Record::new(1);
        let outcome = extractor.apply(&mut empty, &parsed);
        assert_eq!(empty.get(Field::Street), "Sukhumvit Road, 77/1");
        assert_eq!(empty.get(Field::Locality), "");
        assert_eq!(outcome.filled.len(), 1);

        let mut filled = Record::new(2).with(Field::Street, "Soi 3");
        extractor.apply(&mut filled, &parsed);
        assert_eq!(filled.get(Field::Street), "Soi 3");
    }

    #[test]
    fn test_person_name_not_used_as_locality() {
        let extractor = heuristic_only(ExtractionMode::ExtractAllToFill);
        let mut record = Record::new(1);
        record.person_name = Some("Somchai Jaidee".to_string());
        let parsed = ParsedAddress::new()
            .with("city", "SOMCHAI JAIDEE")
            .with("state", "Chonburi");
        extractor.apply(&mut record, &parsed);
        assert_eq!(record.get(Field::Locality), "");
        assert_eq!(record.get(Field::Region), "Chonburi");
    }

    #[test]
    fn test_echo_cleared_after_fill() {
        let extractor = heuristic_only(ExtractionMode::FillMissingOnly);
        let mut record = Record::new(1).with(Field::Region, "Bangkok");
        let parsed = ParsedAddress::new().with("city", "bangkok");
        let outcome = extractor.apply(&mut record, &parsed);
        assert_eq!(record.get(Field::Locality), "bangkok");
        assert_eq!(record.get(Field::Region), "");
        assert!(outcome.echo_cleared);
    }

    #[test]
    fn test_failing_parser_falls_back_to_heuristic() {
        let mock = Arc::new(MockParser::failing());
        let extractor = Extractor::with_parser(ExtractionConfig::default(), mock.clone());
        let parsed = extractor.resolve("Soi 3, Pattaya, 20150");
        assert_eq!(parsed.get("zip"), Some("20150"));
        assert_eq!(mock.calls(), 1);
    }

    #[test]
    fn test_mock_answer_used() {
        let answer = ParsedAddress::new().with("city", "Chiang Mai");
        let mock = Arc::new(MockParser::new().with_response("somewhere", answer.clone()));
        let extractor = Extractor::with_parser(ExtractionConfig::default(), mock);
        assert_eq!(extractor.resolve("somewhere"), answer);
    }

    #[test]
    fn test_concurrent_resolution_matches_sequential() {
        let items: Vec<(usize, String)> = (0..40)
            .map(|i| (i, format!("{} Soi {}, Bangkok, 10{:03}, Thailand", i + 1, i, i)))
            .collect();
        let sequential = heuristic_only(ExtractionMode::FillMissingOnly).resolve_batch(&items);
        let concurrent = Extractor::new(ExtractionConfig::default().with_concurrency(8))
            .unwrap()
            .resolve_batch(&items);
        assert_eq!(sequential.len(), 40);
        assert_eq!(sequential, concurrent);
    }
}
