//! Change tracking: per-field counters, conflict counters, unrecognized
//! values and a stratified sample of before/after diffs.
//!
//! The tracker is fed by the pipeline after each stage and written once at
//! the end of the job as `report.json` plus `<stem>.samples.txt`.

use std::collections::HashMap;
use std::fmt::{self, Write as _};
use std::fs::{self, File};
use std::io::{BufWriter, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{AddrNormError, Result};
use crate::record::Field;

/// Samples kept per (field, category) bucket.
pub const BUCKET_CAPACITY: usize = 6;
/// Samples written per field.
pub const SAMPLES_PER_FIELD: usize = 20;
/// Entries per top-unrecognized list.
pub const TOP_UNRECOGNIZED: usize = 10;
/// Distinct unrecognized values tracked per field before pruning.
pub const UNRECOGNIZED_LIMIT: usize = 4096;
/// Values kept after a prune, highest counts first.
const UNRECOGNIZED_RETAIN: usize = 1024;

const SAMPLE_SEED: u64 = 20_240_117;

/// Kind of change applied to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeCategory {
    Clean,
    Normalize,
    Extracted,
    Removed,
    FuzzyFixed,
}

impl ChangeCategory {
    /// Categories in sampling order.
    pub const ALL: [ChangeCategory; 5] = [
        ChangeCategory::Clean,
        ChangeCategory::Normalize,
        ChangeCategory::Extracted,
        ChangeCategory::Removed,
        ChangeCategory::FuzzyFixed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeCategory::Clean => "clean",
            ChangeCategory::Normalize => "normalize",
            ChangeCategory::Extracted => "extracted",
            ChangeCategory::Removed => "removed",
            ChangeCategory::FuzzyFixed => "fuzzy_fixed",
        }
    }
}

impl fmt::Display for ChangeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conflict counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conflict {
    LocalityVsAddress,
    RegionVsAddress,
    CountryVsAddress,
    ZipFormatFail,
    ZipPatternError,
}

impl Conflict {
    /// The conflict raised when extraction disagrees with a kept field.
    pub fn for_field(field: Field) -> Option<Self> {
        match field {
            Field::Locality => Some(Conflict::LocalityVsAddress),
            Field::Region => Some(Conflict::RegionVsAddress),
            Field::Country => Some(Conflict::CountryVsAddress),
            _ => None,
        }
    }
}

/// Per-field counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldCounters {
    pub total_changed: u64,
    pub clean: u64,
    pub normalize: u64,
    pub extracted: u64,
    pub removed: u64,
    pub fuzzy_fixed: u64,
    pub unchanged: u64,
}

impl FieldCounters {
    fn bump(&mut self, category: ChangeCategory) {
        let slot = match category {
            ChangeCategory::Clean => &mut self.clean,
            ChangeCategory::Normalize => &mut self.normalize,
            ChangeCategory::Extracted => &mut self.extracted,
            ChangeCategory::Removed => &mut self.removed,
            ChangeCategory::FuzzyFixed => &mut self.fuzzy_fixed,
        };
        *slot += 1;
        self.total_changed += 1;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConflictCounters {
    pub locality_vs_address: u64,
    pub region_vs_address: u64,
    pub country_vs_address: u64,
    pub zip_format_fail: u64,
    pub zip_pattern_error: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnrecognizedEntry {
    pub value: String,
    pub count: u64,
}

/// Input file metadata.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InputInfo {
    pub file: String,
    /// `sha256:<hex>` of the input file.
    pub sha256: Option<String>,
    pub rows_total: u64,
    pub chunk_size: usize,
    pub encoding: String,
    pub separator: String,
}

/// Job parameters.
#[derive(Debug, Clone, Serialize)]
pub struct RunInfo {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_sec: Option<f64>,
    pub mode: String,
    pub street_from_address: bool,
    pub always_extract: bool,
    pub profiles: Vec<String>,
    pub validate: String,
    pub fuzzy_threshold: u32,
    pub parser_url: Option<String>,
    pub concurrency: usize,
}

impl Default for RunInfo {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            duration_sec: None,
            mode: String::new(),
            street_from_address: false,
            always_extract: false,
            profiles: Vec::new(),
            validate: String::new(),
            fuzzy_threshold: 0,
            parser_url: None,
            concurrency: 1,
        }
    }
}

/// The job report written as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub input: InputInfo,
    pub run: RunInfo,
    pub counters: IndexMap<String, FieldCounters>,
    pub conflicts: ConflictCounters,
    pub top_unrecognized: IndexMap<String, Vec<UnrecognizedEntry>>,
    pub notes: Vec<String>,
}

impl Report {
    pub fn new(input: InputInfo, run: RunInfo) -> Self {
        let counters = Field::ALL
            .iter()
            .map(|f| (f.as_str().to_string(), FieldCounters::default()))
            .collect();
        let top_unrecognized = [Field::Locality, Field::Region, Field::Country]
            .iter()
            .map(|f| (f.as_str().to_string(), Vec::new()))
            .collect();
        Self {
            input,
            run,
            counters,
            conflicts: ConflictCounters::default(),
            top_unrecognized,
            notes: Vec::new(),
        }
    }

    /// Counters for one field.
    pub fn counters(&self, field: Field) -> &FieldCounters {
        &self.counters[field.as_str()]
    }

    /// Write as pretty JSON, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| AddrNormError::io(parent, e))?;
        }
        let file = File::create(path).map_err(|e| AddrNormError::io(path, e))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }
}

/// One recorded before/after diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeSample {
    pub row_id: usize,
    pub field: Field,
    pub category: ChangeCategory,
    pub before: String,
    pub after: String,
}

#[derive(Debug, Default)]
struct Bucket {
    seen: usize,
    items: Vec<ChangeSample>,
}

/// Fixed-capacity reservoir per (field, category).
///
/// Every bucket keeps a uniform sample of at most `capacity` changes no
/// matter how many are offered. The generator is seeded, so a job produces
/// the same samples on every run.
#[derive(Debug)]
pub struct SampleReservoir {
    capacity: usize,
    buckets: HashMap<(Field, ChangeCategory), Bucket>,
    rng: fastrand::Rng,
}

impl Default for SampleReservoir {
    fn default() -> Self {
        Self::new(BUCKET_CAPACITY)
    }
}

impl SampleReservoir {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            buckets: HashMap::new(),
            rng: fastrand::Rng::with_seed(SAMPLE_SEED),
        }
    }

    /// Offer one change to its bucket.
    pub fn offer(&mut self, sample: ChangeSample) {
        let bucket = self
            .buckets
            .entry((sample.field, sample.category))
            .or_default();
        bucket.seen += 1;
        if bucket.items.len() < self.capacity {
            bucket.items.push(sample);
        } else {
            let slot = self.rng.usize(..bucket.seen);
            if slot < self.capacity {
                bucket.items[slot] = sample;
            }
        }
    }

    /// Samples held for one bucket, ordered by row.
    pub fn bucket(&self, field: Field, category: ChangeCategory) -> Vec<&ChangeSample> {
        let mut items: Vec<&ChangeSample> = self
            .buckets
            .get(&(field, category))
            .map(|b| b.items.iter().collect())
            .unwrap_or_default();
        items.sort_by_key(|s| s.row_id);
        items
    }

    /// Up to `limit` samples for a field, spread across categories.
    ///
    /// Each category first contributes an equal share; remaining slots are
    /// backfilled from whatever categories still have samples.
    pub fn select(&self, field: Field, limit: usize) -> Vec<&ChangeSample> {
        let share = (limit / ChangeCategory::ALL.len()).max(1);
        let pools: Vec<Vec<&ChangeSample>> = ChangeCategory::ALL
            .iter()
            .map(|&cat| self.bucket(field, cat))
            .collect();

        let mut picked: Vec<&ChangeSample> = pools
            .iter()
            .flat_map(|pool| pool.iter().take(share).copied())
            .take(limit)
            .collect();
        for pool in &pools {
            for sample in pool.iter().skip(share) {
                if picked.len() >= limit {
                    return picked;
                }
                picked.push(sample);
            }
        }
        picked
    }

    /// Render the samples document.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for field in Field::ALL {
            let _ = writeln!(out, "===== COLUMN: {} =====", field);
            for sample in self.select(field, SAMPLES_PER_FIELD) {
                let _ = writeln!(out, "[TYPE={}] [ROW={}]", sample.category, sample.row_id);
                let _ = writeln!(out, "BEFORE: {:?}", sample.before);
                let _ = writeln!(out, "AFTER : {:?}", sample.after);
                out.push_str("---\n");
            }
        }
        out
    }

    /// Write `<dir>/<stem>.samples.txt`, returning its path.
    pub fn save(&self, dir: impl AsRef<Path>, stem: &str) -> Result<PathBuf> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| AddrNormError::io(dir, e))?;
        let path = dir.join(format!("{}.samples.txt", stem));
        fs::write(&path, self.render()).map_err(|e| AddrNormError::io(&path, e))?;
        Ok(path)
    }
}

/// Accumulates counters and samples for one job.
#[derive(Debug)]
pub struct ChangeTracker {
    report: Report,
    samples: SampleReservoir,
    unrecognized: HashMap<Field, HashMap<String, u64>>,
}

impl ChangeTracker {
    pub fn new(input: InputInfo, run: RunInfo) -> Self {
        Self {
            report: Report::new(input, run),
            samples: SampleReservoir::default(),
            unrecognized: HashMap::new(),
        }
    }

    /// Count a change and offer it to the sampler.
    pub fn record_change(
        &mut self,
        row_id: usize,
        field: Field,
        category: ChangeCategory,
        before: impl Into<String>,
        after: impl Into<String>,
    ) {
        if let Some(counters) = self.report.counters.get_mut(field.as_str()) {
            counters.bump(category);
        }
        self.samples.offer(ChangeSample {
            row_id,
            field,
            category,
            before: before.into(),
            after: after.into(),
        });
    }

    pub fn record_unchanged(&mut self, field: Field) {
        if let Some(counters) = self.report.counters.get_mut(field.as_str()) {
            counters.unchanged += 1;
        }
    }

    pub fn record_conflict(&mut self, conflict: Conflict) {
        let c = &mut self.report.conflicts;
        match conflict {
            Conflict::LocalityVsAddress => c.locality_vs_address += 1,
            Conflict::RegionVsAddress => c.region_vs_address += 1,
            Conflict::CountryVsAddress => c.country_vs_address += 1,
            Conflict::ZipFormatFail => c.zip_format_fail += 1,
            Conflict::ZipPatternError => c.zip_pattern_error += 1,
        }
    }

    /// Count a locality, region or country value nothing recognized.
    pub fn record_unrecognized(&mut self, field: Field, value: &str) {
        let value = value.trim();
        if value.is_empty() || !matches!(field, Field::Locality | Field::Region | Field::Country) {
            return;
        }
        let counts = self.unrecognized.entry(field).or_default();
        *counts.entry(value.to_string()).or_default() += 1;
        if counts.len() > UNRECOGNIZED_LIMIT {
            // Drop the long tail
            let kept = ranked(counts, UNRECOGNIZED_RETAIN);
            *counts = kept
                .into_iter()
                .map(|entry| (entry.value, entry.count))
                .collect();
        }
    }

    pub fn add_rows(&mut self, rows: usize) {
        self.report.input.rows_total += rows as u64;
    }

    pub fn note(&mut self, note: impl Into<String>) {
        self.report.notes.push(note.into());
    }

    pub fn report(&self) -> &Report {
        &self.report
    }

    pub fn samples(&self) -> &SampleReservoir {
        &self.samples
    }

    /// Stamp the finish time and build the top-unrecognized lists.
    pub fn finalize(&mut self) {
        let finished = Utc::now();
        let started = self.report.run.started_at;
        self.report.run.finished_at = Some(finished);
        self.report.run.duration_sec =
            Some((finished - started).num_milliseconds().max(0) as f64 / 1000.0);

        for (field, counts) in &self.unrecognized {
            self.report
                .top_unrecognized
                .insert(field.as_str().to_string(), ranked(counts, TOP_UNRECOGNIZED));
        }
    }
}

/// Highest counts first, ties by value; at most `limit` entries.
fn ranked(counts: &HashMap<String, u64>, limit: usize) -> Vec<UnrecognizedEntry> {
    let mut entries: Vec<UnrecognizedEntry> = counts
        .iter()
        .map(|(value, count)| UnrecognizedEntry {
            value: value.clone(),
            count: *count,
        })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    entries.truncate(limit);
    entries
}

/// `sha256:<hex>` digest of a file, read in blocks.
pub fn file_sha256(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|e| AddrNormError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(|e| AddrNormError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("sha256:{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample(row: usize, field: Field, category: ChangeCategory) -> ChangeSample {
        ChangeSample {
            row_id: row,
            field,
            category,
            before: format!("b{}", row),
            after: format!("a{}", row),
        }
    }

    // ==================== Counters ====================

    #[test]
    fn test_counters_and_conflicts() {
        let mut tracker = ChangeTracker::new(InputInfo::default(), RunInfo::default());
        tracker.record_change(1, Field::Zip, ChangeCategory::Normalize, "bangkok 10220", "10220");
        tracker.record_change(2, Field::Zip, ChangeCategory::Removed, "abc", "");
        tracker.record_unchanged(Field::Zip);
        tracker.record_conflict(Conflict::ZipFormatFail);
        tracker.record_conflict(Conflict::for_field(Field::Region).unwrap());

        let zip = tracker.report().counters(Field::Zip);
        assert_eq!(zip.total_changed, 2);
        assert_eq!(zip.normalize, 1);
        assert_eq!(zip.removed, 1);
        assert_eq!(zip.unchanged, 1);
        assert_eq!(tracker.report().conflicts.zip_format_fail, 1);
        assert_eq!(tracker.report().conflicts.region_vs_address, 1);
        assert!(Conflict::for_field(Field::Zip).is_none());
    }

    #[test]
    fn test_top_unrecognized_ordering() {
        let mut tracker = ChangeTracker::new(InputInfo::default(), RunInfo::default());
        for value in ["Gotham", "Atlantis", "Gotham", "Zion", "Atlantis", "Gotham", " "] {
            tracker.record_unrecognized(Field::Locality, value);
        }
        tracker.record_unrecognized(Field::Street, "ignored");
        for i in 0..15 {
            tracker.record_unrecognized(Field::Country, &format!("Land {:02}", i));
        }
        tracker.finalize();

        let report = tracker.report();
        let locality = &report.top_unrecognized["locality"];
        assert_eq!(locality[0], UnrecognizedEntry { value: "Gotham".into(), count: 3 });
        assert_eq!(locality[1].value, "Atlantis");
        assert_eq!(locality[2].value, "Zion");
        assert_eq!(report.top_unrecognized["country"].len(), TOP_UNRECOGNIZED);
        assert_eq!(report.top_unrecognized["country"][0].value, "Land 00");
        assert!(report.top_unrecognized["region"].is_empty());
        assert!(report.run.finished_at.is_some());
    }

    #[test]
    fn test_unrecognized_values_are_bounded() {
        let mut tracker = ChangeTracker::new(InputInfo::default(), RunInfo::default());
        for _ in 0..5 {
            tracker.record_unrecognized(Field::Locality, "Gotham");
        }
        for i in 0..UNRECOGNIZED_LIMIT * 3 {
            tracker.record_unrecognized(Field::Locality, &format!("Place {}", i));
        }
        tracker.record_unrecognized(Field::Locality, "Gotham");

        assert!(tracker.unrecognized[&Field::Locality].len() <= UNRECOGNIZED_LIMIT);
        tracker.finalize();
        let locality = &tracker.report().top_unrecognized["locality"];
        assert_eq!(locality[0], UnrecognizedEntry { value: "Gotham".into(), count: 6 });
        assert_eq!(locality.len(), TOP_UNRECOGNIZED);
    }

    // ==================== Sampling ====================

    #[test]
    fn test_reservoir_capacity() {
        let mut reservoir = SampleReservoir::new(6);
        for row in 0..1000 {
            reservoir.offer(sample(row, Field::Street, ChangeCategory::Clean));
        }
        assert_eq!(reservoir.bucket(Field::Street, ChangeCategory::Clean).len(), 6);
        assert!(reservoir.bucket(Field::Zip, ChangeCategory::Clean).is_empty());
    }

    #[test]
    fn test_reservoir_deterministic() {
        let fill = || {
            let mut r = SampleReservoir::default();
            for row in 0..500 {
                r.offer(sample(row, Field::Locality, ChangeCategory::Normalize));
            }
            r.bucket(Field::Locality, ChangeCategory::Normalize)
                .into_iter()
                .map(|s| s.row_id)
                .collect::<Vec<_>>()
        };
        assert_eq!(fill(), fill());
    }

    #[test]
    fn test_select_stratifies_then_backfills() {
        let mut reservoir = SampleReservoir::default();
        for row in 0..50 {
            reservoir.offer(sample(row, Field::Street, ChangeCategory::Clean));
            reservoir.offer(sample(row, Field::Street, ChangeCategory::Normalize));
        }
        reservoir.offer(sample(7, Field::Street, ChangeCategory::Removed));

        let picked = reservoir.select(Field::Street, SAMPLES_PER_FIELD);
        assert_eq!(picked.len(), 13);
        let count = |cat| picked.iter().filter(|s| s.category == cat).count();
        assert_eq!(count(ChangeCategory::Clean), 6);
        assert_eq!(count(ChangeCategory::Normalize), 6);
        assert_eq!(count(ChangeCategory::Removed), 1);

        for cat in ChangeCategory::ALL {
            for row in 0..10 {
                reservoir.offer(sample(row, Field::Zip, cat));
            }
        }
        let picked = reservoir.select(Field::Zip, SAMPLES_PER_FIELD);
        assert_eq!(picked.len(), SAMPLES_PER_FIELD);
        assert!(ChangeCategory::ALL
            .iter()
            .all(|&cat| picked.iter().filter(|s| s.category == cat).count() == 4));
    }

    #[test]
    fn test_render_format() {
        let mut reservoir = SampleReservoir::default();
        reservoir.offer(ChangeSample {
            row_id: 3,
            field: Field::Locality,
            category: ChangeCategory::FuzzyFixed,
            before: "Bangkog".into(),
            after: "Bangkok".into(),
        });
        let text = reservoir.render();
        assert!(text.starts_with("===== COLUMN: street =====\n"));
        assert!(text.contains(
            "===== COLUMN: locality =====\n[TYPE=fuzzy_fixed] [ROW=3]\nBEFORE: \"Bangkog\"\nAFTER : \"Bangkok\"\n---\n"
        ));
    }

    // ==================== Files ====================

    #[test]
    fn test_report_and_samples_saved() {
        let dir = tempdir().unwrap();
        let mut tracker = ChangeTracker::new(
            InputInfo {
                file: "in.csv".into(),
                chunk_size: 10,
                ..Default::default()
            },
            RunInfo::default(),
        );
        tracker.add_rows(4);
        tracker.finalize();

        let report_path = dir.path().join("out/report.json");
        tracker.report().save(&report_path).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
        assert_eq!(json["input"]["rows_total"], 4);
        assert_eq!(json["counters"]["zip"]["unchanged"], 0);
        assert_eq!(json["conflicts"]["zip_pattern_error"], 0);

        let samples = tracker.samples().save(dir.path().join("samples"), "in").unwrap();
        assert!(samples.ends_with("in.samples.txt"));
        assert!(fs::read_to_string(samples).unwrap().contains("===== COLUMN: zip ====="));
    }

    #[test]
    fn test_file_sha256() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "abc").unwrap();
        assert_eq!(
            file_sha256(&path).unwrap(),
            "sha256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
