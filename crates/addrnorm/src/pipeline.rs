//! The batch pipeline: read, clean, realign, extract, normalize, validate,
//! track and write, one batch at a time.
//!
//! # Example
//!
//! ```no_run
//! use addrnorm::{JobConfig, Pipeline};
//!
//! let config = JobConfig::new("addresses.csv", "out/addresses.csv")
//!     .with_profiles(["base", "TH"]);
//! let summary = Pipeline::new(config).unwrap().run().unwrap();
//! println!("{} rows written", summary.rows_written);
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::clean::clean_in_place;
use crate::error::{AddrNormError, Result};
use crate::extract::{AddressParser, ExtractionConfig, Extractor};
use crate::io::{BatchWriter, CsvBatchReader, ReaderOptions, WriterOptions, resolve_encoding};
use crate::normalize::Normalizer;
use crate::realign::{promote_address_like, repair_misaligned};
use crate::record::{Field, Record};
use crate::reference::{GeoReference, LazyReference};
use crate::report::{
    ChangeCategory, ChangeTracker, Conflict, InputInfo, Report, RunInfo, file_sha256,
};
use crate::rules::RuleSet;
use crate::validate::{ValidationConfig, ValidationFlag, Validator};

/// Default rows per batch.
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

/// Name of the report written next to the output when no path is given.
pub const DEFAULT_REPORT_NAME: &str = "report.json";

/// Configuration for one normalization job.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    /// WHATWG encoding label of the input.
    pub encoding: String,
    pub delimiter: u8,
    pub chunk_size: usize,
    pub quote_all: bool,
    pub keep_extra_columns: bool,
    pub extraction: ExtractionConfig,
    pub validation: ValidationConfig,
    /// Profiles merged in order.
    pub profiles: Vec<String>,
    pub profiles_dir: Option<PathBuf>,
    /// User rules document (YAML or JSON).
    pub rules_path: Option<PathBuf>,
    /// GeoNames cities file replacing the built-in reference.
    pub reference_path: Option<PathBuf>,
    /// Report location; defaults to `report.json` next to the output.
    pub report_path: Option<PathBuf>,
    /// Samples directory; defaults to the output directory.
    pub samples_dir: Option<PathBuf>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            output: PathBuf::new(),
            encoding: "utf-8".to_string(),
            delimiter: b',',
            chunk_size: DEFAULT_CHUNK_SIZE,
            quote_all: false,
            keep_extra_columns: true,
            extraction: ExtractionConfig::default(),
            validation: ValidationConfig::default(),
            profiles: vec!["base".to_string()],
            profiles_dir: None,
            rules_path: None,
            reference_path: None,
            report_path: None,
            samples_dir: None,
        }
    }
}

impl JobConfig {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            ..Default::default()
        }
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_quote_all(mut self, quote_all: bool) -> Self {
        self.quote_all = quote_all;
        self
    }

    pub fn with_keep_extra_columns(mut self, keep: bool) -> Self {
        self.keep_extra_columns = keep;
        self
    }

    pub fn with_extraction(mut self, extraction: ExtractionConfig) -> Self {
        self.extraction = extraction;
        self
    }

    pub fn with_validation(mut self, validation: ValidationConfig) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_profiles<I, S>(mut self, profiles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.profiles = profiles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_profiles_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.profiles_dir = Some(dir.into());
        self
    }

    pub fn with_rules(mut self, path: impl Into<PathBuf>) -> Self {
        self.rules_path = Some(path.into());
        self
    }

    pub fn with_reference(mut self, path: impl Into<PathBuf>) -> Self {
        self.reference_path = Some(path.into());
        self
    }

    pub fn with_report(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_path = Some(path.into());
        self
    }

    pub fn with_samples_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.samples_dir = Some(dir.into());
        self
    }

    fn output_dir(&self) -> PathBuf {
        match self.output.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Where the report is written.
    pub fn resolved_report_path(&self) -> PathBuf {
        self.report_path
            .clone()
            .unwrap_or_else(|| self.output_dir().join(DEFAULT_REPORT_NAME))
    }

    /// Where the samples document is written.
    pub fn resolved_samples_dir(&self) -> PathBuf {
        self.samples_dir.clone().unwrap_or_else(|| self.output_dir())
    }

    /// Reject settings that would fail before the first row.
    pub fn validate(&self) -> Result<()> {
        if !self.input.is_file() {
            return Err(AddrNormError::Config(format!(
                "Input file not found: {}",
                self.input.display()
            )));
        }
        if self.output.as_os_str().is_empty() {
            return Err(AddrNormError::Config("output path is empty".to_string()));
        }
        if self.chunk_size == 0 {
            return Err(AddrNormError::Config("chunk size must be at least 1".to_string()));
        }
        if matches!(self.delimiter, b'"' | b'\n' | b'\r') {
            return Err(AddrNormError::InvalidDelimiter(
                (self.delimiter as char).escape_default().to_string(),
            ));
        }
        resolve_encoding(&self.encoding)?;
        Ok(())
    }
}

/// What a finished job produced.
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub rows_read: usize,
    pub rows_written: usize,
    pub skipped_rows: usize,
    pub output: PathBuf,
    pub report_path: PathBuf,
    pub samples_path: PathBuf,
    pub elapsed: Duration,
    pub report: Report,
}

/// One configured job.
pub struct Pipeline {
    config: JobConfig,
    extractor: Extractor,
    normalizer: Normalizer,
    validator: Validator,
    tracker: ChangeTracker,
}

impl Pipeline {
    /// Check the configuration and build every stage.
    pub fn new(config: JobConfig) -> Result<Self> {
        config.validate()?;

        let mut rules = RuleSet::from_profiles(&config.profiles, config.profiles_dir.as_deref());
        if let Some(path) = &config.rules_path {
            rules.merge(RuleSet::load_user_rules(path));
        }
        let rules = Arc::new(rules);

        let reference = Arc::new(match &config.reference_path {
            Some(path) => {
                let path = path.clone();
                LazyReference::with_loader(move || {
                    GeoReference::from_geonames(&path).unwrap_or_else(|e| {
                        warn!(path = %path.display(), error = %e, "reference not loaded, using built-in cities");
                        GeoReference::builtin()
                    })
                })
            }
            None => LazyReference::builtin(),
        });

        let extractor = Extractor::new(config.extraction.clone())?;
        let validator = Validator::new(config.validation, reference, &rules);
        let normalizer = Normalizer::new(Arc::clone(&rules));
        let tracker = ChangeTracker::new(input_info(&config), run_info(&config, &rules));

        Ok(Self {
            config,
            extractor,
            normalizer,
            validator,
            tracker,
        })
    }

    /// Put a specific parser in front of the heuristic.
    pub fn with_parser(mut self, parser: Arc<dyn AddressParser>) -> Self {
        self.extractor = Extractor::with_parser(self.config.extraction.clone(), parser);
        self
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    /// Run every stage over one batch in place.
    pub fn process_batch(&mut self, records: &mut [Record]) {
        for record in records.iter_mut() {
            self.clean(record);
        }
        for record in records.iter_mut() {
            promote_address_like(record);
        }
        for record in records.iter_mut() {
            repair_misaligned(record);
        }
        if self.extractor.is_active() {
            self.extract(records);
        }
        for record in records.iter_mut() {
            self.normalize_and_validate(record);
        }
    }

    fn clean(&mut self, record: &mut Record) {
        for field in Field::ALL {
            let before = record.get(field).to_string();
            if clean_in_place(record.get_mut(field)) {
                self.tracker
                    .record_change(record.row_id, field, ChangeCategory::Clean, before, record.get(field));
            }
        }
        let before = record.address.clone();
        if clean_in_place(&mut record.address) {
            // the catch-all has no counters of its own
            self.tracker.record_change(
                record.row_id,
                Field::Street,
                ChangeCategory::Clean,
                before,
                record.address.as_str(),
            );
        }
    }

    fn extract(&mut self, records: &mut [Record]) {
        let items = self.extractor.work_items(records);
        if items.is_empty() {
            return;
        }
        let resolved = self.extractor.resolve_batch(&items);
        debug!(items = items.len(), "addresses resolved");

        for (idx, _) in &items {
            let Some(parsed) = resolved.get(idx) else {
                continue;
            };
            let record = &mut records[*idx];
            let outcome = self.extractor.apply(record, parsed);
            for (field, before, after) in outcome.filled {
                self.tracker
                    .record_change(record.row_id, field, ChangeCategory::Extracted, before, after);
            }
            for field in outcome.conflicts {
                if let Some(conflict) = Conflict::for_field(field) {
                    self.tracker.record_conflict(conflict);
                }
            }
        }
    }

    fn normalize_and_validate(&mut self, record: &mut Record) {
        let row = self.normalizer.normalize(record);
        let changes = row.apply_to(record);
        for field in Field::ALL {
            match changes.iter().find(|(f, _, _)| *f == field) {
                Some((_, before, after)) => {
                    let category = if after.is_empty() {
                        ChangeCategory::Removed
                    } else {
                        ChangeCategory::Normalize
                    };
                    self.tracker
                        .record_change(record.row_id, field, category, before.as_str(), after.as_str());
                }
                None => self.tracker.record_unchanged(field),
            }
        }
        if row.country_code.is_none() {
            self.tracker
                .record_unrecognized(Field::Country, record.get(Field::Country));
        }

        let before_locality = record.get(Field::Locality).to_string();
        let before_region = record.get(Field::Region).to_string();
        let flags = self.validator.validate(record, row.country_code.as_deref());
        for flag in flags {
            match flag {
                ValidationFlag::LocalityFuzzyFixed if record.get(Field::Locality) != before_locality => {
                    self.tracker.record_change(
                        record.row_id,
                        Field::Locality,
                        ChangeCategory::FuzzyFixed,
                        before_locality.as_str(),
                        record.get(Field::Locality),
                    );
                }
                ValidationFlag::RegionFuzzyFixed if record.get(Field::Region) != before_region => {
                    self.tracker.record_change(
                        record.row_id,
                        Field::Region,
                        ChangeCategory::FuzzyFixed,
                        before_region.as_str(),
                        record.get(Field::Region),
                    );
                }
                ValidationFlag::BadZipFormat => self.tracker.record_conflict(Conflict::ZipFormatFail),
                ValidationFlag::ZipPatternError => {
                    self.tracker.record_conflict(Conflict::ZipPatternError)
                }
                ValidationFlag::CityNotFound => self
                    .tracker
                    .record_unrecognized(Field::Locality, record.get(Field::Locality)),
                ValidationFlag::RegionNotInWhitelist => self
                    .tracker
                    .record_unrecognized(Field::Region, record.get(Field::Region)),
                _ => {}
            }
        }
    }

    /// Stream the whole input and write the output, report and samples.
    pub fn run(mut self) -> Result<JobSummary> {
        let started = Instant::now();
        info!(
            input = %self.config.input.display(),
            output = %self.config.output.display(),
            chunk_size = self.config.chunk_size,
            "starting job"
        );

        let reader_options = ReaderOptions {
            encoding: self.config.encoding.clone(),
            delimiter: self.config.delimiter,
            chunk_size: self.config.chunk_size,
        };
        let writer_options = WriterOptions {
            delimiter: self.config.delimiter,
            quote_all: self.config.quote_all,
            keep_extra_columns: self.config.keep_extra_columns,
        };
        let mut reader = CsvBatchReader::open(&self.config.input, &reader_options)?;
        let mut writer = BatchWriter::create(&self.config.output, reader.layout(), &writer_options)?;

        let mut rows_read = 0usize;
        for batch in reader.by_ref() {
            let mut batch = batch?;
            self.process_batch(&mut batch);
            writer.write_batch(&batch)?;
            rows_read += batch.len();
            self.tracker.add_rows(batch.len());

            let secs = started.elapsed().as_secs_f64().max(1e-6);
            info!(
                rows = rows_read,
                rows_per_sec = (rows_read as f64 / secs) as u64,
                "batch written"
            );
        }

        let skipped_rows = reader.skipped_rows();
        if skipped_rows > 0 {
            self.tracker
                .note(format!("{} malformed rows skipped", skipped_rows));
        }
        let rows_written = writer.finish()?;

        self.tracker.finalize();
        let report_path = self.config.resolved_report_path();
        self.tracker.report().save(&report_path)?;
        let stem = input_stem(&self.config.input);
        let samples_path = self
            .tracker
            .samples()
            .save(self.config.resolved_samples_dir(), &stem)?;

        let elapsed = started.elapsed();
        info!(
            rows = rows_read,
            skipped = skipped_rows,
            elapsed_ms = elapsed.as_millis() as u64,
            "job finished"
        );

        Ok(JobSummary {
            rows_read,
            rows_written,
            skipped_rows,
            output: self.config.output.clone(),
            report_path,
            samples_path,
            elapsed,
            report: self.tracker.report().clone(),
        })
    }
}

fn input_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string())
}

fn input_info(config: &JobConfig) -> InputInfo {
    let sha256 = match file_sha256(&config.input) {
        Ok(digest) => Some(digest),
        Err(e) => {
            warn!(error = %e, "input checksum not computed");
            None
        }
    };
    InputInfo {
        file: config.input.display().to_string(),
        sha256,
        rows_total: 0,
        chunk_size: config.chunk_size,
        encoding: config.encoding.clone(),
        separator: (config.delimiter as char).to_string(),
    }
}

fn run_info(config: &JobConfig, rules: &RuleSet) -> RunInfo {
    RunInfo {
        mode: config.extraction.mode.to_string(),
        street_from_address: config.extraction.street_from_address,
        always_extract: config.extraction.always_extract,
        profiles: rules.layer_names().to_vec(),
        validate: config.validation.mode.to_string(),
        fuzzy_threshold: config.validation.fuzzy_threshold,
        parser_url: config.extraction.parser_url.clone(),
        concurrency: config.extraction.concurrency,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{ExtractionMode, MockParser, ParsedAddress};
    use crate::validate::ValidationMode;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn pipeline_for(file: &NamedTempFile, config: JobConfig) -> Pipeline {
        let dir = file.path().parent().unwrap().to_path_buf();
        let config = JobConfig {
            input: file.path().to_path_buf(),
            output: dir.join("unused.csv"),
            ..config
        };
        Pipeline::new(config).unwrap()
    }

    #[test]
    fn test_missing_input_is_fatal() {
        let err = Pipeline::new(JobConfig::new("/definitely/not/here.csv", "out.csv"));
        assert!(matches!(err, Err(AddrNormError::Config(_))));
    }

    #[test]
    fn test_bad_settings_rejected() {
        let file = create_test_file("city\nBangkok\n");
        let base = JobConfig::new(file.path(), "out.csv");
        assert!(base.clone().with_chunk_size(0).validate().is_err());
        assert!(base.clone().with_encoding("utf-16le").validate().is_err());
        assert!(base.clone().with_delimiter(b'"').validate().is_err());
        assert!(base.validate().is_ok());
    }

    #[test]
    fn test_default_artifact_locations() {
        let config = JobConfig::new("in.csv", "out/dir/result.csv");
        assert_eq!(config.resolved_report_path(), PathBuf::from("out/dir/report.json"));
        assert_eq!(config.resolved_samples_dir(), PathBuf::from("out/dir"));
        let bare = JobConfig::new("in.csv", "result.csv");
        assert_eq!(bare.resolved_samples_dir(), PathBuf::from("."));
    }

    #[test]
    fn test_process_batch_counts_every_stage() {
        let file = create_test_file("city\n");
        let config = JobConfig::default()
            .with_profiles(["base", "TH"])
            .with_validation(ValidationConfig::default().with_threshold(85));
        let mut pipeline = pipeline_for(&file, config);

        let mut batch = vec![
            Record::new(1)
                .with(Field::Locality, "  bangkog ")
                .with(Field::Country, "thailand"),
            Record::new(2).with(Field::Zip, "n/a"),
        ];
        pipeline.process_batch(&mut batch);

        assert_eq!(batch[0].get(Field::Locality), "Bangkok");
        assert_eq!(batch[0].get(Field::Country), "Thailand");
        let report = pipeline.tracker().report();
        assert_eq!(report.counters(Field::Locality).clean, 1);
        assert_eq!(report.counters(Field::Locality).normalize, 1);
        assert_eq!(report.counters(Field::Locality).fuzzy_fixed, 1);
        assert_eq!(report.counters(Field::Zip).clean, 1);
        assert_eq!(report.counters(Field::Street).unchanged, 2);
    }

    #[test]
    fn test_conflict_counted_from_mock_parser() {
        let file = create_test_file("city,address\n");
        let parsed = ParsedAddress::new().with("city", "Chiang Mai").with("zip", "50200");
        let mock = Arc::new(MockParser::new().with_response("somewhere", parsed));
        let config = JobConfig::default().with_extraction(
            ExtractionConfig::default()
                .with_mode(ExtractionMode::FillMissingOnly)
                .with_parser_url("http://127.0.0.1:9/parser"),
        );
        let mut pipeline = pipeline_for(&file, config).with_parser(mock.clone());

        let mut batch = vec![Record::new(1)
            .with(Field::Locality, "Pattaya")
            .with_address("somewhere")];
        pipeline.process_batch(&mut batch);

        assert_eq!(mock.calls(), 1);
        assert_eq!(batch[0].get(Field::Locality), "Pattaya");
        assert_eq!(batch[0].get(Field::Zip), "50200");
        let report = pipeline.tracker().report();
        assert_eq!(report.conflicts.locality_vs_address, 1);
        assert_eq!(report.counters(Field::Zip).extracted, 1);
    }

    #[test]
    fn test_validation_off_skips_unrecognized() {
        let file = create_test_file("city\n");
        let config = JobConfig::default()
            .with_validation(ValidationConfig::default().with_mode(ValidationMode::Off));
        let mut pipeline = pipeline_for(&file, config);
        let mut batch = vec![Record::new(1).with(Field::Locality, "Nowhere Town")];
        pipeline.process_batch(&mut batch);
        pipeline.tracker.finalize();
        assert!(pipeline.tracker().report().top_unrecognized["locality"].is_empty());
    }
}
