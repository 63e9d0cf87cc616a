//! CLI argument definitions using clap.

use std::path::PathBuf;

use addrnorm::{ExtractionMode, ValidationMode};
use clap::Parser;

/// addrnorm: normalize postal addresses in a CSV file
#[derive(Parser)]
#[command(name = "addrnorm")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Input CSV file
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output CSV file
    #[arg(short, long)]
    pub output: PathBuf,

    /// Input encoding (any ASCII-compatible label, e.g. utf-8, windows-1252, tis-620)
    #[arg(long, default_value = "utf-8")]
    pub encoding: String,

    /// Field separator (single character, or "tab")
    #[arg(long, default_value = ",")]
    pub sep: String,

    /// Quote every output field
    #[arg(long)]
    pub quote_all: bool,

    /// Profiles to merge, comma or semicolon separated (e.g. "base,TH")
    #[arg(long, default_value = "base")]
    pub profiles: String,

    /// Directory with <name>.yml profiles overriding the built-in ones
    #[arg(long)]
    pub profiles_dir: Option<PathBuf>,

    /// Rules document (YAML or JSON); rules.yaml is picked up automatically
    #[arg(long)]
    pub rules: Option<PathBuf>,

    /// Rows per batch
    #[arg(long, default_value_t = 10_000)]
    pub chunksize: usize,

    /// Extraction policy: off, fill-missing-only, extract-all-to-fill
    #[arg(long, default_value = "fill-missing-only")]
    pub mode: ExtractionMode,

    /// Only compose street from the address column
    #[arg(long)]
    pub street_from_address: bool,

    /// Also extract rows without address text, from their joined fields
    #[arg(long)]
    pub always_extract: bool,

    /// Address parsing service endpoint (e.g. http://localhost:8080/parser)
    #[arg(long)]
    pub parser_url: Option<String>,

    /// Validation mode: off, loose, strict
    #[arg(long, default_value = "loose")]
    pub validate: ValidationMode,

    /// Minimum similarity (0-100) for automatic repairs
    #[arg(long, default_value_t = 90)]
    pub fuzzy_threshold: u32,

    /// Fuzzy candidates considered per lookup
    #[arg(long, default_value_t = 3)]
    pub max_candidates: usize,

    /// Parallel parser requests per batch
    #[arg(long, default_value_t = 1)]
    pub concurrency: usize,

    /// GeoNames cities file used instead of the built-in city table
    #[arg(long)]
    pub reference: Option<PathBuf>,

    /// Report path (default: report.json next to the output)
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Samples directory (default: the output directory)
    #[arg(long)]
    pub samples_dir: Option<PathBuf>,

    /// Drop auxiliary input columns from the output
    #[arg(long)]
    pub no_extra_columns: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Only print warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Split a profile list on commas and semicolons, defaulting to `base`.
pub fn split_profiles(raw: &str) -> Vec<String> {
    let profiles: Vec<String> = raw
        .split([',', ';'])
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    if profiles.is_empty() {
        vec!["base".to_string()]
    } else {
        profiles
    }
}
