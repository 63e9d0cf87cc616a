//! Example: Normalize an address CSV with the Thailand profile.
//!
//! Usage:
//!   cargo run --example normalize -- <input.csv> <output.csv>
//!
//! Example:
//!   cargo run --example normalize -- data/customers.csv out/customers.csv

use std::env;
use std::path::Path;

use addrnorm::{Field, JobConfig, Pipeline, ValidationConfig, ValidationMode};

fn main() -> addrnorm::Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: cargo run --example normalize -- <input.csv> <output.csv>");
        std::process::exit(1);
    }

    let input = Path::new(&args[1]);
    if !input.exists() {
        eprintln!("Error: File not found: {}", input.display());
        std::process::exit(1);
    }

    let config = JobConfig::new(input, &args[2])
        .with_profiles(["base", "TH"])
        .with_validation(
            ValidationConfig::default()
                .with_mode(ValidationMode::Loose)
                .with_threshold(85),
        );

    let summary = Pipeline::new(config)?.run()?;

    let separator = "=".repeat(60);
    println!("{}", separator);
    println!("addrnorm: {}", input.display());
    println!("{}", separator);
    println!("Rows written: {}", summary.rows_written);
    println!("Skipped rows: {}", summary.skipped_rows);
    println!();

    for field in Field::ALL {
        let counters = summary.report.counters(field);
        println!(
            "  {:<9} changed {:>6}  unchanged {:>6}",
            field.as_str(),
            counters.total_changed,
            counters.unchanged
        );
    }

    println!();
    println!("Report:  {}", summary.report_path.display());
    println!("Samples: {}", summary.samples_path.display());
    Ok(())
}
