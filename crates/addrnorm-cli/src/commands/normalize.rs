//! Normalize command - run the pipeline over one CSV file.

use std::path::{Path, PathBuf};

use addrnorm::io::parse_delimiter;
use addrnorm::record::Field;
use addrnorm::{ExtractionConfig, JobConfig, JobSummary, Pipeline, ValidationConfig};
use colored::Colorize;

use crate::cli::{Cli, split_profiles};

const RULES_FILE: &str = "rules.yaml";

/// Look for `rules.yaml` in the working directory, then next to the output.
fn discover_rules(output: &Path) -> Option<PathBuf> {
    let cwd = PathBuf::from(RULES_FILE);
    if cwd.is_file() {
        return Some(cwd);
    }
    let beside = output.parent()?.join(RULES_FILE);
    beside.is_file().then_some(beside)
}

fn build_config(cli: &Cli) -> Result<JobConfig, Box<dyn std::error::Error>> {
    let delimiter = parse_delimiter(&cli.sep)?;

    let mut extraction = ExtractionConfig::default()
        .with_mode(cli.mode)
        .with_street_from_address(cli.street_from_address)
        .with_always_extract(cli.always_extract)
        .with_concurrency(cli.concurrency);
    if let Some(url) = &cli.parser_url {
        extraction = extraction.with_parser_url(url.clone());
    }

    let validation = ValidationConfig::default()
        .with_mode(cli.validate)
        .with_threshold(cli.fuzzy_threshold)
        .with_max_candidates(cli.max_candidates);

    let mut config = JobConfig::new(&cli.input, &cli.output)
        .with_encoding(cli.encoding.clone())
        .with_delimiter(delimiter)
        .with_chunk_size(cli.chunksize)
        .with_quote_all(cli.quote_all)
        .with_keep_extra_columns(!cli.no_extra_columns)
        .with_extraction(extraction)
        .with_validation(validation)
        .with_profiles(split_profiles(&cli.profiles));

    if let Some(dir) = &cli.profiles_dir {
        config = config.with_profiles_dir(dir);
    }
    if let Some(rules) = cli.rules.clone().or_else(|| discover_rules(&cli.output)) {
        config = config.with_rules(rules);
    }
    if let Some(reference) = &cli.reference {
        config = config.with_reference(reference);
    }
    if let Some(report) = &cli.report {
        config = config.with_report(report);
    }
    if let Some(dir) = &cli.samples_dir {
        config = config.with_samples_dir(dir);
    }
    Ok(config)
}

pub fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !cli.input.exists() {
        return Err(format!("Input file not found: {}", cli.input.display()).into());
    }

    let config = build_config(&cli)?;
    if !cli.quiet {
        println!(
            "{} {}",
            "Normalizing".cyan().bold(),
            cli.input.display().to_string().white().bold()
        );
        if let Some(rules) = &config.rules_path {
            println!("  Rules: {}", rules.display());
        }
    }

    let summary = Pipeline::new(config)?.run()?;

    if !cli.quiet {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &JobSummary) {
    println!();
    println!(
        "{} {} rows in {:.2}s",
        "Wrote".green().bold(),
        summary.rows_written.to_string().white().bold(),
        summary.elapsed.as_secs_f64()
    );
    if summary.skipped_rows > 0 {
        println!(
            "{} {} malformed rows skipped",
            "Warning:".yellow().bold(),
            summary.skipped_rows
        );
    }

    println!();
    println!("{}", "Changes".cyan().bold());
    for field in Field::ALL {
        let counters = summary.report.counters(field);
        let line = format!(
            "  {:<9} {:>7} changed  (clean {}, normalize {}, extracted {}, removed {}, fuzzy {})",
            field.as_str(),
            counters.total_changed,
            counters.clean,
            counters.normalize,
            counters.extracted,
            counters.removed,
            counters.fuzzy_fixed
        );
        if counters.total_changed > 0 {
            println!("{}", line);
        } else {
            println!("{}", line.dimmed());
        }
    }

    let conflicts = &summary.report.conflicts;
    let total_conflicts = conflicts.locality_vs_address
        + conflicts.region_vs_address
        + conflicts.country_vs_address
        + conflicts.zip_format_fail
        + conflicts.zip_pattern_error;
    if total_conflicts > 0 {
        println!();
        println!("{} {}", "Conflicts".yellow().bold(), total_conflicts);
        for (name, count) in [
            ("locality_vs_address", conflicts.locality_vs_address),
            ("region_vs_address", conflicts.region_vs_address),
            ("country_vs_address", conflicts.country_vs_address),
            ("zip_format_fail", conflicts.zip_format_fail),
            ("zip_pattern_error", conflicts.zip_pattern_error),
        ] {
            if count > 0 {
                println!("  {:<20} {}", name, count);
            }
        }
    }

    println!();
    println!("  Output:  {}", summary.output.display().to_string().cyan());
    println!("  Report:  {}", summary.report_path.display().to_string().cyan());
    println!("  Samples: {}", summary.samples_path.display().to_string().cyan());
}
