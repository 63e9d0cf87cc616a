//! Per-row stage benchmarks.
//!
//! Measures the fuzzy scorer, locality validation, normalization and the
//! local address splitter.

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use addrnorm::extract::HeuristicParser;
use addrnorm::reference::LazyReference;
use addrnorm::validate::{rank_candidates, similarity};
use addrnorm::{
    Field, Normalizer, Record, RuleSet, ValidationConfig, ValidationMode, Validator, clean_value,
};

/// Misspelled or variant Thai localities.
const LOCALITY_SAMPLES: &[&str] = &[
    "Bangkog",
    "bangkok",
    "Chiang Mia",
    "Chiangmai",
    "Pataya",
    "Phuket Town",
    "Hatyai",
    "Nonthaburi",
    "Krung Thep",
    "Khon Kaen",
    "Udon Thani",
    "Nakhon Ratchasim",
    "Samut Prakarn",
    "Ayuthaya",
    "Chonburi",
];

/// Free-form address lines.
const ADDRESS_SAMPLES: &[&str] = &[
    "77/1, Sukhumvit Road, Bangkok, 10110, Thailand",
    "123 Main St, Apt 4",
    "12 Rue de Rivoli; Paris 75001",
    "Unit 5, 200 George St, Sydney NSW 2000, Australia",
    "99 Moo 3, Nong Prue, Bang Lamung, Chonburi 20150",
    "1-2-3 Shibuya, Shibuya-ku, Tokyo 150-0002",
    "Calle Mayor 5, 28013 Madrid, Spain",
    "Floor 3, 9 Rama IV Road, Silom, Bang Rak, Bangkok 10500",
];

fn th_rules() -> Arc<RuleSet> {
    Arc::new(RuleSet::from_profiles(&["base", "TH"], None))
}

/// Benchmark the similarity scorer and candidate ranking.
fn bench_fuzzy_scoring(c: &mut Criterion) {
    let mut group = c.benchmark_group("fuzzy_scoring");
    let candidates: Vec<String> = LOCALITY_SAMPLES.iter().map(|s| s.to_lowercase()).collect();

    group.bench_function("similarity", |b| {
        b.iter(|| black_box(similarity(black_box("bangkog"), black_box("bangkok"))))
    });

    group.bench_function("rank_15", |b| {
        b.iter(|| {
            black_box(rank_candidates(
                "chiang mia",
                candidates.iter().map(String::as_str),
                3,
            ))
        })
    });

    group.finish();
}

/// Benchmark locality validation against the built-in reference.
fn bench_locality_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("locality_validation");
    let rules = th_rules();
    let reference = Arc::new(LazyReference::builtin());
    let config = ValidationConfig::default()
        .with_mode(ValidationMode::Loose)
        .with_threshold(85);

    // Fresh validator each pass so the memo is cold
    group.bench_function("uncached_batch_15", |b| {
        b.iter(|| {
            let mut validator = Validator::new(config, Arc::clone(&reference), &rules);
            for sample in LOCALITY_SAMPLES {
                let mut record = Record::new(1).with(Field::Locality, *sample);
                black_box(validator.validate(&mut record, Some("TH")));
            }
        })
    });

    let mut warm = Validator::new(config, Arc::clone(&reference), &rules);
    group.bench_function("cached_batch_15", |b| {
        b.iter(|| {
            for sample in LOCALITY_SAMPLES {
                let mut record = Record::new(1).with(Field::Locality, *sample);
                black_box(warm.validate(&mut record, Some("TH")));
            }
        })
    });

    group.finish();
}

/// Benchmark full-row normalization.
fn bench_normalization(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalization");
    let normalizer = Normalizer::new(th_rules());
    let record = Record::new(1)
        .with(Field::Street, "123 main st, apt 4")
        .with(Field::Locality, "BKK")
        .with(Field::Region, "krung thep maha nakhon")
        .with(Field::Country, "thailand")
        .with(Field::Zip, "bangkok 10220");

    group.bench_function("row", |b| b.iter(|| black_box(normalizer.normalize(&record))));

    group.bench_function("clean_value", |b| {
        b.iter(|| black_box(clean_value(black_box("  ,Sukhumvit   Road ;  "))))
    });

    group.finish();
}

/// Benchmark the local address splitter across input lengths.
fn bench_heuristic_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("heuristic_split");
    let parser = HeuristicParser::new();

    group.bench_function("batch_8", |b| {
        b.iter(|| {
            for sample in ADDRESS_SAMPLES {
                black_box(parser.split(sample));
            }
        })
    });

    for segments in [2usize, 5, 10, 20] {
        let input = vec!["Sukhumvit Road"; segments].join(", ") + ", 10110";
        group.bench_with_input(BenchmarkId::new("segments", segments), &input, |b, input| {
            b.iter(|| black_box(parser.split(input)))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_fuzzy_scoring,
    bench_locality_validation,
    bench_normalization,
    bench_heuristic_split,
);
criterion_main!(benches);
