//! addrnorm: streaming normalization of postal addresses in CSV files.
//!
//! Rows are read in fixed-size batches and pass through a fixed sequence of
//! stages before being appended to the output:
//!
//! 1. **Clean**: null tokens, Unicode and whitespace cleanup
//! 2. **Realign**: move full addresses out of single fields, drop misplaced values
//! 3. **Extract**: split free-form address text via a parsing service or a local heuristic
//! 4. **Normalize**: country resolution, alias tables, street and zip cleanup
//! 5. **Validate**: zip patterns, city reference lookup with fuzzy repair, region whitelists
//!
//! Every change is counted in a JSON report and sampled into a text file.
//!
//! # Example
//!
//! ```no_run
//! use addrnorm::{JobConfig, Pipeline, ValidationConfig, ValidationMode};
//!
//! let config = JobConfig::new("addresses.csv", "out/addresses.csv")
//!     .with_profiles(["base", "TH"])
//!     .with_validation(ValidationConfig::default().with_mode(ValidationMode::Strict));
//!
//! let summary = Pipeline::new(config).unwrap().run().unwrap();
//! println!("Rows: {}", summary.rows_written);
//! println!("Report: {}", summary.report_path.display());
//! ```

pub mod clean;
pub mod error;
pub mod extract;
pub mod io;
pub mod normalize;
pub mod pipeline;
pub mod realign;
pub mod record;
pub mod reference;
pub mod report;
pub mod rules;
pub mod text;
pub mod validate;

pub use clean::clean_value;
pub use error::{AddrNormError, Result};
pub use extract::{AddressParser, ExtractionConfig, ExtractionMode, Extractor, ParsedAddress};
pub use normalize::{NormalizedRow, Normalizer};
pub use pipeline::{JobConfig, JobSummary, Pipeline};
pub use record::{Field, Record};
pub use report::{ChangeCategory, ChangeTracker, Report};
pub use rules::{RuleFlags, RuleLayer, RuleSet};
pub use validate::{ValidationConfig, ValidationFlag, ValidationMode, Validator};
