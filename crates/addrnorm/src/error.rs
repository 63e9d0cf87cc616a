//! Error types for the addrnorm library.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for address normalization jobs.
#[derive(Debug, Error)]
pub enum AddrNormError {
    /// Error reading or writing a file.
    #[error("IO error for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error from the CSV library.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Invalid delimiter specified.
    #[error("Invalid delimiter: {0}")]
    InvalidDelimiter(String),

    /// Encoding label not recognized or not usable for CSV.
    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failure talking to the address-parsing service.
    #[error("Parser error: {0}")]
    Parser(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Regex compilation error.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl AddrNormError {
    /// Wrap an IO error together with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for addrnorm operations.
pub type Result<T> = std::result::Result<T, AddrNormError>;
