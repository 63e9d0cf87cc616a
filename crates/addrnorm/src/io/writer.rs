//! Batch-appending CSV writer.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use super::layout::CsvLayout;
use crate::error::{AddrNormError, Result};
use crate::record::{ADDRESS_COLUMN, Field, Record};

/// Output formatting options.
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Field delimiter.
    pub delimiter: u8,
    /// Quote every field instead of only where needed.
    pub quote_all: bool,
    /// Emit auxiliary input columns before the canonical fields.
    pub keep_extra_columns: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote_all: false,
            keep_extra_columns: true,
        }
    }
}

/// Appends record batches to one output file.
///
/// The file is truncated on creation; the header goes out together with
/// the first batch (or on [`BatchWriter::finish`] if no batch arrived).
pub struct BatchWriter {
    path: PathBuf,
    writer: csv::Writer<File>,
    extra_headers: Vec<String>,
    header_written: bool,
    rows_written: usize,
}

impl BatchWriter {
    /// Create (or truncate) the output file.
    pub fn create(path: impl AsRef<Path>, layout: &CsvLayout, options: &WriterOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| AddrNormError::io(parent, e))?;
        }
        let file = File::create(&path).map_err(|e| AddrNormError::io(&path, e))?;

        let quote_style = if options.quote_all {
            csv::QuoteStyle::Always
        } else {
            csv::QuoteStyle::Necessary
        };
        let writer = csv::WriterBuilder::new()
            .delimiter(options.delimiter)
            .quote_style(quote_style)
            .from_writer(file);

        let extra_headers = if options.keep_extra_columns {
            layout.extra_headers().map(str::to_string).collect()
        } else {
            Vec::new()
        };

        Ok(Self {
            path,
            writer,
            extra_headers,
            header_written: false,
            rows_written: 0,
        })
    }

    /// Output column names in write order.
    pub fn columns(&self) -> Vec<&str> {
        self.extra_headers
            .iter()
            .map(String::as_str)
            .chain(Field::ALL.iter().map(|f| f.as_str()))
            .chain(std::iter::once(ADDRESS_COLUMN))
            .collect()
    }

    fn write_header(&mut self) -> Result<()> {
        if !self.header_written {
            let columns: Vec<String> = self.columns().into_iter().map(str::to_string).collect();
            self.writer.write_record(&columns)?;
            self.header_written = true;
        }
        Ok(())
    }

    /// Append a batch and flush it to disk.
    pub fn write_batch(&mut self, records: &[Record]) -> Result<()> {
        self.write_header()?;
        for record in records {
            let extras = self
                .extra_headers
                .iter()
                .map(|h| record.extras.get(h).map(String::as_str).unwrap_or(""));
            let row: Vec<&str> = extras
                .chain(record.fields().iter().map(String::as_str))
                .chain(std::iter::once(record.address.as_str()))
                .collect();
            self.writer.write_record(&row)?;
        }
        self.rows_written += records.len();
        self.writer
            .flush()
            .map_err(|e| AddrNormError::io(&self.path, e))
    }

    /// Rows written so far.
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Ensure the header exists and flush.
    pub fn finish(mut self) -> Result<usize> {
        self.write_header()?;
        self.writer
            .flush()
            .map_err(|e| AddrNormError::io(&self.path, e))?;
        Ok(self.rows_written)
    }
}
