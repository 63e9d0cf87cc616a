//! Chunked, malformed-row tolerant CSV reader.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use encoding_rs::Encoding;
use tracing::warn;

use super::layout::CsvLayout;
use crate::error::{AddrNormError, Result};
use crate::record::Record;

/// Options controlling how input files are decoded and split.
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// WHATWG encoding label (e.g. `utf-8`, `windows-1252`, `tis-620`).
    pub encoding: String,
    /// Field delimiter.
    pub delimiter: u8,
    /// Rows per emitted batch.
    pub chunk_size: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            encoding: "utf-8".to_string(),
            delimiter: b',',
            chunk_size: 10_000,
        }
    }
}

/// Resolve an encoding label usable for byte-oriented CSV splitting.
pub fn resolve_encoding(label: &str) -> Result<&'static Encoding> {
    let encoding = Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| AddrNormError::UnsupportedEncoding(label.to_string()))?;
    if !encoding.is_ascii_compatible() {
        return Err(AddrNormError::UnsupportedEncoding(format!(
            "{} is not ASCII-compatible",
            encoding.name()
        )));
    }
    Ok(encoding)
}

/// Parse a delimiter argument (`","`, `";"`, `"\t"`, `"tab"`).
pub fn parse_delimiter(raw: &str) -> Result<u8> {
    match raw {
        "\\t" | "\t" | "tab" | "TAB" => return Ok(b'\t'),
        _ => {}
    }
    let bytes = raw.as_bytes();
    if bytes.len() != 1 || !bytes[0].is_ascii() || bytes[0] == b'"' || bytes[0] == b'\n' {
        return Err(AddrNormError::InvalidDelimiter(raw.to_string()));
    }
    Ok(bytes[0])
}

/// Streams batches of [`Record`]s from a CSV source.
pub struct CsvBatchReader<R: Read> {
    reader: csv::Reader<R>,
    layout: CsvLayout,
    encoding: &'static Encoding,
    chunk_size: usize,
    next_row_id: usize,
    skipped: usize,
    done: bool,
}

impl CsvBatchReader<File> {
    /// Open a file for batched reading.
    pub fn open(path: impl AsRef<Path>, options: &ReaderOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| AddrNormError::io(path, e))?;
        Self::from_reader(file, options)
    }
}

impl<R: Read> CsvBatchReader<R> {
    /// Wrap any reader. The header row is read immediately.
    pub fn from_reader(source: R, options: &ReaderOptions) -> Result<Self> {
        if options.chunk_size == 0 {
            return Err(AddrNormError::Config("chunk size must be at least 1".to_string()));
        }
        let encoding = resolve_encoding(&options.encoding)?;

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(options.delimiter)
            .quote(b'"')
            .double_quote(true)
            .escape(Some(b'\\'))
            .has_headers(true)
            .flexible(true)
            .from_reader(source);

        let header_cells: Vec<String> = reader
            .byte_headers()?
            .iter()
            .map(|cell| decode_field(encoding, cell))
            .collect();
        let layout = CsvLayout::from_headers(header_cells);

        Ok(Self {
            reader,
            layout,
            encoding,
            chunk_size: options.chunk_size,
            next_row_id: 1,
            skipped: 0,
            done: false,
        })
    }

    /// Column roles derived from the header.
    pub fn layout(&self) -> &CsvLayout {
        &self.layout
    }

    /// Number of malformed rows skipped so far.
    pub fn skipped_rows(&self) -> usize {
        self.skipped
    }

    fn read_batch(&mut self) -> Result<Vec<Record>> {
        let width = self.layout.width();
        let mut batch = Vec::with_capacity(self.chunk_size.min(1024));
        let mut raw = csv::ByteRecord::new();

        while batch.len() < self.chunk_size {
            match self.reader.read_byte_record(&mut raw) {
                Ok(false) => {
                    self.done = true;
                    break;
                }
                Ok(true) => {
                    let mut values: Vec<String> = raw
                        .iter()
                        .take(width)
                        .map(|cell| decode_field(self.encoding, cell))
                        .collect();
                    values.resize(width, String::new());
                    batch.push(self.layout.build_record(self.next_row_id, &values));
                    self.next_row_id += 1;
                }
                Err(e) if e.is_io_error() => return Err(e.into()),
                Err(e) => {
                    let line = e.position().map(|p| p.line()).unwrap_or_default();
                    warn!(line, error = %e, "skipping malformed CSV row");
                    self.skipped += 1;
                }
            }
        }
        Ok(batch)
    }
}

impl<R: Read> Iterator for CsvBatchReader<R> {
    type Item = Result<Vec<Record>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_batch() {
            Ok(batch) if batch.is_empty() => None,
            Ok(batch) => Some(Ok(batch)),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn decode_field(encoding: &'static Encoding, bytes: &[u8]) -> String {
    let (text, _had_errors) = encoding.decode_without_bom_handling(bytes);
    text.into_owned()
}
