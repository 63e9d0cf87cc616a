//! Fuzz target for the batched CSV reader.
//!
//! Malformed quoting, ragged rows and undecodable bytes must never panic;
//! every batch is either records or an error.

#![no_main]

use std::io::Cursor;

use addrnorm::io::{CsvBatchReader, ReaderOptions};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 100_000 {
        return;
    }

    for (encoding, delimiter) in [("utf-8", b','), ("windows-1252", b';'), ("tis-620", b'\t')] {
        let options = ReaderOptions {
            encoding: encoding.to_string(),
            delimiter,
            chunk_size: 7,
        };
        let Ok(mut reader) = CsvBatchReader::from_reader(Cursor::new(data), &options) else {
            continue;
        };
        let width = reader.layout().width();
        for batch in reader.by_ref() {
            let Ok(batch) = batch else { break };
            assert!(batch.len() <= 7);
            for record in &batch {
                assert!(record.extras.len() <= width);
            }
        }
        let _ = reader.skipped_rows();
    }
});
