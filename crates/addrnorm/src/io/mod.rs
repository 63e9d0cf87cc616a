//! Streaming CSV input and output.

mod layout;
mod reader;
mod writer;

pub use layout::{CsvLayout, is_contact_header, is_contact_value};
pub use reader::{CsvBatchReader, ReaderOptions, parse_delimiter, resolve_encoding};
pub use writer::{BatchWriter, WriterOptions};

pub(crate) use layout::{EMAIL_RE, PHONE_RE};
