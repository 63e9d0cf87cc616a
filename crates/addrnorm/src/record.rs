//! Row representation shared by every pipeline stage.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One of the six canonical address fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Street,
    District,
    Locality,
    Region,
    Country,
    Zip,
}

impl Field {
    /// Canonical fields in output column order.
    pub const ALL: [Field; 6] = [
        Field::Street,
        Field::District,
        Field::Locality,
        Field::Region,
        Field::Country,
        Field::Zip,
    ];

    /// Column name used in output files and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Street => "street",
            Field::District => "district",
            Field::Locality => "locality",
            Field::Region => "region",
            Field::Country => "country",
            Field::Zip => "zip",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name of the catch-all column.
pub const ADDRESS_COLUMN: &str = "address";

/// A single input row moving through the pipeline.
///
/// The six canonical fields always exist; an empty string means "no value".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    /// 1-based position of the row in the input (header excluded).
    pub row_id: usize,
    fields: [String; 6],
    /// Catch-all for address text that is not yet split into fields.
    pub address: String,
    /// Source columns that are not canonical fields, in input order.
    pub extras: IndexMap<String, String>,
    /// Value of the first name-like auxiliary column, if any.
    pub person_name: Option<String>,
}

impl Record {
    /// Create an empty record.
    pub fn new(row_id: usize) -> Self {
        Self {
            row_id,
            ..Default::default()
        }
    }

    /// Current value of a canonical field.
    pub fn get(&self, field: Field) -> &str {
        &self.fields[field.index()]
    }

    /// Mutable access to a canonical field.
    pub fn get_mut(&mut self, field: Field) -> &mut String {
        &mut self.fields[field.index()]
    }

    /// Replace a canonical field.
    pub fn set(&mut self, field: Field, value: impl Into<String>) {
        self.fields[field.index()] = value.into();
    }

    /// Clear a canonical field, returning the previous value.
    pub fn take(&mut self, field: Field) -> String {
        std::mem::take(&mut self.fields[field.index()])
    }

    /// Whether a canonical field holds a value.
    pub fn has(&self, field: Field) -> bool {
        !self.fields[field.index()].is_empty()
    }

    /// Builder used mostly by tests.
    pub fn with(mut self, field: Field, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    /// Builder for the catch-all.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Snapshot of all six canonical values.
    pub fn fields(&self) -> &[String; 6] {
        &self.fields
    }
}
