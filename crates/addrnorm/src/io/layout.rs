//! Mapping between input header columns and canonical record fields.

use std::collections::HashSet;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::clean::is_null_value;
use crate::record::{Field, Record};

/// Header names (lower-case) recognized for each canonical field.
const FIELD_HEADERS: &[(Field, &[&str])] = &[
    (
        Field::Street,
        &["street", "street_address", "address1", "address_line1", "road"],
    ),
    (
        Field::District,
        &["district", "suburb", "subdistrict", "neighbourhood", "neighborhood"],
    ),
    (Field::Locality, &["locality", "city", "town", "municipality"]),
    (Field::Region, &["region", "state", "province"]),
    (Field::Country, &["country", "country_name"]),
    (
        Field::Zip,
        &["zip", "zipcode", "zip_code", "postcode", "postal_code", "postalcode"],
    ),
];

/// Header names recognized for the catch-all column.
const ADDRESS_HEADERS: &[&str] = &["address", "full_address", "raw_address"];

static CONTACT_HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)name|contact|e-?mail|phone|mobile|fax|person|recipient|(?:^|[^a-z])tel(?:[^a-z]|$)",
    )
    .unwrap()
});

pub(crate) static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}").unwrap());

pub(crate) static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\+?\d[\d \-()]{6,}\d").unwrap());

static PHONE_VALUE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?\d[\d \-()]{6,}\d$").unwrap());

/// Whether a header names a person or contact detail.
pub fn is_contact_header(header: &str) -> bool {
    CONTACT_HEADER_RE.is_match(header)
}

/// Whether a value looks like an email address or a phone number.
pub fn is_contact_value(value: &str) -> bool {
    let trimmed = value.trim();
    EMAIL_RE.is_match(trimmed) || PHONE_VALUE_RE.is_match(trimmed)
}

/// Resolved column roles for one input file.
#[derive(Debug, Clone)]
pub struct CsvLayout {
    headers: Vec<String>,
    field_columns: [Option<usize>; 6],
    address_column: Option<usize>,
    extra_columns: Vec<usize>,
    contact_columns: HashSet<usize>,
    person_name_column: Option<usize>,
    compose_address: bool,
}

impl CsvLayout {
    /// Build the layout from raw header cells.
    ///
    /// Header cells are trimmed; duplicate names get a numeric suffix so
    /// every auxiliary column keeps a distinct key.
    pub fn from_headers<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen: HashSet<String> = HashSet::new();
        let headers: Vec<String> = raw
            .into_iter()
            .enumerate()
            .map(|(i, h)| {
                let mut name = h.as_ref().trim().trim_start_matches('\u{feff}').to_string();
                if name.is_empty() {
                    name = format!("column_{}", i + 1);
                }
                let mut unique = name.clone();
                let mut n = 2;
                while !seen.insert(unique.to_lowercase()) {
                    unique = format!("{}_{}", name, n);
                    n += 1;
                }
                unique
            })
            .collect();

        let mut field_columns = [None; 6];
        let mut address_column = None;
        let mut extra_columns = Vec::new();

        for (idx, header) in headers.iter().enumerate() {
            let lower = header.to_lowercase();
            if let Some(field) = canonical_field(&lower) {
                let slot = &mut field_columns[field as usize];
                if slot.is_none() {
                    *slot = Some(idx);
                    continue;
                }
            } else if ADDRESS_HEADERS.contains(&lower.as_str()) && address_column.is_none() {
                address_column = Some(idx);
                continue;
            }
            extra_columns.push(idx);
        }

        let contact_columns: HashSet<usize> = extra_columns
            .iter()
            .copied()
            .filter(|&idx| is_contact_header(&headers[idx]))
            .collect();

        let person_name_column = extra_columns
            .iter()
            .copied()
            .find(|&idx| headers[idx].to_lowercase().contains("name"));

        let has_canonical = field_columns.iter().any(Option::is_some);
        let compose_address = address_column.is_some() || !has_canonical;

        Self {
            headers,
            field_columns,
            address_column,
            extra_columns,
            contact_columns,
            person_name_column,
            compose_address,
        }
    }

    /// Number of input columns.
    pub fn width(&self) -> usize {
        self.headers.len()
    }

    /// Trimmed, de-duplicated header names.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Input column feeding a canonical field.
    pub fn column_for(&self, field: Field) -> Option<usize> {
        self.field_columns[field as usize]
    }

    /// Input column feeding the catch-all.
    pub fn address_column(&self) -> Option<usize> {
        self.address_column
    }

    /// Names of auxiliary columns in input order.
    pub fn extra_headers(&self) -> impl Iterator<Item = &str> {
        self.extra_columns.iter().map(|&i| self.headers[i].as_str())
    }

    /// Whether auxiliary values are appended to the catch-all.
    pub fn composes_address(&self) -> bool {
        self.compose_address
    }

    /// Turn one padded row of values into a record.
    pub fn build_record(&self, row_id: usize, values: &[String]) -> Record {
        let value_at = |idx: usize| values.get(idx).map(String::as_str).unwrap_or("");
        let mut record = Record::new(row_id);

        for field in Field::ALL {
            if let Some(idx) = self.column_for(field) {
                record.set(field, value_at(idx).trim());
            }
        }

        let mut tail: Vec<&str> = Vec::new();
        let mut extras = IndexMap::with_capacity(self.extra_columns.len());
        for &idx in &self.extra_columns {
            let value = value_at(idx);
            extras.insert(self.headers[idx].clone(), value.to_string());

            if !self.compose_address || self.contact_columns.contains(&idx) {
                continue;
            }
            let trimmed = value.trim();
            if is_null_value(trimmed) || is_contact_value(trimmed) {
                continue;
            }
            tail.push(trimmed);
        }
        record.extras = extras;

        record.person_name = self
            .person_name_column
            .map(|idx| value_at(idx).trim().to_string())
            .filter(|v| !v.is_empty());

        let base = self
            .address_column
            .map(|idx| value_at(idx).trim())
            .unwrap_or("");
        let tail = tail.join(", ");
        record.address = match (base.is_empty(), tail.is_empty()) {
            (false, false) => format!("{}, {}", base, tail),
            (true, false) => tail,
            _ => base.to_string(),
        };

        record
    }
}

fn canonical_field(lower: &str) -> Option<Field> {
    FIELD_HEADERS
        .iter()
        .find(|(_, names)| names.contains(&lower))
        .map(|(field, _)| *field)
}
