//! Address parser trait and the parsed-component type.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Parser labels and the component names they map to.
const LABEL_MAP: &[(&str, &str)] = &[
    ("house_number", "house_number"),
    ("road", "road"),
    ("unit", "unit"),
    ("suburb", "suburb"),
    ("city", "city"),
    ("state", "state"),
    ("postcode", "zip"),
    ("country", "country"),
];

/// Components extracted from free-form address text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedAddress {
    components: IndexMap<String, String>,
}

impl ParsedAddress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw parser labels.
    ///
    /// Labels are mapped to pipeline names (`postcode` becomes `zip`,
    /// hyphenated variants are accepted); unknown labels and empty values
    /// are dropped. A repeated label keeps its last value.
    pub fn from_labels<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut parsed = Self::new();
        for (label, value) in pairs {
            let label = label.as_ref().trim().to_lowercase().replace('-', "_");
            let value = value.as_ref().trim();
            if value.is_empty() {
                continue;
            }
            if let Some((_, name)) = LABEL_MAP.iter().find(|(src, _)| *src == label) {
                parsed.components.insert(name.to_string(), value.to_string());
            }
        }
        parsed
    }

    /// Set a component by its pipeline name.
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.trim().is_empty() {
            self.components.insert(name.to_string(), value.trim().to_string());
        }
        self
    }

    /// A component by pipeline name (`road`, `city`, `zip`, ...).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.components.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Street line from road, house number and unit.
    ///
    /// The house number is skipped when the road already contains it.
    pub fn compose_street(&self) -> String {
        let road = self.get("road").unwrap_or("");
        let mut parts: Vec<&str> = Vec::with_capacity(3);
        if !road.is_empty() {
            parts.push(road);
        }
        if let Some(number) = self.get("house_number") {
            if !road.contains(number) {
                parts.push(number);
            }
        }
        if let Some(unit) = self.get("unit") {
            parts.push(unit);
        }
        parts.join(", ")
    }
}

/// A source of address components for free-form text.
pub trait AddressParser: Send + Sync {
    /// Parse one address. An empty result counts as "nothing found".
    fn parse(&self, text: &str) -> Result<ParsedAddress>;

    /// Short name for logs.
    fn name(&self) -> &str;
}
