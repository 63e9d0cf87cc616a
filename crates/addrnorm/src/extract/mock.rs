//! Mock parser for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::parser::{AddressParser, ParsedAddress};
use crate::error::{AddrNormError, Result};

/// Parser returning canned answers, or failing on demand.
#[derive(Debug, Default)]
pub struct MockParser {
    responses: HashMap<String, ParsedAddress>,
    fail: bool,
    calls: AtomicUsize,
}

impl MockParser {
    /// A parser with no canned answers (every lookup returns empty).
    pub fn new() -> Self {
        Self::default()
    }

    /// A parser that behaves like an unreachable service.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// Register the answer for one exact input text.
    pub fn with_response(mut self, text: impl Into<String>, parsed: ParsedAddress) -> Self {
        self.responses.insert(text.into(), parsed);
        self
    }

    /// Number of parse calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AddressParser for MockParser {
    fn parse(&self, text: &str) -> Result<ParsedAddress> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AddrNormError::Parser("mock parser unavailable".to_string()));
        }
        Ok(self.responses.get(text).cloned().unwrap_or_default())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
