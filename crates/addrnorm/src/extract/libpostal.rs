//! HTTP client for a libpostal REST service.
//!
//! The service is expected at `POST /parser` with `{"query": "..."}`.
//! Older images only expose `POST /parse` with `{"address": "..."}`; that
//! shape is tried once when the primary endpoint answers 400 or 404, as
//! long as it resolves to a different URL.

use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use serde_json::{Value, json};
use tracing::debug;

use super::parser::{AddressParser, ParsedAddress};
use crate::error::{AddrNormError, Result};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings for the parsing service.
#[derive(Debug, Clone)]
pub struct LibpostalConfig {
    /// Primary endpoint, e.g. `http://localhost:8080/parser`.
    pub url: String,
    /// Alternate endpoint; derived from `url` when unset.
    pub alternate_url: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Attempts per endpoint for 429/5xx answers.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles each time.
    pub backoff: Duration,
}

impl LibpostalConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            alternate_url: None,
            timeout: DEFAULT_TIMEOUT,
            max_attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }

    pub fn with_alternate_url(mut self, url: impl Into<String>) -> Self {
        self.alternate_url = Some(url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff = backoff;
        self
    }

    /// Alternate endpoint: explicit, or `/parser` replaced by `/parse`.
    pub fn resolved_alternate_url(&self) -> String {
        self.alternate_url
            .clone()
            .unwrap_or_else(|| self.url.replace("/parser", "/parse"))
    }
}

/// Blocking client sharing one connection pool for the whole job.
pub struct LibpostalClient {
    client: Client,
    config: LibpostalConfig,
    alternate_url: Option<String>,
}

impl LibpostalClient {
    pub fn new(config: LibpostalConfig) -> Result<Self> {
        if config.url.trim().is_empty() {
            return Err(AddrNormError::Config("parser URL is empty".to_string()));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AddrNormError::Config(format!("Failed to create HTTP client: {}", e)))?;
        let alternate_url = Some(config.resolved_alternate_url()).filter(|alt| *alt != config.url);
        Ok(Self {
            client,
            config,
            alternate_url,
        })
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// POST with retries on 429 and 5xx. Transport errors are not retried.
    fn post(&self, url: &str, body: &Value) -> Result<Response> {
        let mut attempt = 1;
        loop {
            let response = self
                .client
                .post(url)
                .json(body)
                .send()
                .map_err(|e| AddrNormError::Parser(format!("request to {} failed: {}", url, e)))?;

            let status = response.status();
            let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            if !retryable || attempt >= self.config.max_attempts {
                return Ok(response);
            }
            let delay = self.config.backoff * 2u32.saturating_pow(attempt - 1);
            debug!(url, %status, attempt, "parser busy, retrying");
            thread::sleep(delay);
            attempt += 1;
        }
    }
}

/// Decode either a `[{label, value}]` list or a flat object.
fn decode_body(body: Value) -> ParsedAddress {
    match body {
        Value::Array(items) => ParsedAddress::from_labels(items.iter().filter_map(|item| {
            let label = item.get("label")?.as_str()?;
            let value = item.get("value")?.as_str()?;
            Some((label.to_string(), value.to_string()))
        })),
        Value::Object(map) => ParsedAddress::from_labels(map.iter().filter_map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => return None,
            };
            Some((k.clone(), value))
        })),
        _ => ParsedAddress::new(),
    }
}

fn read_parsed(response: Response) -> Result<ParsedAddress> {
    let body: Value = response
        .json()
        .map_err(|e| AddrNormError::Parser(format!("unreadable parser response: {}", e)))?;
    Ok(decode_body(body))
}

impl AddressParser for LibpostalClient {
    fn parse(&self, text: &str) -> Result<ParsedAddress> {
        let response = self.post(&self.config.url, &json!({ "query": text }))?;
        match response.status() {
            StatusCode::OK => read_parsed(response),
            status @ (StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND) => {
                let Some(alternate) = &self.alternate_url else {
                    return Err(AddrNormError::Parser(format!("parser answered {}", status)));
                };
                let fallback = self.post(alternate, &json!({ "address": text }))?;
                match fallback.status() {
                    StatusCode::OK => read_parsed(fallback),
                    status => Err(AddrNormError::Parser(format!(
                        "alternate endpoint answered {}",
                        status
                    ))),
                }
            }
            status => Err(AddrNormError::Parser(format!("parser answered {}", status))),
        }
    }

    fn name(&self) -> &str {
        "libpostal"
    }
}
