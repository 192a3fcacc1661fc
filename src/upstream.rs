//! Blocking client for the Gemini generative-language API.
//!
//! The provider is driven through `reqwest::blocking`, so every call here
//! performs blocking network I/O and must run on a worker thread
//! (`tokio::task::spawn_blocking`), never on the async scheduler.

use crate::gemini::{self, ModelEntry};
use axum::http::StatusCode;
use serde_json::Value;
use std::io::{BufRead, BufReader, Lines};
use std::time::Duration;

const API_VERSION: &str = "v1beta";
const API_KEY_HEADER: &str = "x-goog-api-key";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    Network,
    Http,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct UpstreamError {
    pub kind: UpstreamErrorKind,
    pub status: Option<StatusCode>,
    pub message: String,
}

impl UpstreamError {
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: UpstreamErrorKind::Network,
            status: None,
            message: message.into(),
        }
    }

    pub fn http(status: Option<StatusCode>, message: impl Into<String>) -> Self {
        Self {
            kind: UpstreamErrorKind::Http,
            status,
            message: message.into(),
        }
    }
}

pub struct GeminiClient {
    http: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    /// Builds the client. Constructing a blocking reqwest client spawns its
    /// own runtime thread, so callers on the async side wrap this in
    /// `spawn_blocking` too.
    pub fn new(api_key: &str, base_url: &str) -> Result<Self, UpstreamError> {
        let http = reqwest::blocking::Client::builder()
            .user_agent("gollama/0.1")
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| UpstreamError::network(err.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Single-shot `generateContent` call. The model name is namespaced to
    /// the provider as `models/{model}`.
    pub fn generate(&self, model: &str, body: &Value) -> Result<Value, UpstreamError> {
        let url = format!(
            "{}/{}/models/{}:generateContent",
            self.base_url, API_VERSION, model
        );
        let resp = self
            .http
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .map_err(|err| UpstreamError::network(err.to_string()))?;
        let resp = check_status(resp)?;
        resp.json::<Value>()
            .map_err(|err| UpstreamError::http(None, err.to_string()))
    }

    /// Streaming `streamGenerateContent` call. Returns a blocking iterator
    /// over text fragments in upstream order; iterating performs network
    /// reads per fragment.
    pub fn generate_stream(
        &self,
        model: &str,
        body: &Value,
    ) -> Result<FragmentIter, UpstreamError> {
        let url = format!(
            "{}/{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, API_VERSION, model
        );
        let resp = self
            .http
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .map_err(|err| UpstreamError::network(err.to_string()))?;
        let resp = check_status(resp)?;
        Ok(FragmentIter {
            lines: BufReader::new(resp).lines(),
            done: false,
        })
    }

    /// Fetches the provider's model list, following `nextPageToken` until
    /// the catalog is exhausted.
    pub fn list_models(&self) -> Result<Vec<ModelEntry>, UpstreamError> {
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut url = format!("{}/{}/models?pageSize=1000", self.base_url, API_VERSION);
            if let Some(token) = &page_token {
                url.push_str("&pageToken=");
                url.push_str(token);
            }
            let resp = self
                .http
                .get(url)
                .header(API_KEY_HEADER, &self.api_key)
                .send()
                .map_err(|err| UpstreamError::network(err.to_string()))?;
            let resp = check_status(resp)?;
            let value = resp
                .json::<Value>()
                .map_err(|err| UpstreamError::http(None, err.to_string()))?;
            entries.extend(gemini::decode_model_entries(&value));
            page_token = value
                .get("nextPageToken")
                .and_then(|v| v.as_str())
                .filter(|token| !token.is_empty())
                .map(str::to_string);
            if page_token.is_none() {
                return Ok(entries);
            }
        }
    }
}

fn check_status(
    resp: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, UpstreamError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().unwrap_or_default();
    Err(UpstreamError::http(
        Some(status),
        format!("upstream status {status}: {text}"),
    ))
}

/// Iterator over the text fragments of one streamed generation.
///
/// The provider answers with server-sent events, one JSON chunk per `data:`
/// line; chunks without candidate text (safety or usage frames) are skipped.
/// The iterator ends at connection close and stays ended after the first
/// error.
pub struct FragmentIter {
    lines: Lines<BufReader<reqwest::blocking::Response>>,
    done: bool,
}

impl Iterator for FragmentIter {
    type Item = Result<String, UpstreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        for line in self.lines.by_ref() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    self.done = true;
                    return Some(Err(UpstreamError::network(err.to_string())));
                }
            };
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data.is_empty() {
                continue;
            }
            let chunk: Value = match serde_json::from_str(data) {
                Ok(chunk) => chunk,
                Err(err) => {
                    self.done = true;
                    return Some(Err(UpstreamError::http(
                        None,
                        format!("malformed stream chunk: {err}"),
                    )));
                }
            };
            if let Some(text) = gemini::fragment_text(&chunk) {
                return Some(Ok(text));
            }
        }
        self.done = true;
        None
    }
}
