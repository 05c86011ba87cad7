use std::collections::HashMap;

use reqwest::Method;

use crate::Context;

/// A transient, owned-by-the-caller request description handed to the HTTP
/// pipeline (C5).
///
/// The body must be plain bytes (not a stream) for the pipeline to be able
/// to retry after a failed attempt; a rewindable buffer is assumed rather
/// than an unbounded stream.
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    /// The HTTP method.
    pub method: Method,
    /// The fully-qualified request URL.
    pub url: String,
    /// An optional, seekable request body.
    pub body: Option<Vec<u8>>,
    /// Per-call header overrides; these take precedence over session
    /// headers but not vice versa.
    pub headers: HashMap<String, String>,
    /// The cancellation/deadline context for this call.
    pub context: Context,
}

impl RequestEnvelope {
    /// Build a GET request envelope against `url` under `context`.
    pub fn get(url: impl Into<String>, context: Context) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            body: None,
            headers: HashMap::new(),
            context,
        }
    }

    /// Build a POST request envelope with a JSON body.
    pub fn post_json(url: impl Into<String>, body: Vec<u8>, context: Context) -> Self {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        Self {
            method: Method::POST,
            url: url.into(),
            body: Some(body),
            headers,
            context,
        }
    }

    /// Add or override a header on this request.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// A transient, fully-buffered response. Buffering simplifies retry logic
/// since streaming would forbid retry after any body bytes are consumed.
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    /// The HTTP status code.
    pub status: u16,
    /// Response headers, lower-cased keys.
    pub headers: HashMap<String, String>,
    /// The fully-buffered response body.
    pub body: Vec<u8>,
}

impl ResponseEnvelope {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        let lower = name.to_ascii_lowercase();
        self.headers.get(&lower).map(String::as_str)
    }

    /// True for status codes in `[200, 300)`.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
