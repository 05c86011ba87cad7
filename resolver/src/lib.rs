//! Channel handle/URL resolution (C10): normalizes a bare id, a
//! `/channel/ID` URL, an `@handle`, or a `/c/custom` URL to a canonical
//! [`ChannelId`].
//!
//! The first step is pure pattern matching with no network involvement,
//! built on `core`'s own [`ChannelId::looks_like_id`] and
//! [`ChannelId::find_in_path`]. The second step falls back to an HTML
//! fetch, scanned with the `regex` crate for four marker patterns, in a
//! fixed order, the first match winning.

#![warn(missing_docs)]

use std::sync::{Arc, OnceLock};

use regex::Regex;
use vidsync_core::{ChannelId, Context, Error, RequestEnvelope, Result};
use vidsync_http::Pipeline;

/// Response bodies are truncated to this many bytes before scanning.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

fn channel_id_meta_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"itemprop="channelId"\s+content="(UC[\w-]{22})""#).unwrap())
}

fn external_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""externalId":"(UC[\w-]{22})""#).unwrap())
}

fn channel_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"/channel/(UC[\w-]{22})"#).unwrap())
}

fn browse_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""browseId":"(UC[\w-]{22})""#).unwrap())
}

/// Resolves channel handles, custom URLs, and channel URLs to canonical
/// [`ChannelId`]s.
pub struct ChannelResolver {
    pipeline: Arc<Pipeline>,
    base_url: String,
}

impl ChannelResolver {
    /// Build a resolver against the default platform host.
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            base_url: "https://www.youtube.com".to_string(),
        }
    }

    /// Build a resolver against a caller-supplied base URL (tests, or a
    /// mirror deployment).
    pub fn with_base_url(pipeline: Arc<Pipeline>, base_url: impl Into<String>) -> Self {
        Self { pipeline, base_url: base_url.into() }
    }

    /// Statelessly check whether `raw` already is, or contains, a
    /// canonical channel id; no network call is made.
    pub fn try_direct(raw: &str) -> Option<ChannelId> {
        if ChannelId::looks_like_id(raw) {
            return ChannelId::new(raw).ok();
        }
        ChannelId::find_in_path(raw)
    }

    /// The page URL to fetch in order to resolve `raw` — an `@handle`, a
    /// `/c/custom` URL, or a bare custom slug.
    fn page_url(&self, raw: &str) -> String {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            return raw.to_string();
        }
        if let Some(handle) = raw.strip_prefix('@') {
            return format!("{}/@{handle}", self.base_url);
        }
        if raw.starts_with('/') {
            return format!("{}{raw}", self.base_url);
        }
        format!("{}/@{raw}", self.base_url)
    }

    fn scan(body: &str) -> Option<ChannelId> {
        channel_id_meta_re()
            .captures(body)
            .or_else(|| external_id_re().captures(body))
            .or_else(|| channel_link_re().captures(body))
            .or_else(|| browse_id_re().captures(body))
            .and_then(|caps| ChannelId::new(caps[1].to_string()).ok())
    }

    /// Resolve `raw` to a canonical channel id, fetching the channel's
    /// page HTML only when no direct id is present.
    pub async fn resolve(&self, ctx: &Context, raw: &str) -> Result<ChannelId> {
        if let Some(id) = Self::try_direct(raw) {
            return Ok(id);
        }

        let url = self.page_url(raw);
        let req = RequestEnvelope::get(url, ctx.clone())
            .with_header("User-Agent", "Mozilla/5.0 (compatible; vidsync-resolver/1.0)");
        let resp = match self.pipeline.execute(req).await {
            Ok(resp) => resp,
            Err(Error::Http { status: 404, .. }) => {
                return Err(Error::ChannelNotFound(raw.to_string()));
            }
            Err(err) => return Err(err),
        };

        let truncated = &resp.body[..resp.body.len().min(MAX_BODY_BYTES)];
        let text = String::from_utf8_lossy(truncated);
        Self::scan(&text).ok_or_else(|| Error::ChannelNotFound(raw.to_string()))
    }
}
