//! Internal JSON API paginated channel lister (C7): continuation-token
//! pagination over the platform's internal `browse` endpoint.
//!
//! Applies a try-one-shape-then-the-next probing idiom to response
//! *schema shapes* rather than hosts: a first page can render as a
//! rich-grid or a section-list, and a continuation page arrives as an
//! `appendContinuationItems` action; [`parse::parse_page`] probes all
//! three in a fixed order.

#![warn(missing_docs)]

mod parse;
mod state;

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use serde::Serialize;
use vidsync_core::{
    ChannelId, Context, Error, ListOptions, Lister, RequestEnvelope, Result, VideoInfo,
};
use vidsync_http::Pipeline;

pub use state::{ContinuationState, DEFAULT_TOKEN_TTL};

/// The client-identity block every internal-API request carries:
/// `{context: {client: {clientName, clientVersion, hl, gl}}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientIdentity {
    /// The platform's internal client name constant (e.g. `"WEB"`).
    pub client_name: String,
    /// The client version string the platform expects.
    pub client_version: String,
    /// Interface language.
    pub hl: String,
    /// Interface geography.
    pub gl: String,
}

impl Default for ClientIdentity {
    fn default() -> Self {
        Self {
            client_name: "WEB".to_string(),
            client_version: "2.20240101.00.00".to_string(),
            hl: "en".to_string(),
            gl: "US".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct RequestContext {
    client: ClientIdentity,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BrowseRequest {
    context: RequestContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    browse_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    continuation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<String>,
}

/// Selects the channel's "Videos" tab on the first-page `browse` call.
const VIDEOS_TAB_PARAMS: &str = "EgZ2aWRlb3PyBgQKAjoA";

/// Lists a channel's uploads by walking the internal JSON API's
/// continuation-token pagination.
pub struct PaginatedLister {
    pipeline: Arc<Pipeline>,
    browse_url: String,
    identity: ClientIdentity,
}

impl PaginatedLister {
    /// Build a paginated lister against the default internal browse
    /// endpoint.
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            browse_url: "https://www.youtube.com/youtubei/v1/browse".to_string(),
            identity: ClientIdentity::default(),
        }
    }

    /// Build a paginated lister against a caller-supplied endpoint (tests,
    /// or a proxy deployment).
    pub fn with_browse_url(pipeline: Arc<Pipeline>, browse_url: impl Into<String>) -> Self {
        Self {
            pipeline,
            browse_url: browse_url.into(),
            identity: ClientIdentity::default(),
        }
    }

    /// Validate that `token` decodes as URL-safe base64 without attempting
    /// to interpret the decoded protobuf bytes (spec.md §4.7: "the client
    /// treats them as opaque but validates non-empty decodability before
    /// persisting").
    pub fn validate_token(token: &str) -> Result<()> {
        if token.is_empty() {
            return Err(Error::Malformed("empty continuation token".to_string()));
        }
        let decoded = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|err| Error::Malformed(format!("undecodable continuation token: {err}")))?;
        if decoded.is_empty() {
            return Err(Error::Malformed("continuation token decodes to zero bytes".to_string()));
        }
        Ok(())
    }

    async fn browse(
        &self,
        ctx: &Context,
        channel: &ChannelId,
        token: Option<&str>,
    ) -> Result<parse::Page> {
        let body = if let Some(token) = token {
            BrowseRequest {
                context: RequestContext { client: self.identity.clone() },
                browse_id: None,
                continuation: Some(token.to_string()),
                params: None,
            }
        } else {
            BrowseRequest {
                context: RequestContext { client: self.identity.clone() },
                browse_id: Some(channel.uploads_playlist_id()),
                continuation: None,
                params: Some(VIDEOS_TAB_PARAMS.to_string()),
            }
        };

        let payload = serde_json::to_vec(&body)?;
        let req = RequestEnvelope::post_json(self.browse_url.clone(), payload, ctx.clone());
        let resp = self.pipeline.execute(req).await?;
        Ok(parse::parse_page(&resp.body, channel, channel.as_str()))
    }

    /// List a channel's uploads, resuming from `resume_from` if it targets
    /// this channel and is not expired, otherwise starting from the first
    /// page.
    ///
    /// Returns the accumulated videos and the cursor the caller should
    /// persist for a future resume (spec.md §4.7).
    pub async fn list_videos_resumable(
        &self,
        ctx: &Context,
        channel: &ChannelId,
        opts: &ListOptions,
        resume_from: Option<ContinuationState>,
    ) -> Result<(Vec<VideoInfo>, ContinuationState)> {
        let now = Utc::now();
        let mut state = match resume_from {
            Some(s) if s.can_resume_for(channel, now) => s,
            _ => ContinuationState::fresh(channel.clone(), now),
        };

        let mut videos = Vec::new();
        loop {
            if let Some(err) = ctx.err() {
                return Err(err);
            }

            let token = if state.token.is_empty() { None } else { Some(state.token.as_str()) };
            let page = self.browse(ctx, channel, token).await?;

            let mut stop = false;
            let page_start = videos.len();
            for video in page.videos {
                if let Some(after) = opts.published_after {
                    if video.published <= after {
                        stop = true;
                        break;
                    }
                }
                videos.push(video);
                if let Some(max) = opts.max_results {
                    if videos.len() >= max {
                        stop = true;
                        break;
                    }
                }
            }
            let added_this_page = videos.len() - page_start;

            let last_video_id = videos.last().map(|v: &VideoInfo| v.id.clone());
            let now = Utc::now();
            match page.next_token {
                Some(next) if !stop => {
                    if Self::validate_token(&next).is_ok() {
                        state.advance(next, added_this_page, last_video_id, now);
                    } else {
                        tracing::warn!(channel = channel.as_str(), "undecodable continuation token, stopping");
                        state.advance(String::new(), added_this_page, last_video_id, now);
                        break;
                    }
                }
                _ => {
                    state.advance(String::new(), added_this_page, last_video_id, now);
                    break;
                }
            }

            if let Some(max) = opts.max_results {
                if videos.len() >= max {
                    break;
                }
            }
        }

        Ok((videos, state))
    }
}

#[async_trait::async_trait]
impl Lister for PaginatedLister {
    async fn list_videos(
        &self,
        ctx: &Context,
        channel: &ChannelId,
        opts: &ListOptions,
    ) -> Result<Vec<VideoInfo>> {
        let (videos, _state) = self.list_videos_resumable(ctx, channel, opts, None).await?;
        Ok(videos)
    }

    fn supports_full_history(&self) -> bool {
        true
    }
}
