//! Official keyed-API channel lister (C8): pagination over
//! `playlistItems.list` against a channel's uploads playlist, with
//! client-side quota estimation and delegation to a fallback lister on
//! exhaustion.
//!
//! The delegate-on-exhaustion shape mirrors a host-fallback client:
//! instead of trying the next host, once the quota estimate runs low,
//! remaining work is handed to a caller-supplied `Arc<dyn Lister>`.

#![warn(missing_docs)]

mod api;
mod state;

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use vidsync_core::{
    ChannelId, Context, Error, ListOptions, Lister, QuotaConfig, RequestEnvelope, Result,
    VideoInfo,
};
use vidsync_http::Pipeline;

pub use state::QuotaState;

const PAGE_SIZE: u32 = 50;

/// Lists a channel's uploads via the official keyed REST API.
pub struct QuotaLister {
    pipeline: Arc<Pipeline>,
    api_key: String,
    base_url: String,
    cfg: QuotaConfig,
    state: Mutex<QuotaState>,
    fallback: Option<Arc<dyn Lister>>,
}

impl QuotaLister {
    /// Build a quota-aware lister against the default official API host.
    pub fn new(pipeline: Arc<Pipeline>, api_key: impl Into<String>, cfg: QuotaConfig) -> Self {
        let now = Utc::now();
        Self {
            pipeline,
            api_key: api_key.into(),
            base_url: "https://www.googleapis.com/youtube/v3".to_string(),
            state: Mutex::new(QuotaState::new(&cfg, now)),
            cfg,
            fallback: None,
        }
    }

    /// Build a quota-aware lister against a caller-supplied base URL
    /// (tests, or a proxy deployment).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Attach a fallback lister to delegate to once quota is exhausted.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Arc<dyn Lister>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Whether the quota estimate has dropped below the configured
    /// reserve.
    pub fn quota_exhausted(&self) -> bool {
        self.state.lock().is_exhausted(&self.cfg, Utc::now())
    }

    fn spend(&self, units: u64) {
        self.state.lock().spend(&self.cfg, units, Utc::now());
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        ctx: &Context,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let mut url = format!("{}/{path}?key={}", self.base_url, self.api_key);
        for (k, v) in query {
            url.push('&');
            url.push_str(k);
            url.push('=');
            url.push_str(&urlencode(v));
        }
        let req = RequestEnvelope::get(url, ctx.clone());
        let resp = self.pipeline.execute(req).await?;
        serde_json::from_slice(&resp.body).map_err(|err| Error::Malformed(err.to_string()))
    }

    /// Resolve a handle or custom-URL slug to a channel id via
    /// `search.list` (≈100 units).
    pub async fn resolve_handle(&self, ctx: &Context, handle: &str) -> Result<ChannelId> {
        let resp: api::SearchListResponse = self
            .get_json(ctx, "search", &[("part", "snippet"), ("type", "channel"), ("q", handle)])
            .await?;
        self.spend(self.cfg.search_cost);
        resp.first_channel_id()
    }

    /// Resolve a channel's uploads-playlist id via `channels.list`
    /// (1 unit).
    pub async fn uploads_playlist_id(&self, ctx: &Context, channel: &ChannelId) -> Result<String> {
        let resp: api::ChannelsListResponse = self
            .get_json(ctx, "channels", &[("part", "contentDetails"), ("id", channel.as_str())])
            .await?;
        self.spend(self.cfg.channels_cost);
        resp.uploads_playlist_id()
    }

    async fn playlist_page(
        &self,
        ctx: &Context,
        playlist_id: &str,
        page_token: Option<&str>,
    ) -> Result<(Vec<VideoInfo>, Option<String>)> {
        let max_results = PAGE_SIZE.to_string();
        let mut query = vec![
            ("part", "snippet,contentDetails"),
            ("playlistId", playlist_id),
            ("maxResults", max_results.as_str()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }
        let resp: api::PlaylistItemsResponse = self.get_json(ctx, "playlistItems", &query).await?;
        self.spend(self.cfg.playlist_items_cost);
        let videos: Result<Vec<VideoInfo>> =
            resp.items.into_iter().map(api::PlaylistItem::into_video_info).collect();
        Ok((videos?, resp.next_page_token))
    }

    /// List a channel's uploads, paginating `playlistItems.list` until
    /// exhausted, `opts` is satisfied, or the quota estimate runs out —
    /// in which case the partial result is merged with whatever a
    /// configured fallback lister appends.
    pub async fn list_videos_tracked(
        &self,
        ctx: &Context,
        channel: &ChannelId,
        opts: &ListOptions,
    ) -> Result<Vec<VideoInfo>> {
        if self.quota_exhausted() {
            if let Some(fallback) = &self.fallback {
                tracing::info!(channel = channel.as_str(), "quota already exhausted, delegating to fallback");
                return fallback.list_videos(ctx, channel, opts).await;
            }
            return Err(Error::QuotaExhausted);
        }

        let playlist_id = self.uploads_playlist_id(ctx, channel).await?;
        let mut videos = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            if let Some(err) = ctx.err() {
                return Err(err);
            }

            let (page, next_token) = self.playlist_page(ctx, &playlist_id, page_token.as_deref()).await?;
            let mut stop = false;
            for video in page {
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

            if stop || next_token.is_none() {
                break;
            }

            if self.quota_exhausted() {
                tracing::warn!(channel = channel.as_str(), "quota exhausted mid-pagination");
                if let Some(fallback) = &self.fallback {
                    let mut fallback_opts = opts.clone();
                    if let Some(max) = opts.max_results {
                        fallback_opts.max_results = Some(max.saturating_sub(videos.len()));
                    }
                    let extra = fallback.list_videos(ctx, channel, &fallback_opts).await?;
                    videos.extend(extra);
                }
                break;
            }

            page_token = next_token;
        }

        Ok(videos)
    }
}

#[async_trait::async_trait]
impl Lister for QuotaLister {
    async fn list_videos(
        &self,
        ctx: &Context,
        channel: &ChannelId,
        opts: &ListOptions,
    ) -> Result<Vec<VideoInfo>> {
        self.list_videos_tracked(ctx, channel, opts).await
    }

    fn supports_full_history(&self) -> bool {
        true
    }
}

fn urlencode(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}
