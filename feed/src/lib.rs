//! Atom feed channel lister (C6): a bounded sliding window of the most
//! recent uploads, with gap detection against a caller-supplied
//! high-water mark.

#![warn(missing_docs)]

mod atom;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use vidsync_core::{
    ChannelId, Context, Error, IncrementalResult, ListOptions, Lister, RequestEnvelope, Result,
    VideoInfo,
};
use vidsync_http::Pipeline;

/// The sliding window size the upstream feed exposes (N ≈ 15).
pub const FEED_WINDOW: usize = 15;

/// Lists a channel's most recent uploads from its public Atom feed.
pub struct FeedLister {
    pipeline: Arc<Pipeline>,
    base_url: String,
}

impl FeedLister {
    /// Build a feed lister against the default feed endpoint.
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            base_url: "https://www.youtube.com/feeds/videos.xml".to_string(),
        }
    }

    /// Build a feed lister against a caller-supplied base URL (tests, or a
    /// mirror/proxy deployment).
    pub fn with_base_url(pipeline: Arc<Pipeline>, base_url: impl Into<String>) -> Self {
        Self {
            pipeline,
            base_url: base_url.into(),
        }
    }

    fn feed_url(&self, channel: &ChannelId) -> String {
        format!("{}?channel_id={}", self.base_url, channel.as_str())
    }

    async fn fetch(&self, ctx: &Context, channel: &ChannelId) -> Result<Vec<VideoInfo>> {
        let req = RequestEnvelope::get(self.feed_url(channel), ctx.clone());
        let resp = self.pipeline.execute(req).await?;
        let mut videos = atom::parse(&resp.body)?;
        videos.sort_by(|a, b| b.published.cmp(&a.published));
        videos.truncate(FEED_WINDOW);
        Ok(videos)
    }

    /// List recent uploads, reporting new-video count and gap detection
    /// against `last_sync_newest`.
    ///
    /// `gapDetected ⇔ lastSyncNewest ≠ zero ∧ oldestTimestamp >
    /// lastSyncNewest`; the first-ever sync (`last_sync_newest = None`) is
    /// never a gap.
    pub async fn list_incremental(
        &self,
        ctx: &Context,
        channel: &ChannelId,
        last_sync_newest: Option<DateTime<Utc>>,
        opts: &ListOptions,
    ) -> Result<IncrementalResult> {
        let videos = self.fetch(ctx, channel).await?;
        let newest_timestamp = videos.first().map(|v| v.published);
        let oldest_timestamp = videos.last().map(|v| v.published);

        let gap_detected = match (last_sync_newest, oldest_timestamp) {
            (Some(last), Some(oldest)) => oldest > last,
            _ => false,
        };
        if gap_detected {
            tracing::debug!(channel = channel.as_str(), "feed window gap detected");
        }

        let mut new_videos: Vec<VideoInfo> = match last_sync_newest {
            Some(last) => videos.into_iter().filter(|v| v.published > last).collect(),
            None => videos,
        };
        if let Some(after) = opts.published_after {
            new_videos.retain(|v| v.published > after);
        }
        if let Some(max) = opts.max_results {
            new_videos.truncate(max);
        }

        Ok(IncrementalResult {
            new_videos_count: new_videos.len(),
            videos: new_videos,
            newest_timestamp,
            oldest_timestamp,
            gap_detected,
        })
    }
}

#[async_trait::async_trait]
impl Lister for FeedLister {
    async fn list_videos(
        &self,
        ctx: &Context,
        channel: &ChannelId,
        opts: &ListOptions,
    ) -> Result<Vec<VideoInfo>> {
        let mut videos = self.fetch(ctx, channel).await?;
        if let Some(after) = opts.published_after {
            videos.retain(|v| v.published > after);
        }
        if let Some(max) = opts.max_results {
            videos.truncate(max);
        }
        Ok(videos)
    }

    fn supports_full_history(&self) -> bool {
        false
    }
}

/// Validate that `raw` is a channel id or a bare channel URL, never a
/// handle: handles raise `InvalidUrl` here, since handle resolution
/// belongs to the resolver crate.
pub fn reject_handles(raw: &str) -> Result<()> {
    if raw.contains("/@") || (raw.starts_with('@') && !raw.contains('/')) {
        return Err(Error::InvalidUrl(raw.to_string()));
    }
    Ok(())
}
