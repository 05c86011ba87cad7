use chrono::{DateTime, Utc};

use crate::{ChannelId, Context, Result, VideoInfo};

/// Caller-supplied constraints on a listing call.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Stop once this many videos have been collected.
    pub max_results: Option<usize>,
    /// Only return videos published strictly after this instant.
    pub published_after: Option<DateTime<Utc>>,
}

/// The result of an incremental listing call.
#[derive(Debug, Clone)]
pub struct IncrementalResult {
    /// The videos observed in this call, newest first.
    pub videos: Vec<VideoInfo>,
    /// How many of `videos` are newer than the caller's prior high-water
    /// mark.
    pub new_videos_count: usize,
    /// The newest `published` timestamp observed, if any.
    pub newest_timestamp: Option<DateTime<Utc>>,
    /// The oldest `published` timestamp observed, if any.
    pub oldest_timestamp: Option<DateTime<Utc>>,
    /// True when the sliding window's oldest entry is newer than the
    /// caller's prior high-water mark, implying uploads may have scrolled
    /// out of view.
    pub gap_detected: bool,
}

/// The capability every lister implementation (Feed, Paginated, Official,
/// Fallback) exposes to the sync orchestrator.
///
/// Dynamic dispatch is expressed through this trait object rather than
/// through runtime type identity; the orchestrator tracks *which*
/// implementation it used via the `Strategy` enum it persists, not by
/// downcasting.
#[async_trait::async_trait]
pub trait Lister: Send + Sync {
    /// List up to `opts.max_results` of the channel's most recent videos.
    async fn list_videos(
        &self,
        ctx: &Context,
        channel: &ChannelId,
        opts: &ListOptions,
    ) -> Result<Vec<VideoInfo>>;

    /// Whether this lister can enumerate a channel's entire upload
    /// history, or only a bounded recent window.
    fn supports_full_history(&self) -> bool;
}
