use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ChannelId;

/// Whether a [`VideoInfo`] describes an on-demand video or a live stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoKind {
    /// A regular, on-demand video.
    Video,
    /// A live stream (current or completed).
    LiveStream,
}

/// The canonical record every lister produces, regardless of source.
///
/// Feed-sourced videos may carry a zero `duration` and zero `view_count`;
/// not every source populates these fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    /// The platform's video id.
    pub id: String,
    /// The video title.
    pub title: String,
    /// The channel that published this video.
    pub channel_id: ChannelId,
    /// The channel's display name at the time of the listing.
    pub channel_name: String,
    /// When the video was published.
    pub published: DateTime<Utc>,
    /// Duration of the video; zero if unknown (e.g. feed source).
    pub duration: std::time::Duration,
    /// The video's description, if available.
    pub description: String,
    /// A thumbnail image URL.
    pub thumbnail_url: String,
    /// View count at the time of the listing; zero if unknown.
    pub view_count: u64,
    /// Video vs. live stream.
    pub kind: VideoKind,
}
