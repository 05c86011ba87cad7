//! Atom 1.0 feed deserialization shapes.
//!
//! The upstream feed carries `yt:videoId`/`yt:channelId` and `media:group`
//! extensions alongside the plain Atom elements; `quick-xml`'s serde
//! deserializer matches tag names literally, so the namespaced fields are
//! renamed to their exact on-wire spelling rather than stripped of prefix.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use vidsync_core::{ChannelId, Error, Result, VideoInfo, VideoKind};

#[derive(Debug, Deserialize)]
pub(crate) struct Feed {
    #[serde(rename = "entry", default)]
    pub(crate) entries: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Entry {
    #[allow(dead_code)]
    id: String,
    #[serde(rename = "yt:videoId")]
    video_id: String,
    #[serde(rename = "yt:channelId")]
    channel_id: String,
    title: String,
    author: Author,
    published: String,
    #[serde(rename = "media:group")]
    media_group: MediaGroup,
}

#[derive(Debug, Deserialize)]
struct Author {
    name: String,
}

#[derive(Debug, Deserialize)]
struct MediaGroup {
    #[serde(rename = "media:thumbnail")]
    thumbnail: Thumbnail,
    #[serde(rename = "media:description", default)]
    description: String,
    #[serde(rename = "media:community", default)]
    community: Option<Community>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    #[serde(rename = "@url")]
    url: String,
}

#[derive(Debug, Deserialize)]
struct Community {
    #[serde(rename = "media:statistics")]
    statistics: Statistics,
}

#[derive(Debug, Deserialize)]
struct Statistics {
    #[serde(rename = "@views", default)]
    views: u64,
}

impl Entry {
    pub(crate) fn into_video_info(self) -> Result<VideoInfo> {
        let channel_id = ChannelId::new(self.channel_id)?;
        let published = DateTime::parse_from_rfc3339(&self.published)
            .map_err(|err| Error::Malformed(format!("unparseable published timestamp: {err}")))?
            .with_timezone(&Utc);

        Ok(VideoInfo {
            id: self.video_id,
            title: self.title,
            channel_id,
            channel_name: self.author.name,
            published,
            duration: std::time::Duration::ZERO,
            description: self.media_group.description,
            thumbnail_url: self.media_group.thumbnail.url,
            view_count: self
                .media_group
                .community
                .map(|c| c.statistics.views)
                .unwrap_or(0),
            kind: VideoKind::Video,
        })
    }
}

pub(crate) fn parse(body: &[u8]) -> Result<Vec<VideoInfo>> {
    let feed: Feed =
        quick_xml::de::from_reader(body).map_err(|err| Error::Malformed(err.to_string()))?;
    feed.entries
        .into_iter()
        .map(Entry::into_video_info)
        .collect()
}
