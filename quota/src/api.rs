//! Wire shapes for the official keyed REST API: standard REST endpoints
//! addressed with an API key query parameter.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use vidsync_core::{ChannelId, Error, Result, VideoInfo, VideoKind};

#[derive(Debug, Deserialize)]
pub(crate) struct ChannelsListResponse {
    #[serde(default)]
    pub(crate) items: Vec<ChannelItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChannelItem {
    pub(crate) content_details: ContentDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ContentDetails {
    pub(crate) related_playlists: RelatedPlaylists,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RelatedPlaylists {
    pub(crate) uploads: String,
}

impl ChannelsListResponse {
    pub(crate) fn uploads_playlist_id(&self) -> Result<String> {
        self.items
            .first()
            .map(|item| item.content_details.related_playlists.uploads.clone())
            .ok_or_else(|| Error::Malformed("channels.list returned no items".to_string()))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchListResponse {
    #[serde(default)]
    pub(crate) items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchItem {
    pub(crate) snippet: SearchSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchSnippet {
    pub(crate) channel_id: String,
}

impl SearchListResponse {
    pub(crate) fn first_channel_id(&self) -> Result<ChannelId> {
        let raw = self
            .items
            .first()
            .map(|item| item.snippet.channel_id.clone())
            .ok_or_else(|| Error::ChannelNotFound("search.list returned no channels".to_string()))?;
        ChannelId::new(raw)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct PlaylistItemsResponse {
    #[serde(default)]
    pub(crate) items: Vec<PlaylistItem>,
    pub(crate) next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PlaylistItem {
    pub(crate) snippet: PlaylistSnippet,
    pub(crate) content_details: PlaylistContentDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PlaylistSnippet {
    pub(crate) title: String,
    pub(crate) channel_id: String,
    pub(crate) channel_title: String,
    pub(crate) description: String,
    pub(crate) published_at: DateTime<Utc>,
    pub(crate) thumbnails: Thumbnails,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Thumbnails {
    pub(crate) high: Option<Thumbnail>,
    pub(crate) default: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Thumbnail {
    pub(crate) url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PlaylistContentDetails {
    pub(crate) video_id: String,
}

impl PlaylistItem {
    pub(crate) fn into_video_info(self) -> Result<VideoInfo> {
        let channel_id = ChannelId::new(self.snippet.channel_id)?;
        let thumbnail_url = self
            .snippet
            .thumbnails
            .high
            .or(self.snippet.thumbnails.default)
            .map(|t| t.url)
            .unwrap_or_default();
        Ok(VideoInfo {
            id: self.content_details.video_id,
            title: self.snippet.title,
            channel_id,
            channel_name: self.snippet.channel_title,
            published: self.snippet.published_at,
            duration: std::time::Duration::ZERO,
            description: self.snippet.description,
            thumbnail_url,
            view_count: 0,
            kind: VideoKind::Video,
        })
    }
}
