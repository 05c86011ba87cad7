//! Multi-shape response probing for the internal JSON browse API.
//!
//! The response schema has several equivalent shapes depending on whether
//! this is the first page (rich-grid/section-list renderers nested under
//! `contents`) or a continuation page (`appendContinuationItems` actions),
//! and whether a title is `simpleText` or a `runs[]` array. spec.md §4.7's
//! parsing policy: probe all known shapes in a fixed order, return the
//! first non-empty result. Mirrors the teacher's `CdnClientWithFallback`
//! idiom of trying one shape, then falling back to the next
//! (`ngdp-cdn/src/fallback.rs`).

use chrono::{DateTime, Utc};
use serde_json::Value;

use vidsync_core::{ChannelId, VideoInfo, VideoKind};

/// One page's worth of extracted videos plus the token for the next page,
/// if any.
#[derive(Debug, Default)]
pub(crate) struct Page {
    pub(crate) videos: Vec<VideoInfo>,
    pub(crate) next_token: Option<String>,
}

/// Parse a browse response body, probing every known shape.
pub(crate) fn parse_page(body: &[u8], channel_id: &ChannelId, channel_name: &str) -> Page {
    let Ok(root) = serde_json::from_slice::<Value>(body) else {
        return Page::default();
    };

    let mut videos = extract_from_rich_grid(&root, channel_id, channel_name);
    if videos.is_empty() {
        videos = extract_from_section_list(&root, channel_id, channel_name);
    }
    if videos.is_empty() {
        videos = extract_from_continuation_items(&root, channel_id, channel_name);
    }

    let next_token = extract_append_continuation(&root)
        .or_else(|| extract_initial_continuation_from_rich_grid(&root))
        .or_else(|| extract_initial_continuation_from_section_list(&root));

    Page { videos, next_token }
}

fn tab_content<'a>(root: &'a Value) -> Option<&'a Value> {
    root.pointer("/contents/twoColumnBrowseResultsRenderer/tabs")?
        .as_array()?
        .iter()
        .find_map(|tab| tab.pointer("/tabRenderer/content"))
}

fn extract_from_rich_grid(root: &Value, channel_id: &ChannelId, channel_name: &str) -> Vec<VideoInfo> {
    let Some(content) = tab_content(root) else {
        return Vec::new();
    };
    let Some(items) = content.pointer("/richGridRenderer/contents").and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| item.pointer("/richItemRenderer/content/videoRenderer"))
        .filter_map(|renderer| video_from_renderer(renderer, channel_id, channel_name))
        .collect()
}

fn extract_from_section_list(root: &Value, channel_id: &ChannelId, channel_name: &str) -> Vec<VideoInfo> {
    let Some(content) = tab_content(root) else {
        return Vec::new();
    };
    let Some(sections) = content.pointer("/sectionListRenderer/contents").and_then(Value::as_array) else {
        return Vec::new();
    };
    sections
        .iter()
        .filter_map(|section| section.pointer("/itemSectionRenderer/contents"))
        .filter_map(Value::as_array)
        .flatten()
        .filter_map(|item| item.pointer("/gridRenderer/items"))
        .filter_map(Value::as_array)
        .flatten()
        .filter_map(|item| item.pointer("/gridVideoRenderer"))
        .filter_map(|renderer| video_from_renderer(renderer, channel_id, channel_name))
        .collect()
}

fn extract_from_continuation_items(root: &Value, channel_id: &ChannelId, channel_name: &str) -> Vec<VideoInfo> {
    let Some(actions) = root.get("onResponseReceivedActions").and_then(Value::as_array) else {
        return Vec::new();
    };
    actions
        .iter()
        .filter_map(|action| action.pointer("/appendContinuationItemsAction/continuationItems"))
        .filter_map(Value::as_array)
        .flatten()
        .filter_map(|item| {
            item.pointer("/richItemRenderer/content/videoRenderer")
                .or_else(|| item.pointer("/gridVideoRenderer"))
        })
        .filter_map(|renderer| video_from_renderer(renderer, channel_id, channel_name))
        .collect()
}

fn extract_append_continuation(root: &Value) -> Option<String> {
    let actions = root.get("onResponseReceivedActions")?.as_array()?;
    actions.iter().find_map(|action| {
        let items = action
            .pointer("/appendContinuationItemsAction/continuationItems")?
            .as_array()?;
        continuation_token_from_items(items)
    })
}

fn extract_initial_continuation_from_rich_grid(root: &Value) -> Option<String> {
    let content = tab_content(root)?;
    let items = content.pointer("/richGridRenderer/contents")?.as_array()?;
    continuation_token_from_items(items)
}

fn extract_initial_continuation_from_section_list(root: &Value) -> Option<String> {
    let content = tab_content(root)?;
    let sections = content.pointer("/sectionListRenderer/contents")?.as_array()?;
    sections.iter().find_map(|section| {
        let items = section.pointer("/itemSectionRenderer/contents")?.as_array()?;
        continuation_token_from_items(items)
    })
}

fn continuation_token_from_items(items: &[Value]) -> Option<String> {
    items.iter().find_map(|item| {
        item.pointer("/continuationItemRenderer/continuationEndpoint/continuationCommand/token")
            .and_then(Value::as_str)
            .map(str::to_string)
    })
}

fn text_of(value: &Value) -> Option<String> {
    if let Some(simple) = value.get("simpleText").and_then(Value::as_str) {
        return Some(simple.to_string());
    }
    let runs = value.get("runs")?.as_array()?;
    let joined: String = runs
        .iter()
        .filter_map(|run| run.get("text").and_then(Value::as_str))
        .collect();
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

fn parse_view_count(text: &str) -> u64 {
    text.chars()
        .filter(char::is_ascii_digit)
        .collect::<String>()
        .parse()
        .unwrap_or(0)
}

fn parse_duration(text: &str) -> std::time::Duration {
    let parts: Vec<u64> = text.split(':').filter_map(|p| p.parse().ok()).collect();
    let secs = match parts.as_slice() {
        [h, m, s] => h * 3600 + m * 60 + s,
        [m, s] => m * 60 + s,
        [s] => *s,
        _ => 0,
    };
    std::time::Duration::from_secs(secs)
}

/// Parse a relative "published" phrase (`"2 weeks ago"`, `"Streamed 3 days
/// ago"`) into an absolute timestamp, anchored to `now`. The internal API
/// never returns an exact timestamp for uploads listings, only relative
/// text, so this is necessarily an approximation.
fn parse_relative_published(text: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    let lower = text.to_ascii_lowercase();
    let Some(amount) = lower.split_whitespace().find_map(|tok| tok.parse::<i64>().ok()) else {
        return now;
    };
    let delta = if lower.contains("year") {
        chrono::Duration::days(amount * 365)
    } else if lower.contains("month") {
        chrono::Duration::days(amount * 30)
    } else if lower.contains("week") {
        chrono::Duration::weeks(amount)
    } else if lower.contains("day") {
        chrono::Duration::days(amount)
    } else if lower.contains("hour") {
        chrono::Duration::hours(amount)
    } else if lower.contains("minute") {
        chrono::Duration::minutes(amount)
    } else {
        chrono::Duration::zero()
    };
    now - delta
}

fn video_from_renderer(renderer: &Value, channel_id: &ChannelId, channel_name: &str) -> Option<VideoInfo> {
    let id = renderer.get("videoId")?.as_str()?.to_string();
    let title = renderer.get("title").and_then(text_of).unwrap_or_default();
    let thumbnail_url = renderer
        .pointer("/thumbnail/thumbnails")
        .and_then(Value::as_array)
        .and_then(|thumbs| thumbs.last())
        .and_then(|t| t.get("url"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let view_count = renderer
        .get("viewCountText")
        .and_then(text_of)
        .map(|t| parse_view_count(&t))
        .unwrap_or(0);
    let duration = renderer
        .get("lengthText")
        .and_then(text_of)
        .map(|t| parse_duration(&t))
        .unwrap_or_default();
    let is_live = renderer
        .pointer("/badges")
        .and_then(Value::as_array)
        .is_some_and(|badges| {
            badges.iter().any(|b| {
                b.pointer("/metadataBadgeRenderer/style")
                    .and_then(Value::as_str)
                    .is_some_and(|s| s.contains("LIVE"))
            })
        });
    let published_text = renderer
        .get("publishedTimeText")
        .and_then(text_of)
        .unwrap_or_default();
    let published = parse_relative_published(&published_text, Utc::now());

    Some(VideoInfo {
        id,
        title,
        channel_id: channel_id.clone(),
        channel_name: channel_name.to_string(),
        published,
        duration,
        description: String::new(),
        thumbnail_url,
        view_count,
        kind: if is_live { VideoKind::LiveStream } else { VideoKind::Video },
    })
}
