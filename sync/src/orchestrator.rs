//! Per-channel resumable sync orchestration (spec.md §4.9): resolves the
//! channel, tries the cheap incremental feed first, and only falls back
//! to a full paginated/official/external listing when the feed reports a
//! gap or fails outright.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use vidsync_core::{ChannelId, Context, ListOptions, Lister, Result, VideoInfo};
use vidsync_feed::FeedLister;
use vidsync_paginated::{ContinuationState, PaginatedLister};
use vidsync_quota::QuotaLister;
use vidsync_resolver::ChannelResolver;

use crate::state::{Strategy, SyncState};
use crate::store::SyncStateStore;

/// The full-sync lister a channel falls back to once its incremental
/// feed sync reports a gap or fails (spec.md §4.9 step 5: "C7 or C8 or
/// external downloader").
pub enum Fallback {
    /// The internal JSON API's continuation-token pagination; the only
    /// fallback kind this orchestrator can genuinely resume mid-page,
    /// since it is the only one with a typed, persistable cursor.
    Paginated(Arc<PaginatedLister>),
    /// The official keyed REST API. Its page tokens are never assumed
    /// valid across a sync attempt boundary (DESIGN.md's resolved open
    /// question), so a resume here always starts the playlist walk over.
    Official(Arc<QuotaLister>),
    /// Any other `Lister` implementation, e.g. an external downloader
    /// process wrapped to satisfy the trait.
    External(Arc<dyn Lister>),
}

impl Fallback {
    fn strategy(&self) -> Strategy {
        match self {
            Fallback::Paginated(_) => Strategy::Paginated,
            Fallback::Official(_) => Strategy::Official,
            Fallback::External(_) => Strategy::Fallback,
        }
    }
}

/// The outcome of one `syncChannelVideos` call (spec.md §4.9: "Result
/// shape").
#[derive(Debug, Clone)]
pub struct SyncResult {
    /// Every video returned by whichever path executed.
    pub videos: Vec<VideoInfo>,
    /// How many of `videos` are newer than the channel's prior
    /// high-water mark.
    pub new_videos_count: usize,
    /// True when the result came from the cheap feed path.
    pub is_incremental: bool,
    /// True when the result came from a full-listing fallback.
    pub is_full_sync: bool,
    /// True when the feed path detected a window gap (whether or not it
    /// ultimately fell through to a full sync).
    pub gap_detected: bool,
    /// When this call completed.
    pub time_synced: DateTime<Utc>,
}

/// Orchestrates resumable per-channel video syncs, generic over the
/// state store implementation.
pub struct SyncOrchestrator<S: SyncStateStore> {
    store: S,
    resolver: ChannelResolver,
    feed: FeedLister,
    fallback: Fallback,
}

impl<S: SyncStateStore> SyncOrchestrator<S> {
    /// Build an orchestrator from its component parts.
    pub fn new(store: S, resolver: ChannelResolver, feed: FeedLister, fallback: Fallback) -> Self {
        Self { store, resolver, feed, fallback }
    }

    /// Resolve `channel_url`, run its per-channel sync under the store's
    /// exclusive scope, and persist the result.
    pub async fn sync_channel_videos(
        &self,
        ctx: &Context,
        channel_url: &str,
        opts: &ListOptions,
    ) -> Result<SyncResult> {
        let channel = self.resolver.resolve(ctx, channel_url).await?;
        let _guard = self.store.lock(&channel).await?;
        let mut state = self.store.load(&channel).await?;

        let result = self.run(ctx, &channel, &mut state, opts).await;
        self.store.save(&state).await?;
        result
    }

    async fn run(
        &self,
        ctx: &Context,
        channel: &ChannelId,
        state: &mut SyncState,
        opts: &ListOptions,
    ) -> Result<SyncResult> {
        let now = Utc::now();

        // spec.md §4.9 step 3: a resumable prior attempt is only ever
        // honored for the Paginated strategy, the one kind this
        // orchestrator can actually splice a persisted cursor back into;
        // every other "unimplemented" resume falls through exactly as
        // the spec allows. Capture the cursor before `begin` clears it —
        // `begin`/`complete` both wipe pagination fields, so anything not
        // read out first is lost.
        let resumable_cursor = if !state.can_resume(now) {
            None
        } else if state.strategy == Strategy::Paginated {
            Some(ContinuationState {
                channel_id: channel.clone(),
                token: state.continuation_token.clone().unwrap_or_default(),
                videos_retrieved: state.videos_processed,
                last_video_id: state.last_video_id.clone(),
                created_at: state.sync_started_at.unwrap_or(now),
                updated_at: now,
                expires_at: state.continuation_expires_at.unwrap_or(now),
            })
        } else {
            tracing::debug!(
                channel = channel.as_str(),
                strategy = ?state.strategy,
                "resume unimplemented for this strategy, clearing pagination and starting fresh"
            );
            None
        };

        if let Some(cursor) = resumable_cursor {
            tracing::info!(channel = channel.as_str(), "resuming interrupted paginated sync");
            return self.full_sync(ctx, channel, state, opts, now, false, Some(cursor)).await;
        }

        state.begin(Strategy::Feed, now);
        match self
            .feed
            .list_incremental(ctx, channel, state.newest_video_timestamp, opts)
            .await
        {
            Ok(incremental) if !incremental.gap_detected => {
                state.last_video_id = incremental.videos.first().map(|v| v.id.clone());
                state.videos_processed = incremental.videos.len();
                state.complete(incremental.newest_timestamp, now);
                return Ok(SyncResult {
                    videos: incremental.videos,
                    new_videos_count: incremental.new_videos_count,
                    is_incremental: true,
                    is_full_sync: false,
                    gap_detected: false,
                    time_synced: now,
                });
            }
            Ok(incremental) => {
                tracing::info!(channel = channel.as_str(), "feed window gap detected, escalating to full sync");
                state.requires_full_resync = true;
                self.full_sync(ctx, channel, state, opts, now, true, None).await
            }
            Err(err) => {
                tracing::warn!(channel = channel.as_str(), error = %err, "incremental feed sync failed, escalating to full sync");
                self.full_sync(ctx, channel, state, opts, now, false, None).await
            }
        }
    }

    async fn full_sync(
        &self,
        ctx: &Context,
        channel: &ChannelId,
        state: &mut SyncState,
        opts: &ListOptions,
        now: DateTime<Utc>,
        gap_detected: bool,
        resume_from: Option<ContinuationState>,
    ) -> Result<SyncResult> {
        state.begin(self.fallback.strategy(), now);

        let outcome = match &self.fallback {
            Fallback::Paginated(lister) => {
                lister.list_videos_resumable(ctx, channel, opts, resume_from).await.map(
                    |(videos, cursor)| {
                        if !cursor.token.is_empty() {
                            state.continuation_token = Some(cursor.token);
                            state.continuation_expires_at = Some(cursor.expires_at);
                        }
                        state.last_video_id = cursor.last_video_id;
                        state.videos_processed = cursor.videos_retrieved;
                        videos
                    },
                )
            }
            Fallback::Official(lister) => lister.list_videos_tracked(ctx, channel, opts).await,
            Fallback::External(lister) => lister.list_videos(ctx, channel, opts).await,
        };

        match outcome {
            Ok(videos) => {
                let newest = videos.iter().map(|v| v.published).max();
                state.complete(newest, now);
                Ok(SyncResult {
                    new_videos_count: videos.len(),
                    videos,
                    is_incremental: false,
                    is_full_sync: true,
                    gap_detected,
                    time_synced: now,
                })
            }
            Err(err) => {
                state.fail(err.to_string());
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vidsync_breaker::CircuitBreaker;
    use vidsync_core::{BreakerConfig, Error, RateLimiterConfig, RetryConfig, TransportConfig, VideoKind};
    use vidsync_http::Pipeline;
    use vidsync_ratelimit::RateLimiter;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::state::Status;

    fn channel() -> ChannelId {
        ChannelId::new("UC".to_string() + &"a".repeat(22)).unwrap()
    }

    fn pipeline() -> Arc<Pipeline> {
        Arc::new(
            Pipeline::new(
                &TransportConfig::default(),
                CircuitBreaker::new(BreakerConfig::default()),
                RateLimiter::new(RateLimiterConfig { default_rps: 0.0, ..Default::default() }),
                RetryConfig::default().with_max_retries(0),
                None,
            )
            .unwrap(),
        )
    }

    fn video(id: &str, published: DateTime<Utc>) -> VideoInfo {
        VideoInfo {
            id: id.to_string(),
            title: id.to_string(),
            channel_id: channel(),
            channel_name: "Chan".to_string(),
            published,
            duration: std::time::Duration::ZERO,
            description: String::new(),
            thumbnail_url: String::new(),
            view_count: 0,
            kind: VideoKind::Video,
        }
    }

    struct StubFallback {
        calls: AtomicUsize,
        videos: Vec<VideoInfo>,
    }

    #[async_trait::async_trait]
    impl Lister for StubFallback {
        async fn list_videos(&self, _ctx: &Context, _channel: &ChannelId, _opts: &ListOptions) -> Result<Vec<VideoInfo>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.videos.clone())
        }
        fn supports_full_history(&self) -> bool {
            true
        }
    }

    async fn orchestrator_against(
        feed_server: &MockServer,
        fallback: Fallback,
    ) -> (SyncOrchestrator<crate::store::FileSyncStateStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = crate::store::FileSyncStateStore::new(dir.path()).await.unwrap();
        let resolver = ChannelResolver::with_base_url(pipeline(), feed_server.uri());
        let feed = FeedLister::with_base_url(pipeline(), format!("{}/feed", feed_server.uri()));
        (SyncOrchestrator::new(store, resolver, feed, fallback), dir)
    }

    const EMPTY_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns:yt="http://www.youtube.com/xml/schemas/2015" xmlns:media="http://search.yahoo.com/mrss/" xmlns="http://www.w3.org/2005/Atom"></feed>"#;

    #[tokio::test]
    async fn first_ever_sync_uses_feed_and_is_incremental() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_string(EMPTY_FEED))
            .mount(&server)
            .await;

        let fallback = Fallback::External(Arc::new(StubFallback { calls: AtomicUsize::new(0), videos: vec![] }));
        let (orch, _dir) = orchestrator_against(&server, fallback).await;

        let id = channel();
        let url = format!("https://ignored.example/channel/{}", id.as_str());
        let result = orch
            .sync_channel_videos(&Context::background(), &url, &ListOptions::default())
            .await
            .unwrap();

        assert!(result.is_incremental);
        assert!(!result.is_full_sync);
        assert!(!result.gap_detected);
    }

    #[tokio::test]
    async fn feed_error_escalates_to_external_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let fallback_videos = vec![video("fb1", Utc::now())];
        let stub = Arc::new(StubFallback { calls: AtomicUsize::new(0), videos: fallback_videos });
        let fallback = Fallback::External(stub.clone());
        let (orch, _dir) = orchestrator_against(&server, fallback).await;

        let id = channel();
        let url = format!("https://ignored.example/channel/{}", id.as_str());
        let result = orch
            .sync_channel_videos(&Context::background(), &url, &ListOptions::default())
            .await
            .unwrap();

        assert!(result.is_full_sync);
        assert_eq!(result.videos.len(), 1);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn persists_error_state_and_preserves_it_for_inspection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        struct FailingFallback;
        #[async_trait::async_trait]
        impl Lister for FailingFallback {
            async fn list_videos(&self, _ctx: &Context, _channel: &ChannelId, _opts: &ListOptions) -> Result<Vec<VideoInfo>> {
                Err(Error::QuotaExhausted)
            }
            fn supports_full_history(&self) -> bool {
                true
            }
        }

        let fallback = Fallback::External(Arc::new(FailingFallback));
        let (orch, dir) = orchestrator_against(&server, fallback).await;

        let id = channel();
        let url = format!("https://ignored.example/channel/{}", id.as_str());
        let result = orch.sync_channel_videos(&Context::background(), &url, &ListOptions::default()).await;
        assert!(matches!(result, Err(Error::QuotaExhausted)));

        let store = crate::store::FileSyncStateStore::new(dir.path()).await.unwrap();
        let persisted = store.load(&id).await.unwrap();
        assert_eq!(persisted.status, Status::Error);
        assert!(persisted.last_error.is_some());
    }

    #[tokio::test]
    async fn gap_detected_escalates_to_paginated_full_sync() {
        let server = MockServer::start().await;
        let feed_xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns:yt="http://www.youtube.com/xml/schemas/2015" xmlns:media="http://search.yahoo.com/mrss/" xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <id>yt:video:newest</id>
    <yt:videoId>newest</yt:videoId>
    <title>Newest</title>
    <author><name>Chan</name></author>
    <published>2024-06-01T00:00:00+00:00</published>
  </entry>
  <entry>
    <id>yt:video:oldest</id>
    <yt:videoId>oldest</yt:videoId>
    <title>Oldest</title>
    <author><name>Chan</name></author>
    <published>2024-03-01T00:00:00+00:00</published>
  </entry>
</feed>"#;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_string(feed_xml))
            .mount(&server)
            .await;

        let browse_body = r#"{
          "contents": { "twoColumnBrowseResultsRenderer": { "tabs": [
            { "tabRenderer": { "content": { "richGridRenderer": { "contents": [
              { "richItemRenderer": { "content": { "videoRenderer": {
                "videoId": "full1", "title": { "simpleText": "Full" },
                "publishedTimeText": { "simpleText": "1 day ago" }
              } } } }
            ] } } } }
          ] } }
        }"#;
        Mock::given(method("POST"))
            .and(path("/browse"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(browse_body, "application/json"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let id = channel();

        // Seed a prior sync whose high-water mark predates the feed
        // window's oldest entry, so the feed fetch below reports a gap.
        let seed_store = crate::store::FileSyncStateStore::new(dir.path()).await.unwrap();
        let mut seeded = SyncState::new(id.clone());
        let last_sync = chrono::DateTime::parse_from_rfc3339("2024-01-01T00:00:00+00:00")
            .unwrap()
            .with_timezone(&Utc);
        seeded.complete(Some(last_sync), last_sync);
        seed_store.save(&seeded).await.unwrap();

        let store = crate::store::FileSyncStateStore::new(dir.path()).await.unwrap();
        let resolver = ChannelResolver::with_base_url(pipeline(), server.uri());
        let feed = FeedLister::with_base_url(pipeline(), format!("{}/feed", server.uri()));
        let paginated = PaginatedLister::with_browse_url(pipeline(), format!("{}/browse", server.uri()));
        let orch = SyncOrchestrator::new(store, resolver, feed, Fallback::Paginated(Arc::new(paginated)));

        let url = format!("https://ignored.example/channel/{}", id.as_str());
        let result = orch
            .sync_channel_videos(&Context::background(), &url, &ListOptions::default())
            .await
            .unwrap();

        assert!(result.gap_detected);
        assert!(result.is_full_sync);
        assert_eq!(result.videos.len(), 1);
        assert_eq!(result.videos[0].id, "full1");

        let persisted = seed_store.load(&id).await.unwrap();
        assert_eq!(persisted.status, Status::Idle);
        assert!(persisted.continuation_token.is_none(), "single page leaves no cursor to resume");
    }

    #[tokio::test]
    async fn interrupted_paginated_sync_resumes_from_its_persisted_cursor() {
        let server = MockServer::start().await;

        // The continuation page the resumed call fetches. A real resume
        // never touches the feed at all, so no /feed mock is mounted —
        // if the orchestrator fell back to a fresh feed sync instead of
        // resuming, this test would fail on the unmounted route.
        let continuation_page = r#"{
          "onResponseReceivedActions": [ { "appendContinuationItemsAction": { "continuationItems": [
            { "richItemRenderer": { "content": { "videoRenderer": {
              "videoId": "v11", "title": { "simpleText": "V11" },
              "publishedTimeText": { "simpleText": "1 day ago" }
            } } } }
          ] } } ]
        }"#;
        Mock::given(method("POST"))
            .and(path("/browse"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(continuation_page, "application/json"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let id = channel();
        let now = Utc::now();

        let seed_store = crate::store::FileSyncStateStore::new(dir.path()).await.unwrap();
        let mut seeded = SyncState::new(id.clone());
        seeded.begin(Strategy::Paginated, now);
        seeded.continuation_token = Some("aGVsbG8".to_string());
        seeded.continuation_expires_at = Some(now + chrono::Duration::hours(1));
        seeded.videos_processed = 10;
        seeded.last_video_id = Some("v10".to_string());
        seed_store.save(&seeded).await.unwrap();

        let store = crate::store::FileSyncStateStore::new(dir.path()).await.unwrap();
        let resolver = ChannelResolver::with_base_url(pipeline(), server.uri());
        let feed = FeedLister::with_base_url(pipeline(), format!("{}/feed", server.uri()));
        let paginated = PaginatedLister::with_browse_url(pipeline(), format!("{}/browse", server.uri()));
        let orch = SyncOrchestrator::new(store, resolver, feed, Fallback::Paginated(Arc::new(paginated)));

        let url = format!("https://ignored.example/channel/{}", id.as_str());
        let result = orch
            .sync_channel_videos(&Context::background(), &url, &ListOptions::default())
            .await
            .unwrap();

        assert!(result.is_full_sync);
        assert!(!result.is_incremental);
        assert_eq!(result.videos.len(), 1, "only the new page's video is returned, not the prior 10");
        assert_eq!(result.videos[0].id, "v11");

        let persisted = seed_store.load(&id).await.unwrap();
        assert_eq!(persisted.status, Status::Idle);
        assert_eq!(persisted.videos_processed, 11, "resumed count must build on the persisted 10, not restart at 1");
    }
}
