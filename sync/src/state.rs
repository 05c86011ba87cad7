use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vidsync_core::ChannelId;

/// Which lister produced (or is producing) a channel's current sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// The lightweight Atom feed (C6).
    Feed,
    /// The internal JSON API's continuation-token pagination (C7).
    Paginated,
    /// The official keyed REST API (C8).
    Official,
    /// A caller-supplied fallback (e.g. the external downloader).
    Fallback,
}

impl Strategy {
    /// Feed and Fallback strategies are never resumable regardless of
    /// any other field (spec.md §3): a feed sync re-fetches the whole
    /// window every time, and a fallback's internal state is opaque to
    /// this crate.
    fn is_resumable_kind(self) -> bool {
        matches!(self, Strategy::Paginated | Strategy::Official)
    }
}

/// A channel's sync lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// No sync in progress; the last one (if any) completed or never ran.
    Idle,
    /// A sync is in progress, or was interrupted mid-flight.
    Syncing,
    /// The last sync attempt failed.
    Error,
}

/// Persisted per-channel sync state (spec.md §3).
///
/// Completing or starting a sync clears the pagination fields
/// (`continuation_token`, `continuation_expires_at`, `official_page_token`,
/// `official_playlist_id`); failing a sync preserves them so a later call
/// can resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    /// The channel this state tracks.
    pub channel_id: ChannelId,
    /// The lister strategy last used (or in use).
    pub strategy: Strategy,
    /// The current lifecycle status.
    pub status: Status,
    /// A paginated-lister continuation token, if a Paginated sync was
    /// interrupted.
    pub continuation_token: Option<String>,
    /// When `continuation_token` is assumed to expire.
    pub continuation_expires_at: Option<DateTime<Utc>>,
    /// An official-API page token, if an Official sync was interrupted.
    pub official_page_token: Option<String>,
    /// The official API's resolved uploads-playlist id, cached across
    /// calls to avoid re-spending a `channels.list` unit.
    pub official_playlist_id: Option<String>,
    /// Quota units spent so far in the official API's current window.
    pub official_quota_used: u64,
    /// The newest video `published` timestamp observed across all
    /// successful syncs of this channel. Monotonically non-decreasing.
    pub newest_video_timestamp: Option<DateTime<Utc>>,
    /// Set when a feed gap was detected and a full resync is still owed.
    pub requires_full_resync: bool,
    /// The id of the last video processed, for diagnostics.
    pub last_video_id: Option<String>,
    /// Running count of videos processed in the current/last sync.
    pub videos_processed: usize,
    /// When the current (or most recent) sync attempt started.
    pub sync_started_at: Option<DateTime<Utc>>,
    /// When the last successful sync completed.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// When the last page was fetched, for diagnostics.
    pub last_page_fetched_at: Option<DateTime<Utc>>,
    /// The last error message recorded, if the last attempt failed.
    pub last_error: Option<String>,
}

impl SyncState {
    /// A fresh, never-synced state for `channel_id`.
    pub fn new(channel_id: ChannelId) -> Self {
        Self {
            channel_id,
            strategy: Strategy::Feed,
            status: Status::Idle,
            continuation_token: None,
            continuation_expires_at: None,
            official_page_token: None,
            official_playlist_id: None,
            official_quota_used: 0,
            newest_video_timestamp: None,
            requires_full_resync: false,
            last_video_id: None,
            videos_processed: 0,
            sync_started_at: None,
            last_sync_at: None,
            last_page_fetched_at: None,
            last_error: None,
        }
    }

    /// Whether an interrupted sync can be resumed as-is (spec.md §3,
    /// property 4): only `Syncing` states with a live, strategy-matching
    /// pagination cursor qualify.
    pub fn can_resume(&self, now: DateTime<Utc>) -> bool {
        if self.status != Status::Syncing {
            return false;
        }
        if !self.strategy.is_resumable_kind() {
            return false;
        }
        match self.strategy {
            Strategy::Paginated => {
                let has_token = self.continuation_token.as_deref().is_some_and(|t| !t.is_empty());
                let not_expired = self.continuation_expires_at.is_some_and(|exp| now < exp);
                has_token && not_expired
            }
            Strategy::Official => self.official_page_token.as_deref().is_some_and(|t| !t.is_empty()),
            Strategy::Feed | Strategy::Fallback => false,
        }
    }

    /// Begin a new sync attempt under `strategy`, clearing pagination
    /// fields (spec.md §3: "starting a sync clears pagination fields").
    pub fn begin(&mut self, strategy: Strategy, now: DateTime<Utc>) {
        self.strategy = strategy;
        self.status = Status::Syncing;
        self.clear_pagination();
        self.videos_processed = 0;
        self.sync_started_at = Some(now);
        self.last_error = None;
    }

    /// Record a successful completion: bump the high-water mark (never
    /// backwards), clear pagination fields, mark Idle.
    pub fn complete(&mut self, newest_seen: Option<DateTime<Utc>>, now: DateTime<Utc>) {
        if let Some(seen) = newest_seen {
            self.newest_video_timestamp = Some(match self.newest_video_timestamp {
                Some(existing) if existing >= seen => existing,
                _ => seen,
            });
        }
        self.status = Status::Idle;
        self.clear_pagination();
        self.last_sync_at = Some(now);
        self.last_error = None;
    }

    /// Record a failed attempt: preserve pagination fields for a later
    /// resume (spec.md §3: "failing a sync preserves them").
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = Status::Error;
        self.last_error = Some(error.into());
    }

    fn clear_pagination(&mut self) {
        self.continuation_token = None;
        self.continuation_expires_at = None;
        self.official_page_token = None;
        self.official_playlist_id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn channel() -> ChannelId {
        ChannelId::new("UC".to_string() + &"a".repeat(22)).unwrap()
    }

    #[test]
    fn feed_and_fallback_never_resume() {
        let now = Utc::now();
        let mut state = SyncState::new(channel());
        state.begin(Strategy::Feed, now);
        state.continuation_token = Some("tok".to_string());
        state.continuation_expires_at = Some(now + Duration::hours(1));
        assert!(!state.can_resume(now));

        state.begin(Strategy::Fallback, now);
        assert!(!state.can_resume(now));
    }

    #[test]
    fn paginated_resumes_only_with_live_token() {
        let now = Utc::now();
        let mut state = SyncState::new(channel());
        state.begin(Strategy::Paginated, now);
        assert!(!state.can_resume(now), "no token yet");

        state.continuation_token = Some("tok".to_string());
        state.continuation_expires_at = Some(now + Duration::hours(1));
        assert!(state.can_resume(now));
        assert!(!state.can_resume(now + Duration::hours(2)), "expired");
    }

    #[test]
    fn official_resumes_on_page_token_alone() {
        let now = Utc::now();
        let mut state = SyncState::new(channel());
        state.begin(Strategy::Official, now);
        state.official_page_token = Some("page2".to_string());
        assert!(state.can_resume(now));
    }

    #[test]
    fn completing_clears_pagination_and_bumps_high_water_mark() {
        let now = Utc::now();
        let mut state = SyncState::new(channel());
        state.begin(Strategy::Paginated, now);
        state.continuation_token = Some("tok".to_string());
        let t1 = now;
        state.complete(Some(t1), now);
        assert_eq!(state.status, Status::Idle);
        assert!(state.continuation_token.is_none());
        assert_eq!(state.newest_video_timestamp, Some(t1));

        // A later, older-timestamped completion must not move it backwards.
        state.complete(Some(t1 - Duration::days(1)), now);
        assert_eq!(state.newest_video_timestamp, Some(t1));
    }

    #[test]
    fn failing_preserves_pagination_fields() {
        let now = Utc::now();
        let mut state = SyncState::new(channel());
        state.begin(Strategy::Paginated, now);
        state.continuation_token = Some("tok".to_string());
        state.continuation_expires_at = Some(now + Duration::hours(1));
        state.fail("network blew up");
        assert_eq!(state.status, Status::Error);
        assert_eq!(state.continuation_token.as_deref(), Some("tok"));
        assert_eq!(state.last_error.as_deref(), Some("network blew up"));
    }
}
