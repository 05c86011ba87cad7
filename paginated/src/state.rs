use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use vidsync_core::ChannelId;

/// Default observed server-side lifetime of a continuation token
/// (spec.md §4.7: "`tokenTTL` (default ≈ 2h)").
pub const DEFAULT_TOKEN_TTL: Duration = Duration::hours(2);

/// Resumable pagination cursor for one channel's paginated listing.
///
/// `expires_at = updated_at + token_ttl`, reflecting the observed
/// server-side lifetime rather than anything the token itself encodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuationState {
    /// The channel this cursor paginates.
    pub channel_id: ChannelId,
    /// The opaque continuation token for the next page.
    pub token: String,
    /// Running count of videos retrieved across all pages so far.
    pub videos_retrieved: usize,
    /// The id of the last video seen, for diagnostics/resume sanity checks.
    pub last_video_id: Option<String>,
    /// When this cursor was first created.
    pub created_at: DateTime<Utc>,
    /// When this cursor was last advanced.
    pub updated_at: DateTime<Utc>,
    /// When the server is assumed to have invalidated `token`.
    pub expires_at: DateTime<Utc>,
}

impl ContinuationState {
    /// Start a fresh cursor for `channel_id` with no token (first page).
    pub fn fresh(channel_id: ChannelId, now: DateTime<Utc>) -> Self {
        Self {
            channel_id,
            token: String::new(),
            videos_retrieved: 0,
            last_video_id: None,
            created_at: now,
            updated_at: now,
            expires_at: now + DEFAULT_TOKEN_TTL,
        }
    }

    /// True once `now` has passed `expires_at`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether this cursor can be resumed for `channel_id` at `now`:
    /// it must target the same channel, carry a non-empty token, and not
    /// have expired (spec.md §3 `canResume`, Paginated branch).
    pub fn can_resume_for(&self, channel_id: &ChannelId, now: DateTime<Utc>) -> bool {
        &self.channel_id == channel_id && !self.token.is_empty() && !self.is_expired(now)
    }

    /// Advance the cursor after a successful page fetch.
    pub fn advance(&mut self, next_token: String, new_videos: usize, last_video_id: Option<String>, now: DateTime<Utc>) {
        self.token = next_token;
        self.videos_retrieved += new_videos;
        if last_video_id.is_some() {
            self.last_video_id = last_video_id;
        }
        self.updated_at = now;
        self.expires_at = now + DEFAULT_TOKEN_TTL;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> ChannelId {
        ChannelId::new("UC".to_string() + &"a".repeat(22)).unwrap()
    }

    #[test]
    fn fresh_cursor_cannot_resume_with_empty_token() {
        let now = Utc::now();
        let state = ContinuationState::fresh(channel(), now);
        assert!(!state.can_resume_for(&channel(), now));
    }

    #[test]
    fn cursor_with_token_resumes_before_expiry() {
        let now = Utc::now();
        let mut state = ContinuationState::fresh(channel(), now);
        state.advance("tok1".to_string(), 30, Some("v30".to_string()), now);
        assert!(state.can_resume_for(&channel(), now));
        assert!(!state.can_resume_for(&channel(), now + Duration::hours(3)));
    }

    #[test]
    fn cursor_does_not_resume_for_a_different_channel() {
        let now = Utc::now();
        let mut state = ContinuationState::fresh(channel(), now);
        state.advance("tok1".to_string(), 1, None, now);
        let other = ChannelId::new("UC".to_string() + &"b".repeat(22)).unwrap();
        assert!(!state.can_resume_for(&other, now));
    }
}
