use chrono::{DateTime, Duration, Utc};

use vidsync_core::QuotaConfig;

/// Tracks estimated remaining official-API quota for a rolling 24h window.
///
/// The platform doesn't expose a live quota-remaining endpoint; the
/// estimate is purely client-side bookkeeping.
#[derive(Debug, Clone)]
pub struct QuotaState {
    remaining: i64,
    last_reset: DateTime<Utc>,
}

impl QuotaState {
    /// Start a tracker at full quota.
    pub fn new(cfg: &QuotaConfig, now: DateTime<Utc>) -> Self {
        Self {
            remaining: cfg.daily_quota as i64,
            last_reset: now,
        }
    }

    fn maybe_reset(&mut self, cfg: &QuotaConfig, now: DateTime<Utc>) {
        if now - self.last_reset >= Duration::hours(24) {
            self.remaining = cfg.daily_quota as i64;
            self.last_reset = now;
            tracing::debug!("official-API quota reset");
        }
    }

    /// Subtract `units` from the estimate, first rolling the window over
    /// if 24h have elapsed since the last reset.
    pub fn spend(&mut self, cfg: &QuotaConfig, units: u64, now: DateTime<Utc>) {
        self.maybe_reset(cfg, now);
        self.remaining -= units as i64;
    }

    /// True once the estimate has dropped below `cfg.reserve`.
    pub fn is_exhausted(&self, cfg: &QuotaConfig, now: DateTime<Utc>) -> bool {
        let mut probe = self.clone();
        probe.maybe_reset(cfg, now);
        probe.remaining < cfg.reserve as i64
    }

    /// The current remaining-units estimate, after rolling the window if
    /// due.
    pub fn remaining(&mut self, cfg: &QuotaConfig, now: DateTime<Utc>) -> i64 {
        self.maybe_reset(cfg, now);
        self.remaining
    }

    /// When this window resets (24h after the last reset).
    pub fn resets_at(&self) -> DateTime<Utc> {
        self.last_reset + Duration::hours(24)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhaustion_trips_below_reserve() {
        let cfg = QuotaConfig { daily_quota: 5, reserve: 2, ..QuotaConfig::default() };
        let now = Utc::now();
        let mut state = QuotaState::new(&cfg, now);
        for _ in 0..3 {
            state.spend(&cfg, 1, now);
        }
        assert!(!state.is_exhausted(&cfg, now));
        state.spend(&cfg, 1, now);
        assert!(state.is_exhausted(&cfg, now));
    }

    #[test]
    fn window_resets_after_24h() {
        let cfg = QuotaConfig { daily_quota: 10, reserve: 1, ..QuotaConfig::default() };
        let now = Utc::now();
        let mut state = QuotaState::new(&cfg, now);
        state.spend(&cfg, 9, now);
        assert!(state.is_exhausted(&cfg, now));

        let later = now + Duration::hours(25);
        assert!(!state.is_exhausted(&cfg, later));
        assert_eq!(state.remaining(&cfg, later), 10);
    }
}
