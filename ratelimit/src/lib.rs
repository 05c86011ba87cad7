//! Per-domain token-bucket rate limiting with dynamic backoff on throttle
//! signals (C2).
//!
//! One token bucket plus an optional dynamic-backoff record per domain,
//! both guarded by a single limiter-wide lock rather than a sharded map,
//! so throttle bookkeeping for one domain can never race a reader of
//! another's bucket state.

#![warn(missing_docs)]

mod backoff;
mod bucket;

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use vidsync_core::{Context, Domain, RateLimiterConfig, Result};

use backoff::{BackoffState, SuccessOutcome};
use bucket::Bucket;

struct DomainRecord {
    bucket: Bucket,
    backoff: Option<BackoffState>,
}

impl DomainRecord {
    fn new(rate: f64) -> Self {
        Self {
            bucket: Bucket::new(rate),
            backoff: None,
        }
    }
}

/// The per-domain rate limiter.
pub struct RateLimiter {
    cfg: RateLimiterConfig,
    domains: RwLock<HashMap<Domain, DomainRecord>>,
}

impl RateLimiter {
    /// Build a rate limiter with the given configuration.
    pub fn new(cfg: RateLimiterConfig) -> Self {
        Self {
            cfg,
            domains: RwLock::new(HashMap::new()),
        }
    }

    fn rate_for(&self, domain: &Domain) -> f64 {
        self.cfg
            .domain_rps
            .get(domain.as_str())
            .copied()
            .unwrap_or(self.cfg.default_rps)
    }

    /// Block until a permit is available for `url`'s domain, or return the
    /// context's cancellation/deadline error. A domain rate of `0` means
    /// unlimited: the permit wait is skipped entirely.
    pub async fn wait(&self, ctx: &Context, url: &str) -> Result<()> {
        let domain = Domain::from_url(url)?;
        let rate = self.rate_for(&domain);
        if rate == 0.0 {
            return Ok(());
        }

        let wait_for = {
            let mut domains = self.domains.write();
            let record = domains
                .entry(domain.clone())
                .or_insert_with(|| DomainRecord::new(rate));
            record.bucket.reserve()
        };

        if wait_for.is_zero() {
            return Ok(());
        }

        if let Err(err) = ctx.sleep(wait_for).await {
            let mut domains = self.domains.write();
            if let Some(record) = domains.get_mut(&domain) {
                record.bucket.rollback();
            }
            return Err(err);
        }

        Ok(())
    }

    /// Record a throttle signal (429/503/403) for `url`'s domain. Returns
    /// the effective wait the caller should observe before its next
    /// attempt. A no-op (returning the server's stated `Retry-After`, if
    /// any) when dynamic backoff is disabled.
    pub fn record_throttle(
        &self,
        url: &str,
        server_retry_after: Option<Duration>,
    ) -> Result<Duration> {
        if !self.cfg.enable_dynamic_backoff {
            return Ok(server_retry_after.unwrap_or_default());
        }

        let domain = Domain::from_url(url)?;
        let original = self.rate_for(&domain);
        let mut domains = self.domains.write();
        let record = domains
            .entry(domain.clone())
            .or_insert_with(|| DomainRecord::new(original));
        let backoff = record
            .backoff
            .get_or_insert_with(|| BackoffState::new(original));
        let effective = backoff.on_throttle(server_retry_after, self.cfg.min_rate_multiplier);
        let new_rate = backoff.effective_rps();
        record.bucket = Bucket::new(new_rate);

        tracing::warn!(%domain, wait = ?effective, rate = new_rate, "domain throttled");
        Ok(effective)
    }

    /// Record a success for `url`'s domain, partially (or fully) unwinding
    /// any outstanding dynamic backoff.
    pub fn record_success(&self, url: &str) -> Result<()> {
        if !self.cfg.enable_dynamic_backoff {
            return Ok(());
        }

        let domain = Domain::from_url(url)?;
        let mut domains = self.domains.write();
        let Some(record) = domains.get_mut(&domain) else {
            return Ok(());
        };
        let Some(backoff) = record.backoff.as_mut() else {
            return Ok(());
        };

        match backoff.on_success(self.cfg.backoff_cooldown) {
            SuccessOutcome::Cleared => {
                let original = backoff.original_rps;
                record.backoff = None;
                record.bucket = Bucket::new(original);
                tracing::debug!(%domain, "backoff cleared, rate restored");
            }
            SuccessOutcome::RateChanged(rate) => {
                record.bucket = Bucket::new(rate);
            }
            SuccessOutcome::Unchanged => {}
        }

        Ok(())
    }

    /// Block for any outstanding dynamic backoff on `url`'s domain.
    pub async fn wait_for_backoff(&self, ctx: &Context, url: &str) -> Result<()> {
        let domain = Domain::from_url(url)?;
        let remaining = {
            let domains = self.domains.read();
            domains
                .get(&domain)
                .and_then(|r| r.backoff.as_ref())
                .map(backoff::BackoffState::remaining)
        };

        match remaining {
            Some(d) if !d.is_zero() => ctx.sleep(d).await,
            _ => Ok(()),
        }
    }

    /// Whether `url`'s domain currently has outstanding dynamic backoff.
    pub fn is_backed_off(&self, url: &str) -> Result<bool> {
        let domain = Domain::from_url(url)?;
        let domains = self.domains.read();
        Ok(domains
            .get(&domain)
            .and_then(|r| r.backoff.as_ref())
            .is_some_and(|b| !b.remaining().is_zero()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unlimited_rate_never_waits() {
        let cfg = RateLimiterConfig {
            default_rps: 0.0,
            ..Default::default()
        };
        let limiter = RateLimiter::new(cfg);
        let ctx = Context::background();
        for _ in 0..5 {
            limiter.wait(&ctx, "https://example.com/a").await.unwrap();
        }
    }

    #[tokio::test]
    async fn second_request_waits_roughly_the_refill_interval() {
        let cfg = RateLimiterConfig {
            default_rps: 10.0,
            enable_dynamic_backoff: false,
            ..Default::default()
        };
        let limiter = RateLimiter::new(cfg);
        let ctx = Context::background();

        let start = std::time::Instant::now();
        limiter.wait(&ctx, "https://example.com/a").await.unwrap();
        limiter.wait(&ctx, "https://example.com/a").await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[test]
    fn throttle_then_success_after_cooldown_restores_rate() {
        let cfg = RateLimiterConfig {
            default_rps: 10.0,
            backoff_cooldown: Duration::from_millis(1),
            ..Default::default()
        };
        let limiter = RateLimiter::new(cfg);
        limiter
            .record_throttle("https://example.com/a", None)
            .unwrap();
        assert!(limiter.is_backed_off("https://example.com/a").unwrap());

        std::thread::sleep(Duration::from_millis(5));
        limiter.record_success("https://example.com/a").unwrap();
        assert!(!limiter.is_backed_off("https://example.com/a").unwrap());
    }

    #[test]
    fn retry_after_of_60s_yields_wait_of_at_least_60s() {
        let cfg = RateLimiterConfig::default();
        let limiter = RateLimiter::new(cfg);
        let effective = limiter
            .record_throttle("https://example.com/a", Some(Duration::from_secs(60)))
            .unwrap();
        assert!(effective >= Duration::from_secs(60));
    }
}
