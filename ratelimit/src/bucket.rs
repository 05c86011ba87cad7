use std::time::{Duration, Instant};

/// A single-domain token bucket, burst 1, continuous-rate refill.
///
/// `rate == 0.0` means unlimited; callers of [`RateLimiter::wait`] skip the
/// bucket entirely in that case rather than constructing one.
#[derive(Debug)]
pub(crate) struct Bucket {
    rate: f64,
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    pub(crate) fn new(rate: f64) -> Self {
        Self {
            rate,
            tokens: 1.0,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(1.0);
        self.last_refill = now;
    }

    /// Reserve the next available permit and return how long the caller
    /// must sleep before it is actually available. A zero duration means
    /// the permit was already available.
    pub(crate) fn reserve(&mut self) -> Duration {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Duration::ZERO;
        }
        let deficit = 1.0 - self.tokens;
        let wait = deficit / self.rate;
        self.tokens -= 1.0;
        Duration::from_secs_f64(wait)
    }

    /// Undo a reservation that was never actually waited out (the caller
    /// was canceled before the sleep completed).
    pub(crate) fn rollback(&mut self) {
        self.tokens = (self.tokens + 1.0).min(1.0);
    }
}
