use std::time::{Duration, Instant};

/// Initial dynamic backoff on the first throttle signal for a domain.
pub(crate) const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
/// Ceiling on dynamic backoff duration.
pub(crate) const MAX_BACKOFF: Duration = Duration::from_secs(60);
/// Growth multiplier applied to the dynamic backoff on each throttle.
pub(crate) const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Per-domain dynamic backoff bookkeeping, created only when dynamic
/// backoff is enabled and a domain has been throttled at least once.
#[derive(Debug, Clone)]
pub(crate) struct BackoffState {
    pub(crate) current_backoff: Duration,
    pub(crate) last_error: Instant,
    pub(crate) consecutive_errors: u32,
    pub(crate) original_rps: f64,
    /// `0.0` means the original rate is currently in effect.
    pub(crate) reduced_rps: f64,
}

impl BackoffState {
    pub(crate) fn new(original_rps: f64) -> Self {
        Self {
            current_backoff: Duration::ZERO,
            last_error: Instant::now(),
            consecutive_errors: 0,
            original_rps,
            reduced_rps: 0.0,
        }
    }

    /// The rate currently in effect for this domain.
    pub(crate) fn effective_rps(&self) -> f64 {
        if self.reduced_rps > 0.0 {
            self.reduced_rps
        } else {
            self.original_rps
        }
    }

    /// Time remaining before the outstanding backoff has fully elapsed.
    pub(crate) fn remaining(&self) -> Duration {
        self.current_backoff
            .saturating_sub(self.last_error.elapsed())
    }

    fn reduction_multiplier(consecutive_errors: u32, min_multiplier: f64) -> f64 {
        match consecutive_errors {
            1 => 0.75,
            2 => 0.5,
            _ => min_multiplier,
        }
    }

    /// Apply a throttle signal: grow the backoff, floor the rate.
    /// Returns the effective wait the caller should observe.
    pub(crate) fn on_throttle(
        &mut self,
        server_retry_after: Option<Duration>,
        min_multiplier: f64,
    ) -> Duration {
        self.consecutive_errors += 1;
        let next_backoff = if self.current_backoff.is_zero() {
            INITIAL_BACKOFF
        } else {
            Duration::from_secs_f64(self.current_backoff.as_secs_f64() * BACKOFF_MULTIPLIER)
        }
        .min(MAX_BACKOFF);
        let effective = server_retry_after
            .map(|ra| next_backoff.max(ra))
            .unwrap_or(next_backoff);
        self.current_backoff = effective;
        self.last_error = Instant::now();

        let multiplier = Self::reduction_multiplier(self.consecutive_errors, min_multiplier);
        let floor = self.original_rps * min_multiplier;
        self.reduced_rps = (self.original_rps * multiplier).max(floor);

        effective
    }

    /// Apply a success: returns `Some(new_rate)` if the rate in effect
    /// changed, and `ShouldClear::Yes` if the backoff record should be
    /// dropped entirely (the cooldown elapsed).
    pub(crate) fn on_success(&mut self, cooldown: Duration) -> SuccessOutcome {
        if self.last_error.elapsed() > cooldown {
            return SuccessOutcome::Cleared;
        }

        if self.consecutive_errors > 0 {
            self.consecutive_errors -= 1;
        }

        if self.consecutive_errors == 0 && self.reduced_rps > 0.0 {
            let restored = (self.reduced_rps + self.original_rps) / 2.0;
            self.reduced_rps = if (restored - self.original_rps).abs() < f64::EPSILON {
                0.0
            } else {
                restored
            };
            return SuccessOutcome::RateChanged(self.effective_rps());
        }

        SuccessOutcome::Unchanged
    }
}

/// The outcome of applying a success to a domain's backoff state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum SuccessOutcome {
    /// The record should be removed and the original rate restored.
    Cleared,
    /// The effective rate changed to the contained value.
    RateChanged(f64),
    /// No rate change resulted from this success.
    Unchanged,
}
