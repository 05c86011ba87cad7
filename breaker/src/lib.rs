//! Per-domain three-state circuit breaker (closed/open/half-open).
//!
//! Structured after the teacher's shared-state idiom in
//! `ngdp-cdn/src/fallback.rs` (a single `parking_lot::RwLock` guarding a
//! shared collection), scaled from a `Vec<String>` of CDN hosts to a
//! `HashMap<Domain, DomainState>` of per-domain breaker records.

#![warn(missing_docs)]

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use vidsync_core::{BreakerConfig, Domain, Error};

/// The three states a domain's breaker can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Requests flow normally.
    Closed,
    /// Requests are denied without an attempt.
    Open,
    /// A bounded number of probe requests are allowed through.
    HalfOpen,
}

#[derive(Debug, Clone)]
struct DomainState {
    state: State,
    consecutive_errors: u32,
    last_state_change: Instant,
    half_open_in_flight: u32,
}

impl DomainState {
    fn new() -> Self {
        Self {
            state: State::Closed,
            consecutive_errors: 0,
            last_state_change: Instant::now(),
            half_open_in_flight: 0,
        }
    }
}

/// A permit decision returned by [`CircuitBreaker::allow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permit;

/// The per-domain circuit breaker.
///
/// Safe under concurrent use: every mutation happens under the single
/// breaker-wide write lock.
pub struct CircuitBreaker {
    cfg: BreakerConfig,
    domains: RwLock<HashMap<Domain, DomainState>>,
}

impl CircuitBreaker {
    /// Build a breaker with the given configuration.
    pub fn new(cfg: BreakerConfig) -> Self {
        Self {
            cfg,
            domains: RwLock::new(HashMap::new()),
        }
    }

    /// Ask whether a request to `domain` may proceed.
    ///
    /// `Closed` always allows. `Open` allows exactly once recovery_timeout
    /// has elapsed since the last state change, transitioning to
    /// `HalfOpen` and admitting the first probe. `HalfOpen` allows up to
    /// `half_open_max_requests` concurrent probes.
    pub fn allow(&self, domain: &Domain) -> Result<Permit, Error> {
        let mut domains = self.domains.write();
        let entry = domains.entry(domain.clone()).or_insert_with(DomainState::new);

        match entry.state {
            State::Closed => Ok(Permit),
            State::Open => {
                if entry.last_state_change.elapsed() >= self.cfg.recovery_timeout {
                    entry.state = State::HalfOpen;
                    entry.last_state_change = Instant::now();
                    entry.half_open_in_flight = 1;
                    tracing::debug!(%domain, "circuit half-open, admitting probe");
                    Ok(Permit)
                } else {
                    Err(Error::CircuitOpen)
                }
            }
            State::HalfOpen => {
                if entry.half_open_in_flight < self.cfg.half_open_max_requests {
                    entry.half_open_in_flight += 1;
                    Ok(Permit)
                } else {
                    Err(Error::CircuitOpen)
                }
            }
        }
    }

    /// Record a successful outcome for `domain`.
    pub fn record_success(&self, domain: &Domain) {
        let mut domains = self.domains.write();
        let entry = domains.entry(domain.clone()).or_insert_with(DomainState::new);
        match entry.state {
            State::Closed => entry.consecutive_errors = 0,
            State::HalfOpen => {
                tracing::debug!(%domain, "circuit closing after successful probe");
                entry.state = State::Closed;
                entry.consecutive_errors = 0;
                entry.half_open_in_flight = 0;
                entry.last_state_change = Instant::now();
            }
            State::Open => {}
        }
    }

    /// Record a failure for `domain`. `is_transient` gates whether this
    /// failure counts against the breaker at all — permanent client
    /// errors (404, 400, ...) must not trip it.
    pub fn record_failure(&self, domain: &Domain, is_transient: bool) {
        if !is_transient {
            return;
        }
        let mut domains = self.domains.write();
        let entry = domains.entry(domain.clone()).or_insert_with(DomainState::new);
        match entry.state {
            State::Closed => {
                entry.consecutive_errors += 1;
                if entry.consecutive_errors >= self.cfg.failure_threshold {
                    tracing::warn!(%domain, errors = entry.consecutive_errors, "circuit opening");
                    entry.state = State::Open;
                    entry.last_state_change = Instant::now();
                }
            }
            State::HalfOpen => {
                tracing::warn!(%domain, "probe failed, circuit re-opening");
                entry.state = State::Open;
                entry.last_state_change = Instant::now();
            }
            State::Open => {}
        }
    }

    /// Snapshot the current state of `domain`, for diagnostics/tests.
    pub fn state(&self, domain: &Domain) -> State {
        self.domains
            .read()
            .get(domain)
            .map_or(State::Closed, |d| d.state)
    }

    /// Time remaining until `domain`'s breaker would allow a half-open
    /// probe, if currently open.
    pub fn recovery_remaining(&self, domain: &Domain) -> Option<Duration> {
        let domains = self.domains.read();
        let entry = domains.get(domain)?;
        if entry.state != State::Open {
            return None;
        }
        Some(
            self.cfg
                .recovery_timeout
                .saturating_sub(entry.last_state_change.elapsed()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn domain() -> Domain {
        Domain::from_host("example.com")
    }

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new(BreakerConfig {
            failure_threshold: 3,
            ..Default::default()
        });
        let d = domain();

        for _ in 0..2 {
            breaker.allow(&d).unwrap();
            breaker.record_failure(&d, true);
        }
        assert_eq!(breaker.state(&d), State::Closed);

        breaker.allow(&d).unwrap();
        breaker.record_failure(&d, true);
        assert_eq!(breaker.state(&d), State::Open);
        assert!(breaker.allow(&d).is_err());
    }

    #[test]
    fn permanent_failures_never_trip_breaker() {
        let breaker = CircuitBreaker::new(BreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        });
        let d = domain();
        for _ in 0..10 {
            breaker.record_failure(&d, false);
        }
        assert_eq!(breaker.state(&d), State::Closed);
    }

    #[test]
    fn half_open_closes_on_success_and_reopens_on_failure() {
        let breaker = CircuitBreaker::new(BreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_millis(1),
            half_open_max_requests: 1,
            ..Default::default()
        });
        let d = domain();
        breaker.record_failure(&d, true);
        assert_eq!(breaker.state(&d), State::Open);

        std::thread::sleep(Duration::from_millis(5));
        breaker.allow(&d).unwrap();
        assert_eq!(breaker.state(&d), State::HalfOpen);

        breaker.record_success(&d);
        assert_eq!(breaker.state(&d), State::Closed);
    }

    #[test]
    fn half_open_respects_max_concurrent_probes() {
        let breaker = CircuitBreaker::new(BreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_millis(1),
            half_open_max_requests: 1,
            ..Default::default()
        });
        let d = domain();
        breaker.record_failure(&d, true);
        std::thread::sleep(Duration::from_millis(5));

        breaker.allow(&d).unwrap();
        assert!(breaker.allow(&d).is_err());
    }

    proptest! {
        #[test]
        fn opens_exactly_on_kth_consecutive_failure(threshold in 1u32..10) {
            let breaker = CircuitBreaker::new(BreakerConfig {
                failure_threshold: threshold,
                ..Default::default()
            });
            let d = domain();

            for i in 1..threshold {
                breaker.record_failure(&d, true);
                prop_assert_eq!(breaker.state(&d), State::Closed, "opened early at {}", i);
            }
            breaker.record_failure(&d, true);
            prop_assert_eq!(breaker.state(&d), State::Open);
        }
    }
}
