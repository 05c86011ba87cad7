use std::collections::HashMap;
use std::time::Duration;

/// Retry engine configuration (C1). Defaults follow the same shape as the
/// teacher's CDN download retry constants, generalized to a bounded-attempt
/// executor with a pluggable classifier.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Initial backoff before the first retry.
    pub initial_backoff: Duration,
    /// The backoff ceiling.
    pub max_backoff: Duration,
    /// Backoff growth multiplier applied after each attempt.
    pub multiplier: f64,
    /// Jitter fraction in `[0, 1]`; the actual sleep is uniform in
    /// `[backoff * (1 - jitter), backoff * (1 + jitter)]`.
    pub jitter_fraction: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
            jitter_fraction: 0.1,
        }
    }
}

impl RetryConfig {
    /// Total attempts a run will make (`1 + max_retries`).
    pub fn max_attempts(&self) -> u32 {
        1 + self.max_retries
    }

    /// Override the maximum number of retries.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Override the initial backoff.
    #[must_use]
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Override the backoff ceiling.
    #[must_use]
    pub fn with_max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = backoff;
        self
    }
}

/// Circuit breaker configuration (C3).
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive transient failures before a domain's breaker opens.
    pub failure_threshold: u32,
    /// How long an open breaker waits before allowing a half-open probe.
    pub recovery_timeout: Duration,
    /// Maximum concurrent probe requests allowed while half-open.
    pub half_open_max_requests: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            half_open_max_requests: 1,
        }
    }
}

/// Rate limiter configuration (C2).
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Default requests-per-second for domains with no explicit entry.
    pub default_rps: f64,
    /// Per-domain RPS overrides.
    pub domain_rps: HashMap<String, f64>,
    /// Whether dynamic backoff on throttle signals is enabled.
    pub enable_dynamic_backoff: bool,
    /// The floor below which a throttled domain's rate is never reduced,
    /// expressed as a fraction of its original rate.
    pub min_rate_multiplier: f64,
    /// How long after the last throttle before a domain's rate is fully
    /// restored on the next success.
    pub backoff_cooldown: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            default_rps: 1.0,
            domain_rps: HashMap::new(),
            enable_dynamic_backoff: true,
            min_rate_multiplier: 0.25,
            backoff_cooldown: Duration::from_secs(5 * 60),
        }
    }
}

impl RateLimiterConfig {
    /// Set the RPS for a specific domain.
    #[must_use]
    pub fn with_domain_rps(mut self, domain: impl Into<String>, rps: f64) -> Self {
        self.domain_rps.insert(domain.into(), rps);
        self
    }
}

/// Pooled transport configuration (part of C5).
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Overall request timeout.
    pub timeout: Duration,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Maximum total idle connections across all hosts.
    pub max_idle_conns: usize,
    /// Maximum idle connections per host.
    pub max_idle_conns_per_host: usize,
    /// Maximum connections (idle + active) per host, if bounded.
    pub max_conns_per_host: Option<usize>,
    /// How long an idle pooled connection is kept before eviction.
    pub idle_conn_timeout: Duration,
    /// Whether to opt into HTTP/2 where the server supports it.
    pub force_attempt_http2: bool,
    /// Whether to disable HTTP keep-alive entirely.
    pub disable_keep_alives: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            max_idle_conns: 100,
            max_idle_conns_per_host: 20,
            max_conns_per_host: None,
            idle_conn_timeout: Duration::from_secs(90),
            force_attempt_http2: false,
            disable_keep_alives: false,
        }
    }
}

/// Session configuration (C4).
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Whether cookies should be persisted to `cookie_file`.
    pub persist_cookies: bool,
    /// Path to the cookie jar JSON file, if persisting.
    pub cookie_file: Option<std::path::PathBuf>,
    /// The default `User-Agent` header.
    pub user_agent: Option<String>,
    /// The default `Referer` header.
    pub referer_url: Option<String>,
    /// Additional default headers applied to every request.
    pub headers_to_add: HashMap<String, String>,
}

/// Quota-aware lister configuration (C8).
#[derive(Debug, Clone)]
pub struct QuotaConfig {
    /// Total quota units available per 24h window.
    pub daily_quota: u64,
    /// Units reserved; once remaining quota drops below this, the lister
    /// reports exhaustion and delegates to its fallback.
    pub reserve: u64,
    /// Unit cost of a `search.list` call.
    pub search_cost: u64,
    /// Unit cost of a `channels.list` call.
    pub channels_cost: u64,
    /// Unit cost of a `playlistItems.list` call (per page).
    pub playlist_items_cost: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            daily_quota: 10_000,
            reserve: 100,
            search_cost: 100,
            channels_cost: 1,
            playlist_items_cost: 1,
        }
    }
}
