use std::time::Duration;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// The unified error type returned from every public vidsync operation.
///
/// Variants are grouped by how a caller should react to them: permanent
/// client errors, transient transport errors, throttle errors, capacity
/// errors, and integrity errors. [`Error::is_retryable`] answers the
/// caller-facing question of whether trying again makes sense.
#[derive(Debug, Error)]
pub enum Error {
    /// The channel could not be found (HTTP 404 on a channel page, or a
    /// channel id that does not resolve). Never retried.
    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    /// The supplied identifier/URL/handle could not be parsed. Never
    /// retried.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// A non-2xx, non-throttle HTTP status was returned.
    #[error("http error: status {status}")]
    Http {
        /// The HTTP status code.
        status: u16,
        /// The response body, for diagnostics.
        body: String,
    },

    /// The transport failed below the HTTP layer (connection reset, DNS,
    /// TLS, timeout).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The remote signaled throttling (429/503/403).
    #[error("throttled: status {status}, retry after {retry_after:?}")]
    Throttle {
        /// The HTTP status that signaled throttling.
        status: u16,
        /// The effective wait the caller should observe, if known.
        retry_after: Option<Duration>,
        /// True when the throttle looked like anti-bot gating (403).
        is_bot_detection: bool,
    },

    /// The domain's circuit breaker is open; no attempt was made.
    #[error("circuit open for domain")]
    CircuitOpen,

    /// An advisory file lock could not be acquired before the timeout.
    #[error("timed out waiting for lock")]
    LockTimeout,

    /// The configured API quota has been exhausted and no fallback lister
    /// is configured.
    #[error("quota exhausted")]
    QuotaExhausted,

    /// A response did not match any known schema shape.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Persisted state failed to deserialize or violated an invariant.
    #[error("corrupt persisted state: {0}")]
    CorruptState(String),

    /// The calling context was canceled.
    #[error("operation canceled")]
    Canceled,

    /// The calling context's deadline elapsed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Retries were exhausted; the wrapped error is the last attempt's
    /// cause.
    #[error("retries exhausted: {0}")]
    RetriesExhausted(Box<Error>),

    /// Underlying I/O failure (reading/writing persisted state, cookie
    /// files, lock files).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the caller themselves should attempt the operation again.
    ///
    /// Permanent and capacity errors are not retryable; transient
    /// transport errors and throttle signals are.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::ChannelNotFound(_)
            | Error::InvalidUrl(_)
            | Error::CircuitOpen
            | Error::LockTimeout
            | Error::QuotaExhausted
            | Error::Malformed(_)
            | Error::CorruptState(_)
            | Error::Canceled
            | Error::DeadlineExceeded => false,
            Error::Http { status, .. } => *status >= 500,
            Error::Throttle { .. } | Error::Transport(_) | Error::Io(_) => true,
            Error::RetriesExhausted(inner) => inner.is_retryable(),
            Error::Json(_) => false,
        }
    }

    /// True for the two sentinel permanent errors the default retry
    /// classifier special-cases.
    pub fn is_permanent_sentinel(&self) -> bool {
        matches!(self, Error::ChannelNotFound(_) | Error::InvalidUrl(_))
    }
}
