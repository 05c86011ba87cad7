use std::time::Duration;

use chrono::Utc;

/// Parse an HTTP `Retry-After` header value, accepting either an integer
/// number of seconds or an HTTP-date. Returns `None` if `value` matches
/// neither form, or resolves to a date in the past.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let trimmed = value.trim();

    if let Ok(secs) = trimmed.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let when = httpdate::parse_http_date(trimmed).ok()?;
    let when_secs = when
        .duration_since(std::time::UNIX_EPOCH)
        .ok()?
        .as_secs_f64();
    let now_secs = Utc::now().timestamp() as f64;
    let delta = when_secs - now_secs;
    if delta > 0.0 {
        Some(Duration::from_secs_f64(delta))
    } else {
        Some(Duration::ZERO)
    }
}
