//! Bounded-attempt retry executor with jittered exponential backoff.
//!
//! This is the generalized form of the teacher's CDN-download retry loop
//! (`ngdp-cdn`'s `DEFAULT_MAX_RETRIES`/backoff constants): instead of being
//! wired to one download path, [`run`] takes a pluggable classifier so any
//! caller (the HTTP pipeline, the sync orchestrator) can decide what counts
//! as retryable.

#![warn(missing_docs)]

use std::future::Future;

use rand::Rng;
use vidsync_core::{Context, Error, Result, RetryConfig};

/// The default classifier: cancellation/deadline and the permanent
/// sentinel errors (`ChannelNotFound`, `InvalidUrl`) are not retryable;
/// everything else is.
pub fn default_classifier(err: &Error) -> bool {
    if matches!(err, Error::Canceled | Error::DeadlineExceeded) {
        return false;
    }
    if err.is_permanent_sentinel() {
        return false;
    }
    err.is_retryable()
}

/// Run `f` up to `cfg.max_attempts()` times, retrying while `classify`
/// returns true for the error `f` produced.
///
/// Between attempts, sleeps `min(max_backoff, backoff +- jitter)`, then
/// grows `backoff` by `cfg.multiplier` (capped at `cfg.max_backoff`) for
/// the next round. Cancellation during the sleep returns the context's
/// cancellation error immediately. On exhaustion, the last underlying
/// error is preserved, wrapped in [`Error::RetriesExhausted`].
pub async fn run<T, F, Fut>(
    ctx: &Context,
    cfg: &RetryConfig,
    classify: impl Fn(&Error) -> bool,
    mut f: F,
) -> Result<T>
where
    F: FnMut(&Context) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = cfg.initial_backoff;
    let max_attempts = cfg.max_attempts();

    for attempt in 1..=max_attempts {
        if let Some(err) = ctx.err() {
            return Err(err);
        }

        match f(ctx).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let is_last = attempt == max_attempts;
                if is_last || !classify(&err) {
                    return if is_last && classify(&err) {
                        Err(Error::RetriesExhausted(Box::new(err)))
                    } else {
                        Err(err)
                    };
                }

                tracing::debug!(attempt, max_attempts, error = %err, "retrying after backoff");

                let sleep_for = jittered(backoff, cfg.jitter_fraction).min(cfg.max_backoff);
                ctx.sleep(sleep_for).await?;

                backoff = scale(backoff, cfg.multiplier).min(cfg.max_backoff);
            }
        }
    }

    unreachable!("loop always returns by the last attempt")
}

fn jittered(backoff: std::time::Duration, jitter_fraction: f64) -> std::time::Duration {
    if jitter_fraction <= 0.0 {
        return backoff;
    }
    let base = backoff.as_secs_f64();
    let delta = base * jitter_fraction;
    let jitter = rand::thread_rng().gen_range(-delta..=delta);
    std::time::Duration::from_secs_f64((base + jitter).max(0.0))
}

fn scale(backoff: std::time::Duration, multiplier: f64) -> std::time::Duration {
    std::time::Duration::from_secs_f64(backoff.as_secs_f64() * multiplier)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn succeeds_without_retry() {
        let ctx = Context::background();
        let cfg = RetryConfig::default();
        let calls = AtomicU32::new(0);

        let result: Result<u32> = run(&ctx, &cfg, default_classifier, |_ctx| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(42)
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let ctx = Context::background();
        let cfg = RetryConfig::default()
            .with_max_retries(3)
            .with_initial_backoff(Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result: Result<u32> = run(&ctx, &cfg, default_classifier, |_ctx| async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(Error::Http {
                    status: 503,
                    body: String::new(),
                })
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let ctx = Context::background();
        let cfg = RetryConfig::default();
        let calls = AtomicU32::new(0);

        let result: Result<u32> = run(&ctx, &cfg, default_classifier, |_ctx| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::ChannelNotFound("abc".into()))
        })
        .await;

        assert!(matches!(result, Err(Error::ChannelNotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_wraps_last_error() {
        let ctx = Context::background();
        let cfg = RetryConfig::default()
            .with_max_retries(2)
            .with_initial_backoff(Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result: Result<u32> = run(&ctx, &cfg, default_classifier, |_ctx| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Http {
                status: 500,
                body: String::new(),
            })
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(Error::RetriesExhausted(inner)) => {
                assert!(matches!(*inner, Error::Http { status: 500, .. }));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancellation_during_sleep_returns_canceled() {
        let root = Context::background();
        let (ctx, cancel) = root.with_cancel();
        let cfg = RetryConfig::default()
            .with_max_retries(5)
            .with_initial_backoff(Duration::from_secs(5));

        let handle = tokio::spawn(async move {
            run::<u32, _, _>(&ctx, &cfg, default_classifier, |_ctx| async {
                Err(Error::Http {
                    status: 503,
                    body: String::new(),
                })
            })
            .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("join")
            .expect("task");
        assert!(matches!(result, Err(Error::Canceled)));
    }
}
