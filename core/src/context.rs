use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::Error;

/// A cooperative cancellation/deadline handle threaded through every
/// blocking operation in the workspace (bucket waits, backoff waits,
/// retry sleeps, HTTP dispatch, subprocess invocation).
///
/// Cloning a `Context` shares the same cancellation signal; canceling any
/// clone cancels all of them. A deadline, if set, is evaluated relative to
/// when the root context was created.
#[derive(Debug, Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context with no deadline that is never canceled on its own.
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Derive a child context with a deadline `timeout` from now. The
    /// child shares its parent's cancellation signal.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        Self {
            token: self.token.clone(),
            deadline: Some(match self.deadline {
                Some(existing) if existing < deadline => existing,
                _ => deadline,
            }),
        }
    }

    /// Derive a child context plus a handle that cancels it (and every
    /// clone of it) when dropped or invoked explicitly.
    #[must_use]
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let child = self.token.child_token();
        let ctx = Self {
            token: child.clone(),
            deadline: self.deadline,
        };
        (ctx, CancelHandle { token: child })
    }

    /// True if the context has been canceled or its deadline has passed.
    pub fn is_done(&self) -> bool {
        self.token.is_cancelled() || self.deadline_exceeded()
    }

    fn deadline_exceeded(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// The error to report if [`Context::is_done`] is true; `None`
    /// otherwise.
    pub fn err(&self) -> Option<Error> {
        if self.token.is_cancelled() {
            Some(Error::Canceled)
        } else if self.deadline_exceeded() {
            Some(Error::DeadlineExceeded)
        } else {
            None
        }
    }

    /// Resolve once the context is canceled or its deadline passes,
    /// yielding the corresponding error. Never resolves for a background
    /// context with no deadline.
    pub async fn canceled(&self) -> Error {
        match self.deadline {
            Some(deadline) => {
                let now = Instant::now();
                let remaining = deadline.saturating_duration_since(now);
                tokio::select! {
                    () = self.token.cancelled() => Error::Canceled,
                    () = tokio::time::sleep(remaining) => Error::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                Error::Canceled
            }
        }
    }

    /// Sleep for `duration`, or resolve early with the context's error if
    /// it completes/expires first.
    pub async fn sleep(&self, duration: Duration) -> crate::Result<()> {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            () = tokio::time::sleep(duration) => Ok(()),
            err = self.canceled() => Err(err),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

/// A handle returned by [`Context::with_cancel`] that cancels the derived
/// context (and any clones of it) when invoked.
#[derive(Debug)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    /// Cancel the associated context.
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_propagates_to_derived_context() {
        let root = Context::background();
        let (child, cancel) = root.with_cancel();
        assert!(!child.is_done());
        cancel.cancel();
        assert!(child.is_done());
        assert!(matches!(child.err(), Some(Error::Canceled)));
    }

    #[tokio::test]
    async fn sleep_returns_early_on_cancel() {
        let root = Context::background();
        let (child, cancel) = root.with_cancel();
        let sleeper = tokio::spawn(async move { child.sleep(Duration::from_secs(30)).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(1), sleeper)
            .await
            .expect("join")
            .expect("task");
        assert!(matches!(result, Err(Error::Canceled)));
    }

    #[tokio::test]
    async fn deadline_expires() {
        let root = Context::background().with_timeout(Duration::from_millis(20));
        let err = root.canceled().await;
        assert!(matches!(err, Error::DeadlineExceeded));
    }
}
