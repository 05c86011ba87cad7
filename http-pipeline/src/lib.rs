//! Resilient HTTP pipeline (C5): composes the circuit breaker, rate
//! limiter, session state, and retry engine around a pooled transport.
//!
//! spec.md §4.5's mandatory ordering: breaker check, backoff wait, token
//! wait, retry-wrapped dispatch, outcome recorded back to the breaker and
//! limiter.

#![warn(missing_docs)]

mod client;

use std::collections::HashMap;

use vidsync_breaker::CircuitBreaker;
use vidsync_core::{
    parse_retry_after, Domain, Error, RequestEnvelope, ResponseEnvelope, Result, RetryConfig,
    TransportConfig,
};
use vidsync_ratelimit::RateLimiter;
use vidsync_session::Session;

pub use client::build_client;

/// A resilient HTTP request path.
///
/// Owns its transport, breaker, and rate limiter outright; a [`Session`] is
/// optional and, when present, exclusively owned by this pipeline (spec.md
/// §4.4: "the session is exclusively owned by the HTTP Pipeline it was
/// handed to").
pub struct Pipeline {
    client: reqwest::Client,
    breaker: CircuitBreaker,
    ratelimit: RateLimiter,
    session: Option<Session>,
    retry_cfg: RetryConfig,
}

impl Pipeline {
    /// Build a pipeline from its component configurations and resilience
    /// primitives.
    pub fn new(
        transport: &TransportConfig,
        breaker: CircuitBreaker,
        ratelimit: RateLimiter,
        retry_cfg: RetryConfig,
        session: Option<Session>,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client(transport)?,
            breaker,
            ratelimit,
            session,
            retry_cfg,
        })
    }

    /// Execute `req`, following spec.md §4.5's ordering exactly.
    pub async fn execute(&self, req: RequestEnvelope) -> Result<ResponseEnvelope> {
        let domain = Domain::from_url(&req.url)?;
        let _permit = self.breaker.allow(&domain)?;

        self.ratelimit.wait_for_backoff(&req.context, &req.url).await?;
        self.ratelimit.wait(&req.context, &req.url).await?;

        let outcome = vidsync_retry::run(
            &req.context,
            &self.retry_cfg,
            vidsync_retry::default_classifier,
            |ctx| self.dispatch_once(&req, ctx),
        )
        .await;

        match &outcome {
            Ok(_) => {
                self.ratelimit.record_success(&req.url)?;
                self.breaker.record_success(&domain);
            }
            Err(err) => {
                self.breaker.record_failure(&domain, err.is_retryable());
            }
        }

        outcome
    }

    async fn dispatch_once(
        &self,
        req: &RequestEnvelope,
        _ctx: &vidsync_core::Context,
    ) -> Result<ResponseEnvelope> {
        let method = req.method.clone();
        let mut builder = self.client.request(method, &req.url);

        let target_url = url::Url::parse(&req.url).ok();

        // spec.md §4.5: "plus session headers (session headers do not
        // override caller-provided ones)". Merge into one map, keyed
        // case-insensitively, with per-call overrides applied last, so
        // each header name appears at most once on the wire.
        let mut effective: HashMap<String, String> = HashMap::new();
        if let Some(session) = &self.session {
            for (key, value) in session.headers() {
                effective.insert(key.to_ascii_lowercase(), value);
            }
        }
        for (key, value) in &req.headers {
            effective.insert(key.to_ascii_lowercase(), value.clone());
        }
        for (key, value) in &effective {
            builder = builder.header(key, value);
        }
        if let Some(session) = &self.session {
            if let Some(url) = &target_url {
                if let Some(cookie) = session.cookie_header(url) {
                    builder = builder.header(reqwest::header::COOKIE, cookie);
                }
            }
        }
        if let Some(body) = &req.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();

        let set_cookie_values: Vec<String> = response
            .headers()
            .get_all(reqwest::header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok().map(str::to_string))
            .collect();
        let retry_after_header = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_ascii_lowercase(),
                    v.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();

        let body = response.bytes().await?;

        if let (Some(session), Some(url)) = (&self.session, &target_url) {
            session.observe_response(url, set_cookie_values);
        }

        if matches!(status, 429 | 503 | 403) {
            let effective = self.ratelimit.record_throttle(&req.url, retry_after_header)?;
            return Err(Error::Throttle {
                status,
                retry_after: Some(effective),
                is_bot_detection: status == 403,
            });
        }

        if !(200..300).contains(&status) {
            return Err(Error::Http {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Ok(ResponseEnvelope {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidsync_breaker::CircuitBreaker;
    use vidsync_core::{BreakerConfig, Context, RateLimiterConfig};
    use vidsync_ratelimit::RateLimiter;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn pipeline() -> Pipeline {
        Pipeline::new(
            &TransportConfig::default(),
            CircuitBreaker::new(BreakerConfig::default()),
            RateLimiter::new(RateLimiterConfig {
                default_rps: 0.0,
                ..Default::default()
            }),
            RetryConfig::default().with_initial_backoff(std::time::Duration::from_millis(1)),
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn success_roundtrips_body_and_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .mount(&server)
            .await;

        let pipeline = pipeline();
        let url = format!("{}/ok", server.uri());
        let req = RequestEnvelope::get(url, Context::background());
        let resp = pipeline.execute(req).await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, b"hello");
    }

    #[tokio::test]
    async fn server_error_is_retried_then_wrapped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut retry_cfg = RetryConfig::default();
        retry_cfg = retry_cfg
            .with_max_retries(1)
            .with_initial_backoff(std::time::Duration::from_millis(1));

        let pipeline = Pipeline::new(
            &TransportConfig::default(),
            CircuitBreaker::new(BreakerConfig {
                failure_threshold: 100,
                ..Default::default()
            }),
            RateLimiter::new(RateLimiterConfig {
                default_rps: 0.0,
                ..Default::default()
            }),
            retry_cfg,
            None,
        )
        .unwrap();

        let url = format!("{}/broken", server.uri());
        let req = RequestEnvelope::get(url, Context::background());
        let result = pipeline.execute(req).await;
        assert!(matches!(
            result,
            Err(Error::RetriesExhausted(inner)) if matches!(*inner, Error::Http { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn throttle_status_records_into_rate_limiter() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/throttled"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "2"))
            .mount(&server)
            .await;

        let pipeline = Pipeline::new(
            &TransportConfig::default(),
            CircuitBreaker::new(BreakerConfig::default()),
            RateLimiter::new(RateLimiterConfig::default()),
            RetryConfig::default().with_max_retries(0),
            None,
        )
        .unwrap();

        let url = format!("{}/throttled", server.uri());
        let req = RequestEnvelope::get(url, Context::background());
        let result = pipeline.execute(req).await;
        assert!(matches!(result, Err(Error::Throttle { status: 429, .. })));
    }

    #[tokio::test]
    async fn open_circuit_rejects_without_network_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fail"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let pipeline = Pipeline::new(
            &TransportConfig::default(),
            CircuitBreaker::new(BreakerConfig {
                failure_threshold: 1,
                recovery_timeout: std::time::Duration::from_secs(60),
                ..Default::default()
            }),
            RateLimiter::new(RateLimiterConfig {
                default_rps: 0.0,
                ..Default::default()
            }),
            RetryConfig::default().with_max_retries(0),
            None,
        )
        .unwrap();

        let url = format!("{}/fail", server.uri());
        let first = pipeline
            .execute(RequestEnvelope::get(url.clone(), Context::background()))
            .await;
        assert!(first.is_err());

        let second = pipeline
            .execute(RequestEnvelope::get(url, Context::background()))
            .await;
        assert!(matches!(second, Err(Error::CircuitOpen)));
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }
}
