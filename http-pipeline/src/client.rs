//! Pooled `reqwest::Client` construction from [`TransportConfig`].
//!
//! Mirrors the teacher's `CdnClientBuilder`/`tact-client` pool construction:
//! a plain connection-pooled client with configurable per-host idle
//! connections, keep-alive, and HTTP/2 opt-in (spec.md §4.5).

use vidsync_core::{Error, Result, TransportConfig};

/// Build a pooled transport from `cfg`.
///
/// `reqwest` only exposes per-host idle-connection and idle-timeout knobs;
/// it has no total-idle-connections cap and no hard per-host connection
/// ceiling, so `cfg.max_idle_conns` and `cfg.max_conns_per_host` are
/// advisory at this layer (carried in `TransportConfig` for callers that
/// swap in a different transport).
pub fn build_client(cfg: &TransportConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(cfg.timeout)
        .connect_timeout(cfg.connect_timeout)
        .pool_max_idle_per_host(cfg.max_idle_conns_per_host)
        .pool_idle_timeout(cfg.idle_conn_timeout)
        .gzip(true)
        .deflate(true);

    if !cfg.force_attempt_http2 {
        builder = builder.http1_only();
    }
    if cfg.disable_keep_alives {
        builder = builder.pool_max_idle_per_host(0);
    }

    builder.build().map_err(Error::Transport)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds_a_client() {
        let client = build_client(&TransportConfig::default());
        assert!(client.is_ok());
    }
}
