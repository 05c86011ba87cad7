//! Cookie jar and default-header state for a single logical session (C4).
//!
//! Bridges `cookie_store` to `reqwest` manually — reading `Set-Cookie` off
//! responses and writing a synthesized `Cookie` header on requests — rather
//! than reqwest's opaque built-in jar, because [`Session::session_expiry`]
//! and [`Session::save`]/[`Session::load`] need to introspect individual
//! cookie expiries, which the opaque jar doesn't expose.

#![warn(missing_docs)]

mod jar;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use vidsync_core::{Domain, Result, SessionConfig};

pub use jar::RelatedHosts;

/// Cookie jar, header set, and optional persistence for a single logical
/// session.
///
/// Owned exclusively by the HTTP pipeline it is handed to; all access is
/// internally synchronized so a pipeline may share a `Session` across
/// concurrently in-flight requests.
pub struct Session {
    cfg: SessionConfig,
    primary_domain: Domain,
    jar: RwLock<jar::Jar>,
    headers: RwLock<HashMap<String, String>>,
}

impl Session {
    /// Build a session for `primary_domain`, seeding default headers from
    /// `cfg`.
    pub fn new(primary_domain: Domain, cfg: SessionConfig) -> Self {
        let mut headers = HashMap::new();
        if let Some(ua) = &cfg.user_agent {
            headers.insert("User-Agent".to_string(), ua.clone());
        }
        if let Some(referer) = &cfg.referer_url {
            headers.insert("Referer".to_string(), referer.clone());
        }
        for (k, v) in &cfg.headers_to_add {
            headers.insert(k.clone(), v.clone());
        }

        Self {
            cfg,
            primary_domain,
            jar: RwLock::new(jar::Jar::new()),
            headers: RwLock::new(headers),
        }
    }

    /// A snapshot of the default headers currently in effect.
    pub fn headers(&self) -> HashMap<String, String> {
        self.headers.read().clone()
    }

    /// Add (or overwrite) a default header.
    pub fn add_header(&self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.write().insert(key.into(), value.into());
    }

    /// Set the default `Referer` header.
    pub fn set_referer(&self, url: impl Into<String>) {
        self.headers
            .write()
            .insert("Referer".to_string(), url.into());
    }

    /// Record cookies observed in a response's `Set-Cookie` header values.
    pub fn observe_response(
        &self,
        url: &url::Url,
        set_cookie_values: impl IntoIterator<Item = String>,
    ) {
        let mut jar = self.jar.write();
        for raw in set_cookie_values {
            jar.store_set_cookie(&raw, url);
        }
    }

    /// Build the `Cookie` header value to attach to an outbound request to
    /// `url`, if the jar holds any matching cookies.
    pub fn cookie_header(&self, url: &url::Url) -> Option<String> {
        self.jar.read().cookie_header(url)
    }

    /// Persist the jar to `cfg.cookie_file`. A no-op when persistence is
    /// disabled or unconfigured.
    pub fn save(&self) -> Result<()> {
        if !self.cfg.persist_cookies {
            return Ok(());
        }
        let Some(path) = self.cfg.cookie_file.as_ref() else {
            return Ok(());
        };
        self.jar.read().save(path)
    }

    /// Load cookies from `cfg.cookie_file`, replaying them against the
    /// primary domain and its close relatives. A no-op when persistence is
    /// disabled, unconfigured, or the file doesn't exist yet.
    pub fn load(&self) -> Result<()> {
        if !self.cfg.persist_cookies {
            return Ok(());
        }
        let Some(path) = self.cfg.cookie_file.as_ref() else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }
        self.jar.write().load(path, &self.primary_domain)
    }

    /// The earliest non-zero cookie expiry across the primary domain.
    pub fn session_expiry(&self) -> Option<DateTime<Utc>> {
        self.jar.read().earliest_expiry(&self.primary_domain)
    }
}
