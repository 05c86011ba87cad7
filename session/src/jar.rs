use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use chrono::{DateTime, Utc};
use cookie_store::CookieStore;
use serde::{Deserialize, Serialize};
use vidsync_core::{Domain, Result};

/// A small set of hosts related to the primary domain that replayed cookies
/// are also installed against on load.
#[derive(Debug, Clone)]
pub struct RelatedHosts(Vec<String>);

impl RelatedHosts {
    fn for_primary(primary: &Domain) -> Self {
        let base = primary.as_str();
        let mut hosts = vec![base.to_string()];
        if let Some(stripped) = base.strip_prefix("www.") {
            hosts.push(stripped.to_string());
        } else {
            hosts.push(format!("www.{base}"));
        }
        Self(hosts)
    }

    fn as_urls(&self) -> Vec<url::Url> {
        self.0
            .iter()
            .filter_map(|host| url::Url::parse(&format!("https://{host}/")).ok())
            .collect()
    }
}

/// A cookie stripped to the fields we persist, independent of the jar's
/// in-memory representation so the on-disk format doesn't churn with
/// `cookie_store` internals.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedCookie {
    name: String,
    value: String,
    domain: Option<String>,
    path: Option<String>,
    expires_unix: Option<i64>,
    secure: bool,
    http_only: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedJar {
    cookies: Vec<PersistedCookie>,
}

#[cfg(unix)]
fn set_dir_mode_0700(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_dir_mode_0700(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn set_file_mode_0600(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_file_mode_0600(_path: &Path) -> Result<()> {
    Ok(())
}

pub(crate) struct Jar {
    store: CookieStore,
}

impl Jar {
    pub(crate) fn new() -> Self {
        Self {
            store: CookieStore::default(),
        }
    }

    pub(crate) fn store_set_cookie(&mut self, raw: &str, url: &url::Url) {
        match cookie::Cookie::parse(raw.to_string()) {
            Ok(parsed) => {
                if let Err(err) = self
                    .store
                    .store_response_cookies(std::iter::once(parsed), url)
                {
                    tracing::debug!(%err, "dropping unparseable cookie");
                }
            }
            Err(err) => tracing::debug!(%err, "dropping malformed Set-Cookie header"),
        }
    }

    pub(crate) fn cookie_header(&self, url: &url::Url) -> Option<String> {
        let pairs: Vec<String> = self
            .store
            .get_request_values(url)
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }

    pub(crate) fn earliest_expiry(&self, primary: &Domain) -> Option<DateTime<Utc>> {
        self.store
            .iter_unexpired()
            .filter(|c| {
                c.domain()
                    .map(|d| {
                        d.trim_start_matches('.')
                            .eq_ignore_ascii_case(primary.as_str())
                    })
                    .unwrap_or(false)
            })
            .filter_map(|c| c.expires_datetime())
            .filter_map(|odt| DateTime::<Utc>::from_timestamp(odt.unix_timestamp(), 0))
            .min()
    }

    fn snapshot(&self) -> PersistedJar {
        let cookies = self
            .store
            .iter_unexpired()
            .map(|c| PersistedCookie {
                name: c.name().to_string(),
                value: c.value().to_string(),
                domain: c.domain().map(str::to_string),
                path: c.path().map(str::to_string),
                expires_unix: c.expires_datetime().map(|odt| odt.unix_timestamp()),
                secure: c.secure().unwrap_or(false),
                http_only: c.http_only().unwrap_or(false),
            })
            .collect();
        PersistedJar { cookies }
    }

    pub(crate) fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
            set_dir_mode_0700(parent)?;
        }
        let snapshot = self.snapshot();
        let tmp_path = path.with_extension("tmp");
        let write_result: Result<()> = (|| {
            let file = File::create(&tmp_path)?;
            set_file_mode_0600(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &snapshot)?;
            use std::io::Write;
            writer.flush()?;
            writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
            std::fs::rename(&tmp_path, path)?;
            Ok(())
        })();
        if write_result.is_err() {
            let _ = std::fs::remove_file(&tmp_path);
        }
        write_result
    }

    pub(crate) fn load(&mut self, path: &Path, primary: &Domain) -> Result<()> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let persisted: PersistedJar = serde_json::from_reader(reader)?;

        let hosts = RelatedHosts::for_primary(primary);
        for target in hosts.as_urls() {
            for cookie in &persisted.cookies {
                let mut builder = cookie::Cookie::build((cookie.name.clone(), cookie.value.clone()))
                    .path(cookie.path.clone().unwrap_or_else(|| "/".to_string()))
                    .secure(cookie.secure)
                    .http_only(cookie.http_only);
                if let Some(domain) = &cookie.domain {
                    builder = builder.domain(domain.clone());
                }
                if let Some(expires_unix) = cookie.expires_unix {
                    if let Ok(odt) = time::OffsetDateTime::from_unix_timestamp(expires_unix) {
                        builder = builder.expires(odt);
                    }
                }
                let built = builder.build();
                if let Err(err) = self
                    .store
                    .store_response_cookies(std::iter::once(built), &target)
                {
                    tracing::debug!(%err, "dropping cookie replayed from persisted jar");
                }
            }
        }

        Ok(())
    }
}
