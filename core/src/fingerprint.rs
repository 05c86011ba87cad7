use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// The lower-cased host component of a URL, port stripped.
///
/// Every per-host resilience record (circuit breaker state, rate-limiter
/// bucket, dynamic backoff state) is keyed by `Domain`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Domain(String);

impl Domain {
    /// Extract the domain from a URL, lower-cased with the port stripped.
    pub fn from_url(url: &str) -> crate::Result<Self> {
        let parsed = url::Url::parse(url).map_err(|_| Error::InvalidUrl(url.to_string()))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| Error::InvalidUrl(url.to_string()))?;
        Ok(Self(host.to_ascii_lowercase()))
    }

    /// Build a domain from an already-bare host string.
    pub fn from_host(host: impl Into<String>) -> Self {
        Self(host.into().to_ascii_lowercase())
    }

    /// The domain as a plain string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The fixed length of a canonical channel id.
pub const CHANNEL_ID_LEN: usize = 24;

/// The fixed prefix every canonical channel id carries.
pub const CHANNEL_ID_PREFIX: &str = "UC";

/// A 24-character canonical channel identifier.
///
/// Always derivable statelessly from a channel id, a channel URL, or
/// resolved from a handle via an HTML fetch (see `vidsync-resolver`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(String);

impl ChannelId {
    /// Validate and wrap a raw channel id string.
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if Self::looks_like_id(&id) {
            Ok(Self(id))
        } else {
            Err(Error::InvalidUrl(id))
        }
    }

    /// True if `s` matches the fixed-prefix, fixed-length channel id shape.
    pub fn looks_like_id(s: &str) -> bool {
        s.len() == CHANNEL_ID_LEN
            && s.starts_with(CHANNEL_ID_PREFIX)
            && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }

    /// Scan `text` for the first `/channel/<id>` segment and return it.
    pub fn find_in_path(text: &str) -> Option<Self> {
        let idx = text.find("/channel/")?;
        let rest = &text[idx + "/channel/".len()..];
        let end = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
            .unwrap_or(rest.len());
        let candidate = &rest[..end];
        if Self::looks_like_id(candidate) {
            Some(Self(candidate.to_string()))
        } else {
            None
        }
    }

    /// The synthetic uploads-playlist id derived from this channel id.
    ///
    /// Follows the platform convention of swapping the `UC` prefix for `UU`.
    pub fn uploads_playlist_id(&self) -> String {
        format!("UU{}", &self.0[2..])
    }

    /// The channel id as a plain string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ChannelId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_strips_port_and_lowercases() {
        let d = Domain::from_url("https://Www.Example.COM:443/path").unwrap();
        assert_eq!(d.as_str(), "www.example.com");
    }

    #[test]
    fn channel_id_validates_shape() {
        let id = "UC" . to_string() + &"a".repeat(22);
        assert!(ChannelId::new(id).is_ok());
        assert!(ChannelId::new("too-short").is_err());
    }

    #[test]
    fn channel_id_found_in_path() {
        let id = "UC".to_string() + &"b".repeat(22);
        let text = format!("<link rel=\"canonical\" href=\"https://example.com/channel/{id}\">");
        let found = ChannelId::find_in_path(&text).unwrap();
        assert_eq!(found.as_str(), id);
    }

    #[test]
    fn uploads_playlist_id_swaps_prefix() {
        let id = ChannelId::new("UC".to_string() + &"c".repeat(22)).unwrap();
        assert!(id.uploads_playlist_id().starts_with("UU"));
    }
}
