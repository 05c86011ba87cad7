//! Shared data model for the vidsync resilience and sync substrate.
//!
//! This crate has no knowledge of HTTP transports, feeds, or pagination
//! schemes; it defines the vocabulary (`Domain`, `ChannelId`, `VideoInfo`,
//! the `Context` cancellation handle, the config structs, and the unified
//! [`Error`] type) that every other `vidsync-*` crate builds on.

#![warn(missing_docs)]

mod config;
mod context;
mod envelope;
mod error;
mod fingerprint;
mod lister;
mod retry_after;
mod video;

pub use config::{
    BreakerConfig, QuotaConfig, RateLimiterConfig, RetryConfig, SessionConfig, TransportConfig,
};
pub use context::Context;
pub use envelope::{RequestEnvelope, ResponseEnvelope};
pub use error::{Error, Result};
pub use fingerprint::{ChannelId, Domain};
pub use lister::{IncrementalResult, ListOptions, Lister};
pub use retry_after::parse_retry_after;
pub use video::{VideoInfo, VideoKind};
