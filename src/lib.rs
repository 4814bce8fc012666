//! Resilient outbound HTTP: a precise error taxonomy, per-host token-bucket
//! rate limiting, and 429-aware retry with configurable backoff, in both a
//! blocking and a cooperative (async) flavor.

pub mod backoff;
pub mod client;
pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod http;
pub mod limiter;
pub mod transport;

pub use client::{AsyncClient, BasicClient, RateLimitedClient};
pub use error::{Error, Result};
