//! Client configuration.
//!
//! Both configs deserialize from any serde format with every field optional;
//! durations are written as (fractional) seconds.

use reqwest::header::HeaderMap;
use serde::{Deserialize, Deserializer};
use std::time::Duration;

use crate::backoff::{BackoffConfig, RetryPolicy};

/// Settings for [`RateLimitedClient`](crate::client::RateLimitedClient).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Retries allowed after a 429; at most `max_retries + 1` attempts per call.
    pub max_retries: u32,
    /// Per-host admission rate. Zero or negative disables limiting.
    pub requests_per_second: f64,
    /// Bucket capacity; defaults to `requests_per_second`.
    pub max_burst: Option<f64>,
    /// Per-attempt timeout, unless a request sets its own.
    #[serde(rename = "timeout_secs", deserialize_with = "opt_secs")]
    pub timeout: Option<Duration>,
    pub backoff: BackoffConfig,
    /// Raise on 429 exhaustion instead of returning the last response.
    pub raise_on_429: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            requests_per_second: 10.0,
            max_burst: None,
            timeout: Some(Duration::from_secs(10)),
            backoff: BackoffConfig::default(),
            raise_on_429: true,
        }
    }
}

impl ClientConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.backoff.clone())
    }
}

/// Settings for [`AsyncClient`](crate::client::AsyncClient).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AsyncClientConfig {
    /// Sent with every request; per-request headers win on conflict.
    #[serde(skip)]
    pub headers: HeaderMap,
    #[serde(rename = "timeout_secs", deserialize_with = "opt_secs")]
    pub timeout: Option<Duration>,
    /// Raise the classified error for non-2xx responses.
    pub raise_on_non_2xx: bool,
    /// Retries allowed after a 429. Zero treats 429 like any other failure.
    pub max_retries: u32,
    pub backoff: BackoffConfig,
}

impl Default for AsyncClientConfig {
    fn default() -> Self {
        Self {
            headers: HeaderMap::new(),
            timeout: None,
            raise_on_non_2xx: true,
            max_retries: 0,
            backoff: BackoffConfig::default(),
        }
    }
}

impl AsyncClientConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.backoff.clone())
    }
}

fn duration_from_secs<E: serde::de::Error>(secs: f64) -> Result<Duration, E> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| E::custom(format!("invalid duration in seconds: {}", secs)))
}

pub(crate) fn secs<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    duration_from_secs(f64::deserialize(deserializer)?)
}

pub(crate) fn opt_secs<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Duration>, D::Error> {
    Option::<f64>::deserialize(deserializer)?
        .map(duration_from_secs)
        .transpose()
}
