//! Backoff delay computation and retry decisions.
//!
//! The delay before retry `n` (0-based) is, in priority order: the server's
//! `Retry-After` hint when respected and parseable, else the configured
//! strategy (`fixed` or `exponential`), optionally randomized by full jitter.

mod policy;
mod retry_after;

use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

pub use policy::{RetryDecision, RetryPolicy};
pub use retry_after::{parse_retry_after, retry_after};

/// How the delay grows between retries.
///
/// Strategy names are parsed without failing; an unknown name is kept as
/// `Unsupported` and rejected the first time a delay is computed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum BackoffStrategy {
    /// Same delay for every retry.
    #[default]
    Fixed,
    /// `base * 2^attempt`.
    Exponential,
    Unsupported(String),
}

impl From<&str> for BackoffStrategy {
    fn from(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "fixed" => BackoffStrategy::Fixed,
            "exponential" => BackoffStrategy::Exponential,
            _ => BackoffStrategy::Unsupported(name.to_string()),
        }
    }
}

impl From<String> for BackoffStrategy {
    fn from(name: String) -> Self {
        BackoffStrategy::from(name.as_str())
    }
}

impl FromStr for BackoffStrategy {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(BackoffStrategy::from(s))
    }
}

impl fmt::Display for BackoffStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackoffStrategy::Fixed => f.write_str("fixed"),
            BackoffStrategy::Exponential => f.write_str("exponential"),
            BackoffStrategy::Unsupported(name) => f.write_str(name),
        }
    }
}

/// Backoff settings, fixed for the lifetime of a client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub strategy: BackoffStrategy,
    #[serde(rename = "base_delay_secs", deserialize_with = "crate::config::secs")]
    pub base_delay: Duration,
    pub jitter: bool,
    /// Let a parseable `Retry-After` header override the strategy.
    pub respect_retry_after: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::Fixed,
            base_delay: Duration::from_secs(10),
            jitter: false,
            respect_retry_after: true,
        }
    }
}

impl BackoffConfig {
    pub fn fixed(base_delay: Duration) -> Self {
        Self {
            strategy: BackoffStrategy::Fixed,
            base_delay,
            ..Self::default()
        }
    }

    pub fn exponential(base_delay: Duration) -> Self {
        Self {
            strategy: BackoffStrategy::Exponential,
            base_delay,
            ..Self::default()
        }
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_respect_retry_after(mut self, respect: bool) -> Self {
        self.respect_retry_after = respect;
        self
    }

    /// Delay before retry `attempt` given the headers of the response that
    /// triggered it.
    pub fn delay(&self, attempt: u32, headers: &HeaderMap) -> Result<Duration, ConfigError> {
        self.delay_at(attempt, headers, Utc::now())
    }

    /// [`delay`](Self::delay) with an explicit current time for HTTP-date hints.
    pub fn delay_at(
        &self,
        attempt: u32,
        headers: &HeaderMap,
        now: DateTime<Utc>,
    ) -> Result<Duration, ConfigError> {
        if self.respect_retry_after {
            if let Some(hint) = retry_after(headers, now) {
                return Ok(hint);
            }
        }

        let delay = self.strategy_delay(attempt)?;
        if self.jitter {
            Ok(full_jitter(delay))
        } else {
            Ok(delay)
        }
    }

    /// Strategy delay alone, before jitter.
    pub fn strategy_delay(&self, attempt: u32) -> Result<Duration, ConfigError> {
        match &self.strategy {
            BackoffStrategy::Fixed => Ok(self.base_delay),
            BackoffStrategy::Exponential => Ok(2u32
                .checked_pow(attempt)
                .and_then(|factor| self.base_delay.checked_mul(factor))
                .unwrap_or(Duration::MAX)),
            BackoffStrategy::Unsupported(name) => {
                Err(ConfigError::UnsupportedStrategy(name.clone()))
            }
        }
    }
}

/// Uniformly random duration in `[0, delay]`.
fn full_jitter(delay: Duration) -> Duration {
    if delay.is_zero() {
        return delay;
    }
    let secs = rand::thread_rng().gen_range(0.0..=delay.as_secs_f64());
    Duration::try_from_secs_f64(secs).map_or(delay, |d| d.min(delay))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, RETRY_AFTER};

    fn no_headers() -> HeaderMap {
        HeaderMap::new()
    }

    #[test]
    fn test_strategy_from_name() {
        assert_eq!(BackoffStrategy::from("fixed"), BackoffStrategy::Fixed);
        assert_eq!(BackoffStrategy::from(" Exponential "), BackoffStrategy::Exponential);
        assert_eq!(
            "linear".parse::<BackoffStrategy>().unwrap(),
            BackoffStrategy::Unsupported("linear".to_string())
        );
        assert_eq!(BackoffStrategy::Exponential.to_string(), "exponential");
    }

    #[test]
    fn test_fixed_delay_is_constant() {
        let config = BackoffConfig::fixed(Duration::from_secs(5));
        for attempt in 0..5 {
            assert_eq!(config.delay(attempt, &no_headers()).unwrap(), Duration::from_secs(5));
        }
    }

    #[test]
    fn test_exponential_delay_doubles() {
        let config = BackoffConfig::exponential(Duration::from_secs(2));
        let delays: Vec<_> = (0..4)
            .map(|attempt| config.delay(attempt, &no_headers()).unwrap())
            .collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
                Duration::from_secs(16),
            ]
        );
    }

    #[test]
    fn test_exponential_saturates() {
        let config = BackoffConfig::exponential(Duration::from_secs(2));
        assert_eq!(config.strategy_delay(200).unwrap(), Duration::MAX);
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let config = BackoffConfig::exponential(Duration::from_secs(2)).with_jitter(true);
        for attempt in 0..6 {
            let ceiling = config.strategy_delay(attempt).unwrap();
            for _ in 0..50 {
                let delay = config.delay(attempt, &no_headers()).unwrap();
                assert!(delay <= ceiling, "{:?} > {:?}", delay, ceiling);
            }
        }
    }

    #[test]
    fn test_retry_after_overrides_strategy() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));

        let config = BackoffConfig::exponential(Duration::from_secs(2)).with_jitter(true);
        assert_eq!(config.delay(3, &headers).unwrap(), Duration::from_secs(7));
    }

    #[test]
    fn test_retry_after_ignored_when_not_respected() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));

        let config = BackoffConfig::fixed(Duration::from_secs(1)).with_respect_retry_after(false);
        assert_eq!(config.delay(0, &headers).unwrap(), Duration::from_secs(1));
    }

    #[test]
    fn test_unparseable_retry_after_falls_back() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("later"));

        let config = BackoffConfig::fixed(Duration::from_secs(3));
        assert_eq!(config.delay(0, &headers).unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn test_unsupported_strategy_fails_on_first_delay() {
        let config = BackoffConfig {
            strategy: BackoffStrategy::from("linear"),
            ..BackoffConfig::default()
        };
        let err = config.delay(0, &no_headers()).unwrap_err();
        assert_eq!(err, ConfigError::UnsupportedStrategy("linear".to_string()));
    }

    #[test]
    fn test_deserialize_config() {
        let config: BackoffConfig = serde_json::from_str(
            r#"{"strategy": "exponential", "base_delay_secs": 0.5, "jitter": true}"#,
        )
        .unwrap();
        assert_eq!(config.strategy, BackoffStrategy::Exponential);
        assert_eq!(config.base_delay, Duration::from_millis(500));
        assert!(config.jitter);
        assert!(config.respect_retry_after);
    }
}
