use reqwest::header::HeaderMap;
use std::time::Duration;

use super::BackoffConfig;
use crate::error::{Classification, ConfigError, HttpErrorKind};

/// What to do after one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// 2xx: hand the response to the caller.
    Succeed,
    /// Sleep for the given delay, then attempt again.
    Retry(Duration),
    /// Stop and surface this kind.
    Fail(HttpErrorKind),
}

/// Retry budget plus backoff. Only 429 responses are ever retried.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: BackoffConfig,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: BackoffConfig) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Decides the next step for attempt `attempt` (0-based).
    ///
    /// Fails with a [`ConfigError`] only when a retry is due and the backoff
    /// strategy is unsupported.
    pub fn decide(
        &self,
        classification: Classification,
        attempt: u32,
        headers: &HeaderMap,
    ) -> Result<RetryDecision, ConfigError> {
        match classification {
            Classification::Success => Ok(RetryDecision::Succeed),
            Classification::Failure(HttpErrorKind::TooManyRequests)
                if attempt < self.max_retries =>
            {
                let delay = self.backoff.delay(attempt, headers)?;
                Ok(RetryDecision::Retry(delay))
            }
            Classification::Failure(kind) => Ok(RetryDecision::Fail(kind)),
        }
    }
}
