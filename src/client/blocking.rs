use log::{debug, error, info};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use super::lenient_payload;
use crate::backoff::{RetryDecision, RetryPolicy};
use crate::clock::{Clock, SystemClock};
use crate::codec::JsonCodec;
use crate::config::ClientConfig;
use crate::error::{HttpError, HttpErrorKind, Result, classify, error_for_status};
use crate::http::{Body, CallResult, RawResponse, RequestDescriptor, RequestOptions};
use crate::limiter::RateLimiter;
use crate::transport::SharedSession;

/// Blocking client with per-host rate limiting and 429 retries.
///
/// Each call waits for its host's token bucket, sends the request, and on a
/// 429 backs off and tries again, up to `max_retries` times. Every other
/// failure is returned on first occurrence. The client is `Send + Sync`;
/// share it across threads with an `Arc`.
pub struct RateLimitedClient {
    session: Arc<SharedSession>,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    timeout: Option<Duration>,
    raise_on_429: bool,
    clock: Arc<dyn Clock>,
    retries: AtomicU32,
}

impl RateLimitedClient {
    pub fn new(config: ClientConfig, session: Arc<SharedSession>) -> Self {
        Self::with_clock(config, session, Arc::new(SystemClock))
    }

    /// Builds a client whose limiter waits and backoff sleeps go through `clock`.
    pub fn with_clock(
        config: ClientConfig,
        session: Arc<SharedSession>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let limiter = RateLimiter::with_clock(
            config.requests_per_second,
            config.max_burst,
            Arc::clone(&clock),
        );
        Self {
            session,
            limiter: Arc::new(limiter),
            policy: config.retry_policy(),
            timeout: config.timeout,
            raise_on_429: config.raise_on_429,
            clock,
            retries: AtomicU32::new(0),
        }
    }

    /// Replaces the limiter, e.g. to share buckets between clients.
    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 429 responses seen since the last call that ended without one.
    pub fn retries(&self) -> u32 {
        self.retries.load(Ordering::SeqCst)
    }

    pub fn get(&self, url: &str, options: RequestOptions) -> Result<CallResult> {
        self.request(Method::GET, url, options)
    }

    pub fn post(&self, url: &str, options: RequestOptions) -> Result<CallResult> {
        self.request(Method::POST, url, options)
    }

    pub fn put(&self, url: &str, options: RequestOptions) -> Result<CallResult> {
        self.request(Method::PUT, url, options)
    }

    pub fn delete(&self, url: &str, options: RequestOptions) -> Result<CallResult> {
        self.request(Method::DELETE, url, options)
    }

    /// Sends `method url` through the limiter and retry loop.
    ///
    /// With `options.json`, only a 200 body is decoded; a body that is not
    /// valid JSON comes back as [`Payload::Text`](crate::http::Payload::Text).
    #[tracing::instrument(skip(self, options))]
    pub fn request(
        &self,
        method: Method,
        url: &str,
        options: RequestOptions,
    ) -> Result<CallResult> {
        let json = options.json;
        let request = RequestDescriptor::from_options(method, url, options, self.timeout);
        let response = self.send(&request)?;

        let decode = json && response.status == StatusCode::OK;
        let payload = lenient_payload(url, response.body, decode);
        Ok((response.status, payload))
    }

    /// GETs `url` and decodes the body into `T`. Use `Vec<U>` for lists.
    #[tracing::instrument(skip(self, options))]
    pub fn get_object<T: DeserializeOwned>(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<(StatusCode, T)> {
        let request = RequestDescriptor::from_options(Method::GET, url, options, self.timeout);
        let response = self.send(&request)?;
        error_for_status(response.status, url, &response.body)
            .map_err(|e| e.with_retries(self.policy.max_retries))?;

        let object = JsonCodec::decode(url, &response.body)?;
        Ok((response.status, object))
    }

    pub fn post_object<T: Serialize + ?Sized>(
        &self,
        url: &str,
        object: &T,
        options: RequestOptions,
    ) -> Result<CallResult> {
        self.send_object(Method::POST, url, object, options)
    }

    pub fn put_object<T: Serialize + ?Sized>(
        &self,
        url: &str,
        object: &T,
        options: RequestOptions,
    ) -> Result<CallResult> {
        self.send_object(Method::PUT, url, object, options)
    }

    pub fn delete_object<T: Serialize + ?Sized>(
        &self,
        url: &str,
        object: &T,
        options: RequestOptions,
    ) -> Result<CallResult> {
        self.send_object(Method::DELETE, url, object, options)
    }

    fn send_object<T: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        object: &T,
        mut options: RequestOptions,
    ) -> Result<CallResult> {
        options.body = Some(Body::Json(JsonCodec::encode(object)?));
        self.request(method, url, options)
    }

    /// Runs the limit/request/evaluate loop and returns the final response:
    /// a 2xx, or the last 429 when exhaustion is not raised.
    fn send(&self, request: &RequestDescriptor) -> Result<RawResponse> {
        let transport = self.session.get()?;
        let max_retries = self.policy.max_retries;
        let mut attempt = 0;

        loop {
            self.limiter.acquire_url(&request.url);
            let response = transport.execute(request)?;

            match self.policy.decide(classify(response.status), attempt, &response.headers)? {
                RetryDecision::Succeed => {
                    self.retries.store(0, Ordering::SeqCst);
                    return Ok(response);
                }
                RetryDecision::Retry(delay) => {
                    self.retries.fetch_add(1, Ordering::SeqCst);
                    info!(
                        "429 rate limited by {}. Retrying in {:?} (retry {}/{})",
                        request.url,
                        delay,
                        attempt + 1,
                        max_retries
                    );
                    if !delay.is_zero() {
                        self.clock.sleep(delay);
                    }
                    attempt += 1;
                }
                RetryDecision::Fail(HttpErrorKind::TooManyRequests) => {
                    self.retries.fetch_add(1, Ordering::SeqCst);
                    error!(
                        "429 rate limited by {}. Max retries ({}) reached",
                        request.url, max_retries
                    );
                    if self.raise_on_429 {
                        let err = HttpError::new(
                            HttpErrorKind::TooManyRequests,
                            response.status,
                            &request.url,
                            response.body,
                        );
                        return Err(err.with_retries(max_retries).into());
                    }
                    return Ok(response);
                }
                RetryDecision::Fail(kind) => {
                    self.retries.store(0, Ordering::SeqCst);
                    debug!("{} {} failed: {}", request.method, request.url, response.status);
                    let err = HttpError::new(kind, response.status, &request.url, response.body);
                    return Err(err.into());
                }
            }
        }
    }
}

impl std::fmt::Debug for RateLimitedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitedClient")
            .field("limiter", &self.limiter)
            .field("policy", &self.policy)
            .field("timeout", &self.timeout)
            .field("raise_on_429", &self.raise_on_429)
            .field("retries", &self.retries())
            .finish()
    }
}
