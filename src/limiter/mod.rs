//! Per-host token-bucket rate limiting.
//!
//! A [`RateLimiter`] keeps one [`TokenBucket`] per destination host. The
//! registry lock is only held to look up or insert a bucket; token math runs
//! under the bucket's own lock, so unrelated hosts never contend.

mod bucket;

use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::clock::{Clock, SystemClock};

pub use bucket::{Admission, TokenBucket};

/// Admission gate shared by every call going through one client.
pub struct RateLimiter {
    rate: f64,
    capacity: f64,
    clock: Arc<dyn Clock>,
    buckets: Mutex<HashMap<String, Arc<Mutex<TokenBucket>>>>,
}

impl RateLimiter {
    /// Creates a limiter admitting `rate` requests per second per host.
    /// Burst capacity defaults to `rate`.
    pub fn new(rate: f64, burst: Option<f64>) -> Self {
        Self::with_clock(rate, burst, Arc::new(SystemClock))
    }

    pub fn with_clock(rate: f64, burst: Option<f64>, clock: Arc<dyn Clock>) -> Self {
        Self {
            rate,
            capacity: burst.unwrap_or(rate),
            clock,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// A limiter with a non-positive rate admits everything immediately.
    pub fn is_enabled(&self) -> bool {
        self.rate > 0.0
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Returns the bucket for `host`, creating it on first use.
    fn bucket(&self, host: &str) -> Arc<Mutex<TokenBucket>> {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bucket) = buckets.get(host) {
            return Arc::clone(bucket);
        }
        debug!("Creating rate limit bucket for host {:?} ({} req/s)", host, self.rate);
        let bucket = Arc::new(Mutex::new(TokenBucket::new(
            self.rate,
            self.capacity,
            self.clock.now(),
        )));
        buckets.insert(host.to_string(), Arc::clone(&bucket));
        bucket
    }

    fn try_acquire(&self, bucket: &Mutex<TokenBucket>) -> Admission {
        let mut bucket = bucket.lock().unwrap_or_else(PoisonError::into_inner);
        bucket.try_acquire(self.clock.now())
    }

    /// Blocks the calling thread until `host` admits one more request.
    pub fn acquire(&self, host: &str) {
        if !self.is_enabled() {
            return;
        }
        let bucket = self.bucket(host);
        while let Admission::Wait(wait) = self.try_acquire(&bucket) {
            debug!("Rate limit reached for {:?}, waiting {:?}", host, wait);
            self.clock.sleep(wait);
        }
    }

    /// Suspends until `host` admits one more request.
    pub async fn acquire_async(&self, host: &str) {
        if !self.is_enabled() {
            return;
        }
        let bucket = self.bucket(host);
        while let Admission::Wait(wait) = self.try_acquire(&bucket) {
            debug!("Rate limit reached for {:?}, waiting {:?}", host, wait);
            tokio::time::sleep(wait).await;
        }
    }

    /// [`acquire`](Self::acquire) keyed by the host of `url`.
    pub fn acquire_url(&self, url: &str) {
        self.acquire(&host_of(url));
    }

    /// [`acquire_async`](Self::acquire_async) keyed by the host of `url`.
    pub async fn acquire_url_async(&self, url: &str) {
        self.acquire_async(&host_of(url)).await;
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Tokens currently left for `host`, without refilling.
    pub fn available_tokens(&self, host: &str) -> Option<f64> {
        let bucket = {
            let buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(buckets.get(host)?)
        };
        let bucket = bucket.lock().unwrap_or_else(PoisonError::into_inner);
        Some(bucket.tokens())
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("rate", &self.rate)
            .field("capacity", &self.capacity)
            .field("buckets", &self.bucket_count())
            .finish()
    }
}

/// Extracts the authority (host plus explicit port) used to key buckets.
/// Unparseable URLs share the empty-string bucket.
pub fn host_of(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => String::new(),
        },
        Err(_) => String::new(),
    }
}
