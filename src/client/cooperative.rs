use futures_util::future::BoxFuture;
use log::{debug, error, info, warn};
use reqwest::Method;
use reqwest::header::HeaderMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::hooks::Hook;
use super::lenient_payload;
use crate::backoff::{RetryDecision, RetryPolicy};
use crate::config::AsyncClientConfig;
use crate::error::{ConfigError, HttpError, HttpErrorKind, Result, TransportError, classify};
use crate::http::{AttemptOutcome, CallResult, RawResponse, RequestDescriptor, RequestOptions};
use crate::limiter::RateLimiter;
use crate::transport::{AsyncTransport, ReqwestSession};

/// Creates the session an [`AsyncClient`] owns.
pub type SessionFactory =
    Box<dyn Fn(&AsyncClientConfig) -> Result<Arc<dyn AsyncTransport>, ConfigError> + Send + Sync>;

#[derive(Default)]
struct SessionSlot {
    transport: Option<Arc<dyn AsyncTransport>>,
    owned: bool,
}

/// Cooperative HTTP client with result hooks and a scoped session.
///
/// A session supplied through [`with_session`](Self::with_session) is never
/// closed by the client. Otherwise one is created on [`enter`](Self::enter)
/// or on the first request, and released by [`close`](Self::close).
pub struct AsyncClient {
    config: AsyncClientConfig,
    policy: RetryPolicy,
    limiter: Option<Arc<RateLimiter>>,
    on_success: Option<Box<dyn Hook>>,
    on_failure: Option<Box<dyn Hook>>,
    on_exception: Option<Box<dyn Hook>>,
    session: Mutex<SessionSlot>,
    factory: SessionFactory,
}

impl AsyncClient {
    pub fn new(config: AsyncClientConfig) -> Self {
        Self::with_session_factory(
            config,
            Box::new(|config: &AsyncClientConfig| {
                let session = ReqwestSession::new(config.headers.clone(), config.timeout)?;
                Ok(Arc::new(session) as Arc<dyn AsyncTransport>)
            }),
        )
    }

    /// Uses a caller-owned session. [`close`](Self::close) leaves it open.
    pub fn with_session(config: AsyncClientConfig, transport: Arc<dyn AsyncTransport>) -> Self {
        let client = Self::new(config);
        *client.slot() = SessionSlot {
            transport: Some(transport),
            owned: false,
        };
        client
    }

    pub fn with_session_factory(config: AsyncClientConfig, factory: SessionFactory) -> Self {
        Self {
            policy: config.retry_policy(),
            config,
            limiter: None,
            on_success: None,
            on_failure: None,
            on_exception: None,
            session: Mutex::new(SessionSlot::default()),
            factory,
        }
    }

    /// Paces every attempt through `limiter`.
    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Called for 2xx responses, and for non-2xx ones when raising is off.
    pub fn on_success(&mut self, hook: impl Hook + 'static) -> &mut Self {
        self.on_success = Some(Box::new(hook));
        self
    }

    /// Called for non-2xx responses, before the error is raised.
    pub fn on_failure(&mut self, hook: impl Hook + 'static) -> &mut Self {
        self.on_failure = Some(Box::new(hook));
        self
    }

    /// Called when no response was received. Never sees HTTP errors.
    pub fn on_exception(&mut self, hook: impl Hook + 'static) -> &mut Self {
        self.on_exception = Some(Box::new(hook));
        self
    }

    /// Replaces the headers sent with every request.
    pub fn set_headers(&mut self, headers: HeaderMap) {
        self.config.headers = headers;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.config.headers
    }

    pub fn config(&self) -> &AsyncClientConfig {
        &self.config
    }

    pub fn has_session(&self) -> bool {
        self.slot().transport.is_some()
    }

    pub fn owns_session(&self) -> bool {
        self.slot().owned
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, SessionSlot> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the current session, creating an owned one if there is none.
    fn session(&self) -> Result<Arc<dyn AsyncTransport>, ConfigError> {
        let mut slot = self.slot();
        if let Some(transport) = &slot.transport {
            return Ok(Arc::clone(transport));
        }
        debug!("Creating HTTP session");
        let transport = (self.factory)(&self.config)?;
        slot.transport = Some(Arc::clone(&transport));
        slot.owned = true;
        Ok(transport)
    }

    /// Opens the session ahead of the first request.
    pub fn enter(&self) -> Result<()> {
        self.session()?;
        Ok(())
    }

    /// Releases the session if this client created it.
    pub async fn close(&self) {
        let transport = {
            let mut slot = self.slot();
            if !slot.owned {
                return;
            }
            slot.owned = false;
            slot.transport.take()
        };
        if let Some(transport) = transport {
            transport.close().await;
        }
    }

    /// Runs `f` between [`enter`](Self::enter) and [`close`](Self::close).
    /// The session is closed whether `f` succeeds or fails.
    ///
    /// ```no_run
    /// # async fn demo() -> paced::error::Result<()> {
    /// use paced::client::AsyncClient;
    /// use paced::config::AsyncClientConfig;
    /// use paced::http::RequestOptions;
    ///
    /// let client = AsyncClient::new(AsyncClientConfig::default());
    /// let (status, _) = client
    ///     .scoped(|c| Box::pin(c.get("https://example.com", RequestOptions::new())))
    ///     .await?;
    /// assert!(status.is_success());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn scoped<T, F>(&self, f: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a AsyncClient) -> BoxFuture<'a, Result<T>>,
    {
        self.enter()?;
        let result = f(self).await;
        self.close().await;
        result
    }

    pub async fn get(&self, url: &str, options: RequestOptions) -> Result<CallResult> {
        self.request(Method::GET, url, options).await
    }

    pub async fn post(&self, url: &str, options: RequestOptions) -> Result<CallResult> {
        self.request(Method::POST, url, options).await
    }

    pub async fn put(&self, url: &str, options: RequestOptions) -> Result<CallResult> {
        self.request(Method::PUT, url, options).await
    }

    pub async fn delete(&self, url: &str, options: RequestOptions) -> Result<CallResult> {
        self.request(Method::DELETE, url, options).await
    }

    /// Sends `method url`, retrying 429s within the configured budget.
    ///
    /// With `options.json`, a body that is not valid JSON is returned as text.
    #[tracing::instrument(skip(self, options))]
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        options: RequestOptions,
    ) -> Result<CallResult> {
        let json = options.json;
        let mut request =
            RequestDescriptor::from_options(method, url, options, self.config.timeout);
        let mut headers = self.config.headers.clone();
        headers.extend(std::mem::take(&mut request.headers));
        request.headers = headers;

        let transport = self.session()?;
        let mut attempt = 0;

        loop {
            if let Some(limiter) = &self.limiter {
                limiter.acquire_url_async(&request.url).await;
            }

            let response = match transport.execute(&request).await {
                Ok(response) => response,
                Err(err) => return self.handle_exception(err).await,
            };

            match self.policy.decide(classify(response.status), attempt, &response.headers)? {
                RetryDecision::Succeed => {
                    return Ok(self.finish(&request.url, response, json).await);
                }
                RetryDecision::Retry(delay) => {
                    info!(
                        "429 rate limited by {}. Retrying in {:?} (retry {}/{})",
                        request.url,
                        delay,
                        attempt + 1,
                        self.policy.max_retries
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                RetryDecision::Fail(kind) => {
                    return self.handle_failure(kind, &request.url, response, json).await;
                }
            }
        }
    }

    async fn handle_exception(&self, err: TransportError) -> Result<CallResult> {
        if let Some(hook) = &self.on_exception {
            if let Some(result) = hook.handle(&AttemptOutcome::Failure(err.clone())).await {
                debug!("Exception hook handled {}", err);
                return Ok(result);
            }
        }
        error!("{}", err);
        Err(err.into())
    }

    async fn handle_failure(
        &self,
        kind: HttpErrorKind,
        url: &str,
        response: RawResponse,
        json: bool,
    ) -> Result<CallResult> {
        if let Some(hook) = &self.on_failure {
            if let Some(result) = hook.handle(&AttemptOutcome::Response(response.clone())).await {
                return Ok(result);
            }
        }

        if !self.config.raise_on_non_2xx {
            warn!("{} returned {}", url, response.status);
            return Ok(self.finish(url, response, json).await);
        }

        let mut err = HttpError::new(kind, response.status, url, response.body);
        if kind == HttpErrorKind::TooManyRequests && self.policy.max_retries > 0 {
            error!(
                "429 rate limited by {}. Max retries ({}) reached",
                url, self.policy.max_retries
            );
            err = err.with_retries(self.policy.max_retries);
        }
        Err(err.into())
    }

    async fn finish(&self, url: &str, response: RawResponse, json: bool) -> CallResult {
        if let Some(hook) = &self.on_success {
            if let Some(result) = hook.handle(&AttemptOutcome::Response(response.clone())).await {
                return result;
            }
        }
        let status = response.status;
        (status, lenient_payload(url, response.body, json))
    }
}

impl std::fmt::Debug for AsyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncClient")
            .field("config", &self.config)
            .field("limiter", &self.limiter)
            .field("has_session", &self.has_session())
            .field("owns_session", &self.owns_session())
            .finish()
    }
}
