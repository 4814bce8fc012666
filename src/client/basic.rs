use reqwest::Method;
use std::sync::Arc;
use std::time::Duration;

use super::strict_payload;
use crate::error::{Result, error_for_status};
use crate::http::{CallResult, RequestDescriptor, RequestOptions};
use crate::transport::SharedSession;

/// Blocking client making exactly one attempt per call.
///
/// No rate limiting and no retries: every non-2xx status is raised as its
/// classified error.
#[derive(Debug, Clone)]
pub struct BasicClient {
    session: Arc<SharedSession>,
    timeout: Option<Duration>,
}

impl BasicClient {
    pub fn new(session: Arc<SharedSession>) -> Self {
        Self {
            session,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
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

    #[tracing::instrument(skip(self, options))]
    pub fn request(
        &self,
        method: Method,
        url: &str,
        options: RequestOptions,
    ) -> Result<CallResult> {
        let json = options.json;
        let request = RequestDescriptor::from_options(method, url, options, self.timeout);
        let transport = self.session.get()?;

        let response = transport.execute(&request)?;
        error_for_status(response.status, url, &response.body)?;

        let payload = strict_payload(url, response.body, json)?;
        Ok((response.status, payload))
    }
}
