use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use reqwest::header::HeaderMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use super::AsyncTransport;
use crate::error::{ConfigError, TransportError, TransportErrorKind, transport_error};
use crate::http::{Body, RawResponse, RequestDescriptor};

/// [`AsyncTransport`] backed by a pooled async reqwest client.
#[derive(Debug)]
pub struct ReqwestSession {
    client: Mutex<Option<Client>>,
}

impl ReqwestSession {
    /// Builds a session sending `headers` with every request.
    pub fn new(headers: HeaderMap, timeout: Option<Duration>) -> Result<Self, ConfigError> {
        let mut builder = Client::builder()
            .user_agent(concat!("paced/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| ConfigError::Session(e.to_string()))?;
        Ok(Self::from_client(client))
    }

    pub fn from_client(client: Client) -> Self {
        Self {
            client: Mutex::new(Some(client)),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.client.lock().unwrap_or_else(PoisonError::into_inner).is_none()
    }

    fn client(&self) -> Option<Client> {
        self.client.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl AsyncTransport for ReqwestSession {
    #[tracing::instrument(
        skip(self, request),
        fields(method = %request.method, url = %request.url)
    )]
    async fn execute(&self, request: &RequestDescriptor) -> Result<RawResponse, TransportError> {
        let client = self.client().ok_or_else(|| {
            TransportError::new(TransportErrorKind::Transport, &request.url, "session is closed")
        })?;

        debug!("{} {}", request.method, request.url);
        let mut builder = client
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone());
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        match &request.body {
            Some(Body::Raw(bytes)) => builder = builder.body(bytes.clone()),
            Some(Body::Json(value)) => builder = builder.json(value),
            None => {}
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(&request.url, e))?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(&request.url, e))?;
        debug!("{} {} -> {}", request.method, request.url, status);

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }

    async fn close(&self) {
        if self
            .client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
        {
            debug!("HTTP session closed");
        }
    }
}
