use log::debug;
use reqwest::blocking::{Client, RequestBuilder};
use std::time::Duration;

use super::Transport;
use crate::error::{ConfigError, TransportError, transport_error};
use crate::http::{Body, RawResponse, RequestDescriptor};

/// [`Transport`] backed by a blocking reqwest client.
///
/// Must not be created or dropped from inside an async runtime.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, ConfigError> {
        Self::with_timeout(None)
    }

    /// Builds a transport whose requests time out after `timeout` unless the
    /// request carries its own.
    pub fn with_timeout(timeout: Option<Duration>) -> Result<Self, ConfigError> {
        let mut builder =
            Client::builder().user_agent(concat!("paced/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| ConfigError::Session(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    fn build(&self, request: &RequestDescriptor) -> RequestBuilder {
        let mut builder = self
            .client
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
        builder
    }
}

impl Transport for ReqwestTransport {
    #[tracing::instrument(
        skip(self, request),
        fields(method = %request.method, url = %request.url)
    )]
    fn execute(&self, request: &RequestDescriptor) -> Result<RawResponse, TransportError> {
        debug!("{} {}", request.method, request.url);
        let response = self
            .build(request)
            .send()
            .map_err(|e| transport_error(&request.url, e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().map_err(|e| transport_error(&request.url, e))?;
        debug!("{} {} -> {}", request.method, request.url, status);

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportErrorKind;
    use mockito::Matcher;
    use reqwest::header::{HeaderValue, RETRY_AFTER};
    use reqwest::{Method, StatusCode};
    use serde_json::json;

    #[test]
    fn test_execute_get_with_query_and_headers() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/items")
            .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
            .match_header("x-trace", "abc")
            .with_status(200)
            .with_body("hello")
            .create();

        let transport = ReqwestTransport::new().unwrap();
        let mut request = RequestDescriptor::new(Method::GET, format!("{}/items", server.url()));
        request.query.push(("page".into(), "2".into()));
        request
            .headers
            .insert("x-trace", HeaderValue::from_static("abc"));

        let response = transport.execute(&request).unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, "hello");
        mock.assert();
    }

    #[test]
    fn test_execute_returns_error_statuses_as_responses() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/limited")
            .with_status(429)
            .with_header("retry-after", "3")
            .with_body("slow down")
            .create();

        let transport = ReqwestTransport::new().unwrap();
        let request = RequestDescriptor::new(Method::GET, format!("{}/limited", server.url()));
        let response = transport.execute(&request).unwrap();

        assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers[RETRY_AFTER], "3");
        assert_eq!(response.body, "slow down");
    }

    #[test]
    fn test_execute_sends_json_body() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/items")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!({"name": "widget"})))
            .with_status(201)
            .create();

        let transport = ReqwestTransport::new().unwrap();
        let mut request = RequestDescriptor::new(Method::POST, format!("{}/items", server.url()));
        request.body = Some(Body::Json(json!({"name": "widget"})));

        let response = transport.execute(&request).unwrap();
        assert_eq!(response.status, StatusCode::CREATED);
        mock.assert();
    }

    #[test]
    fn test_execute_connection_refused_is_transport_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let transport = ReqwestTransport::new().unwrap();
        let request = RequestDescriptor::new(Method::GET, format!("http://127.0.0.1:{}/", port));

        let err = transport.execute(&request).unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Transport);
        assert!(err.url.contains(&port.to_string()));
    }
}
