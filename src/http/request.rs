use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::time::Duration;

use crate::error::ConfigError;

/// Request body.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Raw(Vec<u8>),
    Json(Value),
}

/// Everything needed to issue one request. Identical across retries.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<Body>,
    pub timeout: Option<Duration>,
}

impl RequestDescriptor {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
        }
    }

    /// Builds a descriptor from call options, falling back to
    /// `default_timeout` when the options carry none.
    pub fn from_options(
        method: Method,
        url: impl Into<String>,
        options: RequestOptions,
        default_timeout: Option<Duration>,
    ) -> Self {
        Self {
            method,
            url: url.into(),
            query: options.query,
            headers: options.headers,
            body: options.body,
            timeout: options.timeout.or(default_timeout),
        }
    }
}

/// Per-call options accepted by every client's `get`/`post`/`put`/`delete`.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<Body>,
    pub timeout: Option<Duration>,
    /// Decode the response body as JSON.
    pub json: bool,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Adds a header given as strings, validating both parts.
    pub fn try_header(self, name: &str, value: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidHeader {
            name: name.to_string(),
            reason,
        };
        let header_name =
            HeaderName::from_bytes(name.trim().as_bytes()).map_err(|e| invalid(e.to_string()))?;
        let header_value = HeaderValue::from_str(value.trim()).map_err(|e| invalid(e.to_string()))?;
        Ok(self.header(header_name, header_value))
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(Body::Raw(body.into()));
        self
    }

    pub fn json_body(mut self, body: Value) -> Self {
        self.body = Some(Body::Json(body));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Requests JSON decoding of the response body.
    pub fn json(mut self) -> Self {
        self.json = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::ACCEPT;
    use serde_json::json;

    #[test]
    fn test_options_builder() {
        let options = RequestOptions::new()
            .query("page", "1")
            .query("per_page", "10")
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .json_body(json!({"id": 1}))
            .json();

        assert_eq!(
            options.query,
            vec![
                ("page".to_string(), "1".to_string()),
                ("per_page".to_string(), "10".to_string())
            ]
        );
        assert_eq!(options.headers[ACCEPT], "application/json");
        assert_eq!(options.body, Some(Body::Json(json!({"id": 1}))));
        assert!(options.json);
    }

    #[test]
    fn test_try_header_rejects_invalid_name() {
        let err = RequestOptions::new().try_header("bad header", "x").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidHeader { .. }));

        let options = RequestOptions::new().try_header("X-Trace", " abc ").unwrap();
        assert_eq!(options.headers["x-trace"], "abc");
    }

    #[test]
    fn test_descriptor_timeout_fallback() {
        let request = RequestDescriptor::from_options(
            Method::GET,
            "https://example.com",
            RequestOptions::new(),
            Some(Duration::from_secs(10)),
        );
        assert_eq!(request.timeout, Some(Duration::from_secs(10)));

        let request = RequestDescriptor::from_options(
            Method::GET,
            "https://example.com",
            RequestOptions::new().timeout(Duration::from_secs(1)),
            Some(Duration::from_secs(10)),
        );
        assert_eq!(request.timeout, Some(Duration::from_secs(1)));
    }
}
