use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde_json::Value;
use std::fmt;

use crate::error::TransportError;

/// Status, headers and body text of one response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}

/// What a single attempt produced. Handed to hooks as-is.
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    Response(RawResponse),
    Failure(TransportError),
}

/// Response payload returned to callers.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Json(Value),
}

impl Payload {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            Payload::Json(_) => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Text(_) => None,
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Text(text) => f.write_str(text),
            Payload::Json(value) => write!(f, "{:#}", value),
        }
    }
}

/// Successful call result: status plus payload.
pub type CallResult = (StatusCode, Payload);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_accessors() {
        let text = Payload::Text("ok".to_string());
        assert_eq!(text.as_text(), Some("ok"));
        assert_eq!(text.as_json(), None);

        let value = Payload::Json(json!({"ok": true}));
        assert_eq!(value.as_json(), Some(&json!({"ok": true})));
        assert_eq!(value.as_text(), None);
    }

    #[test]
    fn test_payload_display() {
        assert_eq!(Payload::Text("raw".to_string()).to_string(), "raw");
        assert!(Payload::Json(json!({"a": 1})).to_string().contains("\"a\": 1"));
    }
}
