//! Error taxonomy for outbound HTTP calls.
//!
//! Every attempt ends in exactly one of three shapes: a 2xx response, a
//! response with a non-2xx status ([`HttpError`]), or no response at all
//! ([`TransportError`]). The two failure shapes together form
//! [`NetworkError`]; [`Error`] adds configuration and codec failures on top.

mod classify;

use reqwest::StatusCode;
use std::fmt;
use std::sync::Arc;

pub use classify::{Classification, classify, classify_transport, error_for_status, transport_error};

/// Semantic kind of a non-2xx HTTP response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpErrorKind {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    UnprocessableEntity,
    TooManyRequests,
    InternalServerError,
    BadGateway,
    ServiceUnavailable,
    GatewayTimeout,
    /// 3xx not otherwise named (only seen when redirects are not followed).
    Redirect,
    /// 4xx not otherwise named.
    ClientError,
    /// 5xx not otherwise named.
    ServerError,
    /// Non-2xx status outside the 3xx-5xx ranges.
    Other,
}

/// Family an [`HttpErrorKind`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpErrorFamily {
    Redirect,
    Client,
    Server,
    Other,
}

impl HttpErrorKind {
    pub fn family(self) -> HttpErrorFamily {
        match self {
            HttpErrorKind::Redirect => HttpErrorFamily::Redirect,
            HttpErrorKind::BadRequest
            | HttpErrorKind::Unauthorized
            | HttpErrorKind::Forbidden
            | HttpErrorKind::NotFound
            | HttpErrorKind::Conflict
            | HttpErrorKind::UnprocessableEntity
            | HttpErrorKind::TooManyRequests
            | HttpErrorKind::ClientError => HttpErrorFamily::Client,
            HttpErrorKind::InternalServerError
            | HttpErrorKind::BadGateway
            | HttpErrorKind::ServiceUnavailable
            | HttpErrorKind::GatewayTimeout
            | HttpErrorKind::ServerError => HttpErrorFamily::Server,
            HttpErrorKind::Other => HttpErrorFamily::Other,
        }
    }

    fn description(self) -> &'static str {
        match self {
            HttpErrorKind::BadRequest => "bad request",
            HttpErrorKind::Unauthorized => "unauthorized",
            HttpErrorKind::Forbidden => "forbidden",
            HttpErrorKind::NotFound => "not found",
            HttpErrorKind::Conflict => "conflict",
            HttpErrorKind::UnprocessableEntity => "unprocessable entity",
            HttpErrorKind::TooManyRequests => "too many requests",
            HttpErrorKind::InternalServerError => "internal server error",
            HttpErrorKind::BadGateway => "bad gateway",
            HttpErrorKind::ServiceUnavailable => "service unavailable",
            HttpErrorKind::GatewayTimeout => "gateway timeout",
            HttpErrorKind::Redirect => "redirect",
            HttpErrorKind::ClientError => "client error",
            HttpErrorKind::ServerError => "server error",
            HttpErrorKind::Other => "unexpected status",
        }
    }
}

impl fmt::Display for HttpErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A response was received but its status was not 2xx.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: HTTP {} for {url}", .status.as_u16())]
pub struct HttpError {
    pub kind: HttpErrorKind,
    pub status: StatusCode,
    pub url: String,
    /// Response body, kept for diagnostics.
    pub body: String,
    /// Retries performed before giving up. Only set for exhausted 429s.
    pub retries: Option<u32>,
}

impl HttpError {
    pub fn new(
        kind: HttpErrorKind,
        status: StatusCode,
        url: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            status,
            url: url.into(),
            body: body.into(),
            retries: None,
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }
}

/// Why no response was received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// The attempt exceeded its timeout.
    Timeout,
    /// Connect, DNS, TLS or protocol failure.
    Transport,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportErrorKind::Timeout => f.write_str("request timed out"),
            TransportErrorKind::Transport => f.write_str("network error"),
        }
    }
}

/// No HTTP response was received.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind} for {url}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub url: String,
    pub message: String,
    #[source]
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl TransportError {
    pub fn new(
        kind: TransportErrorKind,
        url: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            url: url.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn timeout(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, url, message)
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == TransportErrorKind::Timeout
    }
}

/// Root of every failure caused by the network exchange itself.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NetworkError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Http(#[from] HttpError),
}

/// Invalid client configuration, reported when it is first used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("unsupported backoff strategy: {0}")]
    UnsupportedStrategy(String),
    #[error("invalid header {name:?}: {reason}")]
    InvalidHeader { name: String, reason: String },
    #[error("failed to build HTTP session: {0}")]
    Session(String),
}

/// Converting between domain values and JSON payloads failed.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to decode JSON response from {url}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode request body")]
    Encode(#[source] serde_json::Error),
}

/// Error type returned by every client in this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<HttpError> for Error {
    fn from(error: HttpError) -> Self {
        Error::Network(NetworkError::Http(error))
    }
}

impl From<TransportError> for Error {
    fn from(error: TransportError) -> Self {
        Error::Network(NetworkError::Transport(error))
    }
}

impl Error {
    /// The HTTP error, if a non-2xx response caused this error.
    pub fn as_http(&self) -> Option<&HttpError> {
        match self {
            Error::Network(NetworkError::Http(e)) => Some(e),
            _ => None,
        }
    }

    /// The transport error, if no response was received.
    pub fn as_transport(&self) -> Option<&TransportError> {
        match self {
            Error::Network(NetworkError::Transport(e)) => Some(e),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.as_http().map(|e| e.status)
    }

    pub fn http_kind(&self) -> Option<HttpErrorKind> {
        self.as_http().map(|e| e.kind)
    }

    pub fn is_timeout(&self) -> bool {
        self.as_transport().is_some_and(TransportError::is_timeout)
    }
}
