//! Status code and transport failure classification.

use reqwest::StatusCode;
use std::sync::Arc;

use super::{HttpError, HttpErrorKind, TransportError, TransportErrorKind};

/// Result of classifying a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Success,
    Failure(HttpErrorKind),
}

/// Maps an HTTP status code to its semantic kind.
pub fn classify(status: StatusCode) -> Classification {
    let kind = match status {
        s if s.is_success() => return Classification::Success,
        StatusCode::BAD_REQUEST => HttpErrorKind::BadRequest,
        StatusCode::UNAUTHORIZED => HttpErrorKind::Unauthorized,
        StatusCode::FORBIDDEN => HttpErrorKind::Forbidden,
        StatusCode::NOT_FOUND => HttpErrorKind::NotFound,
        StatusCode::CONFLICT => HttpErrorKind::Conflict,
        StatusCode::UNPROCESSABLE_ENTITY => HttpErrorKind::UnprocessableEntity,
        StatusCode::TOO_MANY_REQUESTS => HttpErrorKind::TooManyRequests,
        StatusCode::INTERNAL_SERVER_ERROR => HttpErrorKind::InternalServerError,
        StatusCode::BAD_GATEWAY => HttpErrorKind::BadGateway,
        StatusCode::SERVICE_UNAVAILABLE => HttpErrorKind::ServiceUnavailable,
        StatusCode::GATEWAY_TIMEOUT => HttpErrorKind::GatewayTimeout,
        s if s.is_redirection() => HttpErrorKind::Redirect,
        s if s.is_client_error() => HttpErrorKind::ClientError,
        s if s.is_server_error() => HttpErrorKind::ServerError,
        _ => HttpErrorKind::Other,
    };
    Classification::Failure(kind)
}

/// Returns the classified error for a non-2xx status, `Ok(())` otherwise.
pub fn error_for_status(status: StatusCode, url: &str, body: &str) -> Result<(), HttpError> {
    match classify(status) {
        Classification::Success => Ok(()),
        Classification::Failure(kind) => Err(HttpError::new(kind, status, url, body)),
    }
}

/// Classifies a reqwest failure that produced no usable response.
pub fn classify_transport(error: &reqwest::Error) -> TransportErrorKind {
    if error.is_timeout() {
        TransportErrorKind::Timeout
    } else {
        TransportErrorKind::Transport
    }
}

/// Wraps a reqwest failure into a [`TransportError`], keeping it as the source.
pub fn transport_error(url: &str, error: reqwest::Error) -> TransportError {
    let kind = classify_transport(&error);
    TransportError {
        kind,
        url: url.to_string(),
        message: error.to_string(),
        source: Some(Arc::new(error)),
    }
}
