//! HTTP clients.
//!
//! - [`BasicClient`]: one attempt per call, no limiting.
//! - [`RateLimitedClient`]: blocking, per-host rate limited, retries 429.
//! - [`AsyncClient`]: cooperative client with hooks and a scoped session.

mod basic;
mod blocking;
mod cooperative;
mod hooks;

use crate::codec::JsonCodec;
use crate::error::CodecError;
use crate::http::Payload;

pub use basic::BasicClient;
pub use blocking::RateLimitedClient;
pub use cooperative::{AsyncClient, SessionFactory};
pub use hooks::{FnHook, Hook, hook_fn};

/// Body as payload; a JSON decode failure is an error.
fn strict_payload(url: &str, body: String, json: bool) -> Result<Payload, CodecError> {
    if json {
        JsonCodec::decode(url, &body).map(Payload::Json)
    } else {
        Ok(Payload::Text(body))
    }
}

/// Body as payload; a JSON decode failure falls back to the raw text.
fn lenient_payload(url: &str, body: String, json: bool) -> Payload {
    if !json {
        return Payload::Text(body);
    }
    match serde_json::from_str(&body) {
        Ok(value) => Payload::Json(value),
        Err(e) => {
            log::debug!("Response from {} is not JSON ({}), returning text", url, e);
            Payload::Text(body)
        }
    }
}
