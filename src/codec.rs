//! JSON codec for the typed object surface.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::CodecError;

/// Converts between domain types and JSON payloads.
///
/// Lists need no special casing: decode into `Vec<T>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Value, CodecError> {
        serde_json::to_value(value).map_err(CodecError::Encode)
    }

    /// Decodes a response body received from `url`.
    pub fn decode<T: DeserializeOwned>(url: &str, body: &str) -> Result<T, CodecError> {
        serde_json::from_str(body).map_err(|source| {
            log::error!("Failed to decode JSON response from {}: {}", url, source);
            CodecError::Decode {
                url: url.to_string(),
                source,
            }
        })
    }
}
