//! Wire encoding of message bodies.
//!
//! The body on the wire is a JSON string literal whose contents are the JSON
//! text of the payload object, i.e. the payload is JSON-encoded twice:
//!
//! ```text
//! payload   {"username":"alice"}
//! on wire   "{\"username\":\"alice\"}"
//! ```
//!
//! The emitting application stores the body as JSON text and serializes that
//! text again when publishing, so consumers peel two layers. Both sides of
//! the contract live here so they cannot drift apart.

use serde_json::{Map, Value};

/// Errors that can occur while decoding a payload.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("Body is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Payload is not a JSON object")]
    NotAnObject,

    #[error("Payload is missing natural key '{0}'")]
    MissingNaturalKey(String),

    #[error("Field '{field}' has an unsupported value: {value}")]
    InvalidField { field: String, value: String },
}

/// Encode stored JSON text into a wire body.
pub fn encode_body(message_body: &str) -> Result<Vec<u8>, PayloadError> {
    Ok(serde_json::to_vec(message_body)?)
}

/// Decode a wire body into the payload object.
pub fn decode_body(body: &[u8]) -> Result<Map<String, Value>, PayloadError> {
    let outer = std::str::from_utf8(body)?;
    let inner: String = serde_json::from_str(outer)?;
    match serde_json::from_str::<Value>(&inner)? {
        Value::Object(map) => Ok(map),
        _ => Err(PayloadError::NotAnObject),
    }
}
