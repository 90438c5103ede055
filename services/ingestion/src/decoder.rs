//! Transport payload decoding: base64 → UTF-8 → JSON object.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::{Map, Value};
use std::string::FromUtf8Error;
use thiserror::Error;

/// A decoded event: the full JSON object exactly as the producer sent it
pub type EventDocument = Map<String, Value>;

/// Quarantine payload used when not even the base64 layer could be decoded
pub const PARSE_ERROR_SENTINEL: &str = "parse_error";

/// Errors raised while turning a transport message into an event document
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Invalid push envelope: {reason}")]
    Envelope { reason: String, body: String },

    #[error("Message data is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Message data is not valid UTF-8: {0}")]
    Utf8(#[from] FromUtf8Error),

    #[error("Message data is not valid JSON: {source}")]
    Json {
        #[source]
        source: serde_json::Error,
        raw: String,
    },

    #[error("Message data is a JSON {kind}, expected an object")]
    NotAnObject { kind: &'static str, raw: String },
}

impl DecodeError {
    /// Best-effort rendering of what the message carried, for quarantine
    pub fn original_payload(&self) -> Value {
        match self {
            DecodeError::Envelope { body, .. } => Value::String(body.clone()),
            DecodeError::Base64(_) => Value::String(PARSE_ERROR_SENTINEL.to_string()),
            DecodeError::Utf8(e) => {
                Value::String(String::from_utf8_lossy(e.as_bytes()).into_owned())
            }
            DecodeError::Json { raw, .. } | DecodeError::NotAnObject { raw, .. } => {
                Value::String(raw.clone())
            }
        }
    }
}

/// Decode base64 message data into an event document.
///
/// The returned map is the complete decoded object; nothing is dropped or
/// normalized here.
pub fn decode(data: &str) -> Result<EventDocument, DecodeError> {
    let bytes = STANDARD.decode(data.as_bytes())?;
    let text = String::from_utf8(bytes)?;

    let value: Value = match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(source) => return Err(DecodeError::Json { source, raw: text }),
    };

    match value {
        Value::Object(document) => Ok(document),
        other => Err(DecodeError::NotAnObject {
            kind: json_kind(&other),
            raw: text,
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
