//! Push-delivery envelope and the per-invocation raw message.
//!
//! Every transport hands the router the same shape:
//!
//! ```json
//! {"message": {"data": "<base64 UTF-8 JSON>", "messageId": "...", "attributes": {}}}
//! ```

use crate::decoder::DecodeError;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Push envelope as delivered over HTTP or carried in a Kafka record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushEnvelope {
    pub message: PushMessage,
    /// Subscription the message was delivered through
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<String>,
}

/// Message body inside a push envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    /// Base64-encoded payload
    pub data: String,
    /// Transport-assigned message ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Publish time as reported by the transport
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_time: Option<String>,
    /// Message attributes
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, String>,
}

impl PushEnvelope {
    /// Wrap a serializable event into an envelope, base64-encoding its JSON
    pub fn wrap<T: Serialize + ?Sized>(
        event: &T,
        message_id: Option<String>,
    ) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_vec(event)?;
        Ok(Self::from_bytes(&json, message_id))
    }

    /// Wrap arbitrary payload bytes, valid JSON or not
    pub fn from_bytes(payload: &[u8], message_id: Option<String>) -> Self {
        Self {
            message: PushMessage {
                data: STANDARD.encode(payload),
                message_id,
                publish_time: None,
                attributes: HashMap::new(),
            },
            subscription: None,
        }
    }
}

/// Arrival metadata for one message
#[derive(Debug, Clone, Default)]
pub struct MessageMetadata {
    /// Transport-assigned message ID
    pub message_id: Option<String>,
    /// Publish time as reported by the transport
    pub publish_time: Option<String>,
    /// Message attributes
    pub attributes: HashMap<String, String>,
    /// Where the message came from (`http`, `kafka:<topic>/<partition>/<offset>`)
    pub source: String,
}

/// One message awaiting routing. Lives for a single invocation.
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Base64 text of the payload
    pub data: String,
    pub metadata: MessageMetadata,
}

impl RawMessage {
    pub fn new(data: impl Into<String>, metadata: MessageMetadata) -> Self {
        Self {
            data: data.into(),
            metadata,
        }
    }

    /// Parse a push envelope body
    pub fn from_envelope_slice(body: &[u8], source: &str) -> Result<Self, DecodeError> {
        let envelope: PushEnvelope =
            serde_json::from_slice(body).map_err(|e| DecodeError::Envelope {
                reason: e.to_string(),
                body: String::from_utf8_lossy(body).into_owned(),
            })?;

        Ok(Self::from_envelope(envelope, source))
    }

    pub fn from_envelope(envelope: PushEnvelope, source: &str) -> Self {
        let PushMessage {
            data,
            message_id,
            publish_time,
            attributes,
        } = envelope.message;

        Self {
            data,
            metadata: MessageMetadata {
                message_id,
                publish_time,
                attributes,
                source: source.to_string(),
            },
        }
    }
}
