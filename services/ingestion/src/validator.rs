//! Required-field checks for decoded events
//!
//! Rules, in evaluation order:
//!
//! - `timestamp`: present, non-empty, ISO-8601 string
//! - `event_type`: non-empty string
//! - `event_id`: non-empty string
//! - `event_type` known to the destination registry, when one is configured
//!
//! Timestamp comes first so an event missing several fields is always
//! reported by its timestamp, the field partitioning depends on.

use crate::decoder::EventDocument;
use crate::event::{EventTimestamp, RequiredFields};
use serde_json::Value;
use std::collections::BTreeSet;
use thiserror::Error;

/// A required field is missing or malformed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing '{0}' field")]
    MissingField(&'static str),

    #[error("Invalid '{field}' field: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// The event is well formed but no destination is registered for its type
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Unknown or missing event_type: {event_type}")]
pub struct UnknownDestinationError {
    pub event_type: String,
}

/// Why an event document was rejected
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    UnknownDestination(#[from] UnknownDestinationError),
}

/// Validates event documents against the required-field policy
#[derive(Debug, Clone, Default)]
pub struct Validator {
    /// Registered event types; `None` accepts any non-empty type
    known_event_types: Option<BTreeSet<String>>,
}

impl Validator {
    /// Validator without a destination registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Validator that also rejects event types outside `known`
    pub fn with_known_event_types<I, S>(known: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known_event_types: Some(known.into_iter().map(Into::into).collect()),
        }
    }

    /// Check a document and extract its required fields. Never mutates it.
    pub fn validate(&self, document: &EventDocument) -> Result<RequiredFields, Rejection> {
        let timestamp = required_timestamp(document)?;
        let event_type = required_string(document, "event_type")?;
        let event_id = required_string(document, "event_id")?;

        if let Some(known) = &self.known_event_types {
            if !known.contains(&event_type) {
                return Err(UnknownDestinationError { event_type }.into());
            }
        }

        Ok(RequiredFields {
            event_id,
            event_type,
            timestamp,
        })
    }
}

fn required_timestamp(document: &EventDocument) -> Result<EventTimestamp, ValidationError> {
    match document.get("timestamp") {
        None | Some(Value::Null) => Err(ValidationError::MissingField("timestamp")),
        Some(Value::String(s)) if s.trim().is_empty() => {
            Err(ValidationError::MissingField("timestamp"))
        }
        Some(value) => {
            EventTimestamp::from_json(value).map_err(|e| ValidationError::InvalidField {
                field: "timestamp",
                reason: e.to_string(),
            })
        }
    }
}

fn required_string(
    document: &EventDocument,
    field: &'static str,
) -> Result<String, ValidationError> {
    match document.get(field) {
        None | Some(Value::Null) => Err(ValidationError::MissingField(field)),
        Some(Value::String(s)) if s.trim().is_empty() => Err(ValidationError::MissingField(field)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(ValidationError::InvalidField {
            field,
            reason: "must be a string".to_string(),
        }),
    }
}
