use crate::decoder::EventDocument;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use serde_json::Value;
use thiserror::Error;

/// Naive date-time layouts accepted when the string carries no offset
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Offset-carrying layouts not covered by RFC 3339
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%:z"];

/// Reasons a `timestamp` value cannot be used
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimestampError {
    #[error("expected an ISO-8601 string, got {0}")]
    WrongType(&'static str),

    #[error("'{0}' is not an ISO-8601 date or date-time")]
    Unparseable(String),
}

/// An absolute point in time together with the offset the producer encoded.
///
/// Strings without an offset are taken as UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventTimestamp(DateTime<FixedOffset>);

impl EventTimestamp {
    /// Parse a JSON `timestamp` value. Only ISO-8601 strings are accepted;
    /// epoch numbers are rejected rather than guessed at.
    pub fn from_json(value: &Value) -> Result<Self, TimestampError> {
        match value {
            Value::String(s) => Self::parse_iso8601(s),
            Value::Number(_) => Err(TimestampError::WrongType("a number")),
            Value::Bool(_) => Err(TimestampError::WrongType("a boolean")),
            Value::Array(_) => Err(TimestampError::WrongType("an array")),
            Value::Object(_) => Err(TimestampError::WrongType("an object")),
            Value::Null => Err(TimestampError::WrongType("null")),
        }
    }

    /// Parse an ISO-8601 date or date-time string
    pub fn parse_iso8601(s: &str) -> Result<Self, TimestampError> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(Self(dt));
        }

        for format in OFFSET_FORMATS {
            if let Ok(dt) = DateTime::parse_from_str(s, format) {
                return Ok(Self(dt));
            }
        }

        for format in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                return Ok(Self(naive.and_utc().fixed_offset()));
            }
        }

        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
                return Ok(Self(midnight.and_utc().fixed_offset()));
            }
        }

        Err(TimestampError::Unparseable(s.to_string()))
    }

    /// Calendar date in the producer's own offset
    pub fn date(&self) -> NaiveDate {
        self.0.date_naive()
    }

    pub fn as_datetime(&self) -> &DateTime<FixedOffset> {
        &self.0
    }
}

/// A validated clickstream event.
///
/// The required fields are typed; everything else the producer sent (product,
/// session, ad attributes, fields added later) stays in the verbatim document,
/// which is what gets persisted.
#[derive(Debug, Clone)]
pub struct Event {
    pub event_id: String,
    pub event_type: String,
    pub timestamp: EventTimestamp,
    document: EventDocument,
}

/// Required fields extracted by the validator
#[derive(Debug, Clone, PartialEq)]
pub struct RequiredFields {
    pub event_id: String,
    pub event_type: String,
    pub timestamp: EventTimestamp,
}

impl Event {
    pub fn new(fields: RequiredFields, document: EventDocument) -> Self {
        Self {
            event_id: fields.event_id,
            event_type: fields.event_type,
            timestamp: fields.timestamp,
            document,
        }
    }

    /// The event exactly as decoded
    pub fn document(&self) -> &EventDocument {
        &self.document
    }

    pub fn into_document(self) -> EventDocument {
        self.document
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_naive_iso_is_utc() {
        let ts = EventTimestamp::parse_iso8601("2026-01-19T12:00:00").unwrap();
        assert_eq!(ts.date(), date(2026, 1, 19));
        assert_eq!(ts.as_datetime().offset().local_minus_utc(), 0);
    }

    #[test]
    fn test_python_isoformat_with_micros() {
        let ts = EventTimestamp::parse_iso8601("2026-01-19T23:59:59.123456").unwrap();
        assert_eq!(ts.date(), date(2026, 1, 19));

        let spaced = EventTimestamp::parse_iso8601("2026-01-19 08:15:00").unwrap();
        assert_eq!(spaced.date(), date(2026, 1, 19));
    }

    #[test]
    fn test_encoded_offset_is_honored() {
        // 23:30 on the 19th in UTC-05:00 is already the 20th in UTC
        let ts = EventTimestamp::parse_iso8601("2026-01-19T23:30:00-05:00").unwrap();
        assert_eq!(ts.date(), date(2026, 1, 19));

        let zulu = EventTimestamp::parse_iso8601("2026-01-20T04:30:00Z").unwrap();
        assert_eq!(zulu.date(), date(2026, 1, 20));
        assert_eq!(ts.as_datetime(), zulu.as_datetime());
    }

    #[test]
    fn test_bare_date() {
        let ts = EventTimestamp::parse_iso8601("2026-02-28").unwrap();
        assert_eq!(ts.date(), date(2026, 2, 28));
    }

    #[test]
    fn test_rejected_values() {
        assert!(matches!(
            EventTimestamp::from_json(&json!("1768824000")),
            Err(TimestampError::Unparseable(_))
        ));
        assert!(matches!(
            EventTimestamp::from_json(&json!("yesterday")),
            Err(TimestampError::Unparseable(_))
        ));
        assert!(matches!(
            EventTimestamp::from_json(&json!(true)),
            Err(TimestampError::WrongType(_))
        ));
        assert!(matches!(
            EventTimestamp::from_json(&json!(1768824000)),
            Err(TimestampError::WrongType("a number"))
        ));
        assert!(EventTimestamp::parse_iso8601("2026-02-30").is_err());
    }
}
