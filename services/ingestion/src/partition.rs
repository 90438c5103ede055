use crate::event::Event;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Top-level prefix for quarantined objects
pub const QUARANTINE_PREFIX: &str = "failed";

/// How primary keys are laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionLayout {
    /// `year=YYYY/month=MM/day=DD`
    DateOnly,
    /// `event_type=<type>/year=YYYY/month=MM/day=DD`
    EventTypeThenDate,
}

/// Hive-style partition key.
///
/// Built only from event data for primary writes, so re-ingesting an event
/// lands on the same key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionKey {
    event_type: Option<String>,
    date: NaiveDate,
}

impl PartitionKey {
    /// Key for a validated event, from its own timestamp
    pub fn for_event(event: &Event, layout: PartitionLayout) -> Self {
        let event_type = match layout {
            PartitionLayout::DateOnly => None,
            PartitionLayout::EventTypeThenDate => Some(encode_path_component(&event.event_type)),
        };

        Self {
            event_type,
            date: event.timestamp.date(),
        }
    }

    /// Key for a quarantine write, from processing time
    pub fn for_processing_time(now: DateTime<Utc>) -> Self {
        Self {
            event_type: None,
            date: now.date_naive(),
        }
    }

    pub fn event_type(&self) -> Option<&str> {
        self.event_type.as_deref()
    }

    pub fn year(&self) -> i32 {
        self.date.year()
    }

    pub fn month(&self) -> u32 {
        self.date.month()
    }

    pub fn day(&self) -> u32 {
        self.date.day()
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(event_type) = &self.event_type {
            write!(f, "event_type={}/", event_type)?;
        }
        write!(
            f,
            "year={:04}/month={:02}/day={:02}",
            self.year(),
            self.month(),
            self.day()
        )
    }
}

/// Object key for a primary write: `<partition>/<event_id>.json`
pub fn primary_object_key(key: &PartitionKey, event_id: &str) -> String {
    format!("{}/{}.json", key, encode_path_component(event_id))
}

/// Tie-breaker for quarantine names built from processing time
static QUARANTINE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Object key for a quarantine write.
///
/// Format: `failed/year=YYYY/month=MM/day=DD/<name>_error.json`, where the
/// name is the transport message ID when there is one (so a redelivered
/// message overwrites its earlier quarantine object). Otherwise it is the
/// processing time in microseconds plus a per-process sequence number.
pub fn quarantine_object_key(now: DateTime<Utc>, message_id: Option<&str>) -> String {
    let key = PartitionKey::for_processing_time(now);
    let name = match message_id.filter(|id| !id.is_empty()) {
        Some(id) => encode_path_component(id),
        None => format!(
            "{}-{}",
            now.timestamp_micros(),
            QUARANTINE_SEQUENCE.fetch_add(1, Ordering::Relaxed)
        ),
    };

    format!("{}/{}/{}_error.json", QUARANTINE_PREFIX, key, name)
}

/// Percent-encode a path component.
///
/// The encoding is reversible, so distinct ids never share an object, and
/// `/` is always escaped.
fn encode_path_component(component: &str) -> String {
    urlencoding::encode(component).into_owned()
}
