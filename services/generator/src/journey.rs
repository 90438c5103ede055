//! Synthetic shopper behaviour.
//!
//! A journey is one user's event history across one to three sessions,
//! backdated so multi-day gaps still end near the present.

use crate::catalog::{Product, AD_SOURCES, DEVICES, LOCATIONS, PRODUCTS};
use chrono::{Duration, NaiveDateTime};
use rand::distributions::{WeightedError, WeightedIndex};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;
use uuid::Uuid;

/// Clickstream event types the generator emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    AdClick,
    PageView,
    AddToCart,
    Purchase,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::AdClick => "ad_click",
            EventType::PageView => "page_view",
            EventType::AddToCart => "add_to_cart",
            EventType::Purchase => "purchase",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How far a session gets through the funnel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JourneyType {
    AdClickOnly,
    Browse,
    CartAbandon,
    Purchase,
}

impl JourneyType {
    const ALL: [JourneyType; 4] = [
        JourneyType::AdClickOnly,
        JourneyType::Browse,
        JourneyType::CartAbandon,
        JourneyType::Purchase,
    ];

    /// Relative frequencies, in `ALL` order
    const WEIGHTS: [u32; 4] = [10, 40, 30, 20];

    fn views_products(self) -> bool {
        !matches!(self, JourneyType::AdClickOnly)
    }

    fn adds_to_cart(self) -> bool {
        matches!(self, JourneyType::CartAbandon | JourneyType::Purchase)
    }
}

/// Product fields attached to product events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub product_id: String,
    pub product_name: String,
    pub category: String,
    pub price: f64,
}

impl From<&Product> for ProductDetails {
    fn from(p: &Product) -> Self {
        Self {
            product_id: p.id.to_string(),
            product_name: p.name.to_string(),
            category: p.category.to_string(),
            price: p.price,
        }
    }
}

/// One generated event, serialized as the wire JSON object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickEvent {
    pub event_id: String,
    pub session_id: String,
    pub event_type: EventType,
    pub user_id: String,
    /// Missing on poison pills
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub device: String,
    pub location: String,
    #[serde(flatten)]
    pub product: Option<ProductDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ad_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
}

impl ClickEvent {
    pub fn is_poison_pill(&self) -> bool {
        self.timestamp.is_none()
    }
}

/// Generates events and journeys from an injected RNG.
///
/// Seed the RNG to make a run reproducible; event and user IDs come from it
/// too.
pub struct EventGenerator<R: Rng> {
    rng: R,
    poison_pill_rate: f64,
    journey_weights: WeightedIndex<u32>,
}

impl<R: Rng> EventGenerator<R> {
    /// Create a generator. `poison_pill_rate` is clamped to `[0, 1]`.
    pub fn new(rng: R, poison_pill_rate: f64) -> Result<Self, WeightedError> {
        Ok(Self {
            rng,
            poison_pill_rate: poison_pill_rate.clamp(0.0, 1.0),
            journey_weights: WeightedIndex::new(JourneyType::WEIGHTS)?,
        })
    }

    /// Build a single event
    pub fn generate_event(
        &mut self,
        user_id: &str,
        session_id: &str,
        event_type: EventType,
        product: Option<&Product>,
        timestamp: NaiveDateTime,
    ) -> ClickEvent {
        let event_id = self.next_uuid().to_string();

        let (ad_source, campaign_id) = if event_type == EventType::AdClick {
            (
                Some(self.pick(&AD_SOURCES).to_string()),
                Some(format!("camp_{}", self.rng.gen_range(100..=999))),
            )
        } else {
            (None, None)
        };

        let mut event = ClickEvent {
            event_id,
            session_id: session_id.to_string(),
            event_type,
            user_id: user_id.to_string(),
            timestamp: Some(format_timestamp(timestamp)),
            device: self.pick(&DEVICES).to_string(),
            location: self.pick(&LOCATIONS).to_string(),
            product: product.map(ProductDetails::from),
            ad_source,
            campaign_id,
        };

        if self.rng.gen::<f64>() < self.poison_pill_rate {
            warn!(event_id = %event.event_id, "Injecting poison pill event");
            event.timestamp = None;
        }

        event
    }

    /// Generate one user's history, ending roughly at `now`
    pub fn simulate_user_journey(&mut self, now: NaiveDateTime) -> Vec<ClickEvent> {
        let user_id = self.next_uuid().to_string();
        let num_sessions = self.rng.gen_range(1..=3);
        let mut current_time = now - self.uniform_duration(5.0 * DAY, 10.0 * DAY);

        let mut events = Vec::new();

        for _ in 0..num_sessions {
            let session_id = self.next_uuid().to_string();
            let product = *self.pick(&PRODUCTS);
            let has_overnight_gap = self.rng.gen_bool(0.2);
            let journey = JourneyType::ALL[self.journey_weights.sample(&mut self.rng)];

            let plan = self.plan_session(journey, &product);

            let gap_index = if has_overnight_gap && plan.len() > 1 {
                Some(self.rng.gen_range(1..=plan.len() - 1))
            } else {
                None
            };

            for (i, (event_type, product)) in plan.iter().enumerate() {
                current_time += if gap_index == Some(i) {
                    // Page left open overnight
                    self.uniform_duration(8.0 * HOUR, 12.0 * HOUR)
                } else {
                    self.uniform_duration(10.0, 300.0)
                };

                let event = self.generate_event(
                    &user_id,
                    &session_id,
                    *event_type,
                    product.as_ref(),
                    current_time,
                );
                events.push(event);
            }

            current_time += self.uniform_duration(1.0 * DAY, 3.0 * DAY);
        }

        events
    }

    fn plan_session(
        &mut self,
        journey: JourneyType,
        product: &Product,
    ) -> Vec<(EventType, Option<Product>)> {
        let mut plan = Vec::new();

        if journey == JourneyType::AdClickOnly || self.rng.gen_bool(0.5) {
            plan.push((EventType::AdClick, None));
        }

        if journey.views_products() {
            for _ in 0..self.rng.gen_range(1..=4) {
                plan.push((EventType::PageView, Some(*product)));
            }
        }

        if journey.adds_to_cart() {
            for _ in 0..self.rng.gen_range(1..=2) {
                plan.push((EventType::AddToCart, Some(*product)));
            }
        }

        if journey == JourneyType::Purchase {
            plan.push((EventType::Purchase, Some(*product)));
        }

        plan
    }

    /// Random pause in `[min_ms, max_ms]`
    pub fn random_millis(&mut self, min_ms: u64, max_ms: u64) -> std::time::Duration {
        let (low, high) = if min_ms <= max_ms {
            (min_ms, max_ms)
        } else {
            (max_ms, min_ms)
        };
        std::time::Duration::from_millis(self.rng.gen_range(low..=high))
    }

    fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        &items[self.rng.gen_range(0..items.len())]
    }

    fn next_uuid(&mut self) -> Uuid {
        uuid::Builder::from_random_bytes(self.rng.gen()).into_uuid()
    }

    fn uniform_duration(&mut self, min_secs: f64, max_secs: f64) -> Duration {
        let secs = self.rng.gen_range(min_secs..max_secs);
        Duration::milliseconds((secs * 1000.0) as i64)
    }
}

const HOUR: f64 = 3600.0;
const DAY: f64 = 24.0 * HOUR;

/// Naive ISO-8601 with microseconds, e.g. `2026-01-19T12:00:00.000000`
fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ingestion_service::decoder::EventDocument;
    use ingestion_service::Validator;
    use rand::rngs::StdRng;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 16)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn generator(seed: u64, poison_pill_rate: f64) -> EventGenerator<StdRng> {
        EventGenerator::new(StdRng::seed_from_u64(seed), poison_pill_rate).unwrap()
    }

    fn as_document(event: &ClickEvent) -> EventDocument {
        match serde_json::to_value(event).unwrap() {
            serde_json::Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn test_generate_event_structure() {
        let mut generator = generator(7, 0.0);
        let event = generator.generate_event(
            "user_1",
            "session_1",
            EventType::Purchase,
            Some(&PRODUCTS[4]),
            now(),
        );

        let document = as_document(&event);
        for key in ["event_id", "user_id", "timestamp", "event_type", "session_id"] {
            assert!(document.contains_key(key), "missing {key}");
        }
        assert_eq!(document["event_type"], "purchase");
        assert_eq!(document["product_id"], "prod_005");
        assert_eq!(document["price"], 65.0);
        assert_eq!(document["timestamp"], "2026-10-16T12:00:00.000000");
        assert!(!document.contains_key("ad_source"));
    }

    #[test]
    fn test_ad_click_carries_campaign() {
        let mut generator = generator(11, 0.0);
        let event = generator.generate_event("u", "s", EventType::AdClick, None, now());

        assert!(event.product.is_none());
        assert!(AD_SOURCES.contains(&event.ad_source.as_deref().unwrap()));
        let campaign = event.campaign_id.unwrap();
        let number: u32 = campaign.strip_prefix("camp_").unwrap().parse().unwrap();
        assert!((100..=999).contains(&number));
    }

    #[test]
    fn test_poison_pill_drops_timestamp() {
        let mut generator = generator(3, 1.0);
        let event = generator.generate_event("u", "s", EventType::PageView, None, now());

        assert!(event.is_poison_pill());
        assert!(!as_document(&event).contains_key("timestamp"));
    }

    #[test]
    fn test_seeded_journeys_are_reproducible() {
        let a = generator(42, 0.01).simulate_user_journey(now());
        let b = generator(42, 0.01).simulate_user_journey(now());
        assert_eq!(a, b);
    }

    #[test]
    fn test_journeys_follow_the_funnel() {
        let mut generator = generator(2026, 0.0);

        for _ in 0..50 {
            let journey = generator.simulate_user_journey(now());
            assert!(!journey.is_empty());

            let user_id = &journey[0].user_id;
            assert!(journey.iter().all(|e| &e.user_id == user_id));

            for session in journey.chunk_by(|a, b| a.session_id == b.session_id) {
                let purchases = session
                    .iter()
                    .filter(|e| e.event_type == EventType::Purchase)
                    .count();
                assert!(purchases <= 1);
                if purchases == 1 {
                    assert_eq!(session.last().unwrap().event_type, EventType::Purchase);
                    assert!(session.iter().any(|e| e.event_type == EventType::AddToCart));
                }
            }

            let timestamps: Vec<&String> =
                journey.iter().filter_map(|e| e.timestamp.as_ref()).collect();
            assert!(timestamps.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_generated_events_pass_ingestion_validation() {
        let mut generator = generator(99, 0.0);
        let validator = Validator::new();

        for event in generator.simulate_user_journey(now()) {
            let fields = validator.validate(&as_document(&event)).unwrap();
            assert_eq!(fields.event_type, event.event_type.as_str());
            assert_eq!(fields.event_id, event.event_id);
        }
    }
}
