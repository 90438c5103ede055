use crate::config::{ConfigError, RoutingConfig};
use std::collections::BTreeMap;
use std::fmt;

/// Where a single write goes. Resolved once per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Primary(String),
    Quarantine(String),
}

impl Destination {
    pub fn bucket(&self) -> &str {
        match self {
            Destination::Primary(bucket) | Destination::Quarantine(bucket) => bucket,
        }
    }

    /// Label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Destination::Primary(_) => "primary",
            Destination::Quarantine(_) => "quarantine",
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.bucket())
    }
}

/// How primary buckets are chosen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimaryRouting {
    /// Every event type shares one bucket
    Single(String),
    /// Known-destinations registry: event_type -> bucket
    Registry(BTreeMap<String, String>),
}

impl PrimaryRouting {
    pub fn from_config(config: &RoutingConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        if config.buckets.is_empty() {
            let bucket = config
                .primary_bucket
                .clone()
                .ok_or_else(|| ConfigError::MissingRequired("PRIMARY_BUCKET".to_string()))?;
            Ok(PrimaryRouting::Single(bucket))
        } else {
            Ok(PrimaryRouting::Registry(
                config
                    .buckets
                    .iter()
                    .map(|(event_type, bucket)| (event_type.clone(), bucket.clone()))
                    .collect(),
            ))
        }
    }

    /// Primary destination for an event type, if routable
    pub fn resolve(&self, event_type: &str) -> Option<Destination> {
        match self {
            PrimaryRouting::Single(bucket) => Some(Destination::Primary(bucket.clone())),
            PrimaryRouting::Registry(buckets) => buckets
                .get(event_type)
                .map(|bucket| Destination::Primary(bucket.clone())),
        }
    }

    /// Registered event types, or `None` when any type is accepted
    pub fn known_event_types(&self) -> Option<impl Iterator<Item = &str>> {
        match self {
            PrimaryRouting::Single(_) => None,
            PrimaryRouting::Registry(buckets) => Some(buckets.keys().map(String::as_str)),
        }
    }

    /// Every primary bucket this routing can write to
    pub fn buckets(&self) -> Vec<&str> {
        match self {
            PrimaryRouting::Single(bucket) => vec![bucket.as_str()],
            PrimaryRouting::Registry(buckets) => {
                let mut all: Vec<&str> = buckets.values().map(String::as_str).collect();
                all.sort_unstable();
                all.dedup();
                all
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_bucket_routes_everything() {
        let routing = PrimaryRouting::from_config(&RoutingConfig {
            primary_bucket: Some("events".to_string()),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(
            routing.resolve("anything"),
            Some(Destination::Primary("events".to_string()))
        );
        assert!(routing.known_event_types().is_none());
    }

    #[test]
    fn test_registry_routes_known_types_only() {
        let mut config = RoutingConfig::default();
        config
            .buckets
            .insert("purchase".to_string(), "purchases".to_string());
        config
            .buckets
            .insert("ad_click".to_string(), "ad-clicks".to_string());

        let routing = PrimaryRouting::from_config(&config).unwrap();

        assert_eq!(
            routing.resolve("purchase"),
            Some(Destination::Primary("purchases".to_string()))
        );
        assert_eq!(routing.resolve("page_view"), None);

        let known: Vec<&str> = routing.known_event_types().unwrap().collect();
        assert_eq!(known, ["ad_click", "purchase"]);
        assert_eq!(routing.buckets(), ["ad-clicks", "purchases"]);
    }

    #[test]
    fn test_destination_display() {
        assert_eq!(
            Destination::Quarantine("q".to_string()).to_string(),
            "quarantine:q"
        );
    }
}
