//! Core event types for the a3s-dispatch system
//!
//! All types use camelCase JSON serialization for wire compatibility.

use crate::error::{EventError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Reserved event type tag that subscribes to every event type
pub const ALL_EVENT_TYPES: &str = "ALL";

/// A single event in the system
///
/// Events are immutable once constructed: all fields are read through
/// accessors, and the builder methods consume the event before it is
/// published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Unique event identifier (evt-<uuid>)
    id: String,

    /// Event type tag used for routing (e.g., "ItemStateChangedEvent")
    event_type: String,

    /// Topic describing what the event is about (e.g., "smarthome/items/light/state")
    topic: String,

    /// Event payload, opaque to the bus
    payload: serde_json::Value,

    /// Source system or component that produced this event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<String>,

    /// Unix timestamp in milliseconds
    timestamp: u64,

    /// Optional key-value metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    metadata: HashMap<String, String>,
}

impl Event {
    /// Create a new event with auto-generated id and timestamp
    pub fn new(
        event_type: impl Into<String>,
        topic: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: format!("evt-{}", uuid::Uuid::new_v4()),
            event_type: event_type.into(),
            topic: topic.into(),
            payload,
            source: None,
            timestamp: now_millis(),
            metadata: HashMap::new(),
        }
    }

    /// Set the producing source
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Add a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    /// Deserialize the payload into a concrete type
    pub fn decode_payload<P: DeserializeOwned>(&self) -> Result<P> {
        Ok(P::deserialize(&self.payload)?)
    }

    /// Check that the event can be dispatched
    pub fn validate(&self) -> Result<()> {
        if self.event_type.trim().is_empty() {
            return Err(EventError::InvalidEvent(format!(
                "event '{}' has an empty type tag",
                self.id
            )));
        }
        Ok(())
    }
}

/// The set of event type tags a subscriber is interested in
///
/// Non-empty, deduplicated and immutable after construction. Changing
/// interest means unregistering and registering a new subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct EventTypes(BTreeSet<String>);

impl EventTypes {
    /// Build an interest set from one or more type tags
    pub fn new<I, S>(types: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = BTreeSet::new();
        for tag in types {
            let tag = tag.into();
            if tag.trim().is_empty() {
                return Err(EventError::Config(
                    "Event type tag cannot be empty".to_string(),
                ));
            }
            set.insert(tag);
        }
        if set.is_empty() {
            return Err(EventError::Config(
                "Subscriber must declare at least one event type".to_string(),
            ));
        }
        Ok(Self(set))
    }

    /// Interest set holding exactly one tag
    ///
    /// An empty tag yields a set that no publishable event can match.
    pub fn single(tag: impl Into<String>) -> Self {
        Self(BTreeSet::from([tag.into()]))
    }

    /// Interest set matching every event type
    pub fn all() -> Self {
        Self::single(ALL_EVENT_TYPES)
    }

    /// True if this set subscribes to every event type
    pub fn is_all(&self) -> bool {
        self.0.contains(ALL_EVENT_TYPES)
    }

    /// True if an event with the given tag falls within this set
    pub fn matches(&self, event_type: &str) -> bool {
        self.is_all() || self.0.contains(event_type)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<Vec<String>> for EventTypes {
    type Error = EventError;

    fn try_from(types: Vec<String>) -> Result<Self> {
        Self::new(types)
    }
}

impl From<EventTypes> for Vec<String> {
    fn from(types: EventTypes) -> Self {
        types.0.into_iter().collect()
    }
}

/// Outcome of a single publish call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReport {
    /// Live subscribers whose interest set matched the event type
    pub matched: usize,

    /// Subscribers whose `receive` completed successfully
    pub delivered: usize,

    /// Subscribers skipped because their filter rejected the event
    pub filtered: usize,

    /// Subscribers whose filter or `receive` failed
    pub failed: usize,
}

/// Cumulative counters for an event bus
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusStats {
    /// Events accepted by `publish`
    pub published: u64,

    /// Successful `receive` calls
    pub delivered: u64,

    /// Deliveries skipped by a filter
    pub filtered: u64,

    /// Contained filter or subscriber failures
    pub failed: u64,

    /// Currently registered subscribers
    pub subscribers: usize,
}

/// Current time in Unix milliseconds
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
