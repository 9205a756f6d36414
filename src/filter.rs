//! Event filters: narrow delivery beyond type-based routing
//!
//! A filter is consulted after the bus has matched an event to a
//! subscriber by type tag. Returning `Ok(false)` skips the subscriber for
//! that event; returning an error is treated as a contained failure.

use crate::error::{EventError, Result};
use crate::types::Event;
use regex::Regex;

/// Predicate over an event
///
/// Filters are expected to be pure: the bus may call them from any
/// publishing thread and assumes no side effects.
pub trait EventFilter: Send + Sync {
    /// Decide whether the event should be delivered
    fn apply(&self, event: &Event) -> Result<bool>;
}

impl<F> EventFilter for F
where
    F: Fn(&Event) -> bool + Send + Sync,
{
    fn apply(&self, event: &Event) -> Result<bool> {
        Ok(self(event))
    }
}

/// Filter matching the event topic against a regular expression
///
/// The pattern must match the whole topic, e.g. `smarthome/items/.*/state`.
#[derive(Debug, Clone)]
pub struct TopicEventFilter {
    pattern: String,
    regex: Regex,
}

impl TopicEventFilter {
    /// Compile a topic filter
    pub fn new(pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        let regex = Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| {
            EventError::Filter(format!("Invalid topic pattern '{}': {}", pattern, e))
        })?;
        Ok(Self { pattern, regex })
    }

    /// The pattern this filter was built from
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl EventFilter for TopicEventFilter {
    fn apply(&self, event: &Event) -> Result<bool> {
        Ok(self.regex.is_match(event.topic()))
    }
}
