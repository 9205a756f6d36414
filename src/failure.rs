//! Delivery failures: contained subscriber and filter errors
//!
//! The bus never lets a failing subscriber affect the publisher or other
//! subscribers. Every contained failure is logged and handed to a
//! `FailureHandler`, the bus-level error callback.

use crate::types::{now_millis, Event};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock};

/// What went wrong while delivering an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    /// The subscriber's `receive` returned an error
    Subscriber,
    /// The subscriber's filter returned an error
    Filter,
    /// The subscriber or its filter panicked
    Panic,
    /// A typed subscriber was handed an event of a foreign type
    RoutingMismatch,
}

/// A failed delivery with context about why it failed
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryFailure {
    /// Name of the subscriber that failed
    pub subscriber: String,

    /// Id of the event being delivered
    pub event_id: String,

    /// Type tag of the event being delivered
    pub event_type: String,

    /// Topic of the event being delivered
    pub topic: String,

    /// Failure category
    pub kind: FailureKind,

    /// Human-readable reason
    pub reason: String,

    /// Unix timestamp in milliseconds when the failure was recorded
    pub failed_at: u64,
}

impl DeliveryFailure {
    /// Create a new failure record for an event
    pub fn new(
        subscriber: impl Into<String>,
        event: &Event,
        kind: FailureKind,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            subscriber: subscriber.into(),
            event_id: event.id().to_string(),
            event_type: event.event_type().to_string(),
            topic: event.topic().to_string(),
            kind,
            reason: reason.into(),
            failed_at: now_millis(),
        }
    }
}

/// Bus-level callback for contained delivery failures
///
/// Called synchronously on the publishing thread after the failure has
/// been logged. Implementations must not panic and should return quickly.
pub trait FailureHandler: Send + Sync {
    fn handle(&self, failure: DeliveryFailure);
}

impl<F> FailureHandler for F
where
    F: Fn(DeliveryFailure) + Send + Sync,
{
    fn handle(&self, failure: DeliveryFailure) {
        self(failure)
    }
}

/// In-memory failure log for development and testing
///
/// Keeps the most recent failures up to a configurable capacity.
pub struct MemoryFailureHandler {
    failures: RwLock<VecDeque<DeliveryFailure>>,
    capacity: usize,
}

impl MemoryFailureHandler {
    /// Create a new handler; a capacity of 0 keeps every failure
    pub fn new(capacity: usize) -> Self {
        Self {
            failures: RwLock::new(VecDeque::new()),
            capacity,
        }
    }

    /// Number of recorded failures
    pub fn count(&self) -> usize {
        self.failures
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Recent failures, most recent first
    pub fn list(&self, limit: usize) -> Vec<DeliveryFailure> {
        let failures = self.failures.read().unwrap_or_else(PoisonError::into_inner);
        failures.iter().rev().take(limit).cloned().collect()
    }

    /// Drop all recorded failures
    pub fn clear(&self) {
        self.failures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Default for MemoryFailureHandler {
    fn default() -> Self {
        Self::new(1_000)
    }
}

impl FailureHandler for MemoryFailureHandler {
    fn handle(&self, failure: DeliveryFailure) {
        let mut failures = self.failures.write().unwrap_or_else(PoisonError::into_inner);
        failures.push_back(failure);

        if self.capacity > 0 {
            while failures.len() > self.capacity {
                failures.pop_front();
            }
        }
    }
}
