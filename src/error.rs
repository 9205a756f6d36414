//! Error types for a3s-dispatch

use thiserror::Error;

/// Errors that can occur while publishing or delivering events
#[derive(Debug, Error)]
pub enum EventError {
    /// Malformed event rejected at publish time
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// A typed subscriber received an event of a type it never declared
    ///
    /// Indicates a routing bug in the bus, not a user error.
    #[error("Routing mismatch: subscriber expects '{expected}' but received '{actual}'")]
    RoutingMismatch {
        expected: String,
        actual: String,
    },

    /// Subscriber handler failure
    #[error("Subscriber '{subscriber}' failed: {reason}")]
    Subscriber {
        subscriber: String,
        reason: String,
    },

    /// Event filter failure
    #[error("Filter error: {0}")]
    Filter(String),

    /// Subscriber queue is full
    #[error("Queue full: {0}")]
    QueueFull(String),

    /// Subscriber queue receiver has been dropped
    #[error("Channel closed: {0}")]
    Closed(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl EventError {
    /// Build a subscriber failure from any displayable reason
    pub fn subscriber(subscriber: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Subscriber {
            subscriber: subscriber.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for event operations
pub type Result<T> = std::result::Result<T, EventError>;
