//! Channel subscriber: hand events off to an async consumer
//!
//! Dispatch is synchronous, so a slow subscriber stalls the publisher.
//! `ChannelSubscriber` keeps `receive` cheap: it pushes a copy of the
//! event into a bounded tokio queue and returns. The paired
//! `EventReceiver` drains the queue from any async task.
//!
//! A full queue drops the event for this subscriber only; the bus records
//! the drop as a contained `QueueFull` failure.

use crate::bus::EventBus;
use crate::error::{EventError, Result};
use crate::filter::EventFilter;
use crate::subscriber::EventSubscriber;
use crate::types::{Event, EventTypes};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::wrappers::ReceiverStream;

/// Subscriber that forwards matching events into a bounded queue
pub struct ChannelSubscriber {
    name: String,
    types: EventTypes,
    filter: Option<Box<dyn EventFilter>>,
    sender: mpsc::Sender<Event>,
}

impl ChannelSubscriber {
    /// Create a subscriber and its receiving end
    ///
    /// A capacity of 0 is raised to 1.
    pub fn new(
        name: impl Into<String>,
        types: EventTypes,
        capacity: usize,
    ) -> (Self, EventReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let subscriber = Self {
            name: name.into(),
            types,
            filter: None,
            sender,
        };
        (subscriber, EventReceiver { receiver })
    }

    /// Narrow delivery with a filter
    pub fn with_filter(mut self, filter: impl EventFilter + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    /// True once the receiving end has been dropped
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl EventSubscriber for ChannelSubscriber {
    fn subscribed_event_types(&self) -> &EventTypes {
        &self.types
    }

    fn event_filter(&self) -> Option<&dyn EventFilter> {
        self.filter.as_deref()
    }

    fn receive(&self, event: &Event) -> Result<()> {
        self.sender.try_send(event.clone()).map_err(|e| match e {
            TrySendError::Full(_) => {
                EventError::QueueFull(format!("subscriber '{}' dropped event", self.name))
            }
            TrySendError::Closed(_) => {
                EventError::Closed(format!("subscriber '{}' receiver dropped", self.name))
            }
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Receiving end of a [`ChannelSubscriber`]
pub struct EventReceiver {
    receiver: mpsc::Receiver<Event>,
}

impl EventReceiver {
    /// Wait for the next event
    ///
    /// Returns `None` once the subscriber has been dropped and the queue
    /// is drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    /// Take the next queued event without waiting
    pub fn try_recv(&mut self) -> Option<Event> {
        self.receiver.try_recv().ok()
    }

    /// Convert into a `Stream` of events
    pub fn into_stream(self) -> ReceiverStream<Event> {
        ReceiverStream::new(self.receiver)
    }
}

impl EventBus {
    /// Create and register a channel subscriber sized from the bus config
    ///
    /// The caller owns the returned subscriber; dropping it ends the
    /// subscription.
    pub fn subscribe_channel(
        &self,
        name: impl Into<String>,
        types: EventTypes,
    ) -> (Arc<ChannelSubscriber>, EventReceiver) {
        let (subscriber, receiver) =
            ChannelSubscriber::new(name, types, self.config().channel_capacity);
        let subscriber = Arc::new(subscriber);
        self.register(&subscriber);
        (subscriber, receiver)
    }
}
