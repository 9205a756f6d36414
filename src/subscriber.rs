//! Subscriber contracts and the typed subscriber adapter
//!
//! `EventSubscriber` is what the bus dispatches to. Most consumers only
//! care about one concrete event type; `TypedSubscriber` declares that
//! single type, checks every incoming event against it and hands the
//! narrowed value to a `TypedEventHandler`.

use crate::error::{EventError, Result};
use crate::filter::EventFilter;
use crate::types::{Event, EventTypes};
use std::marker::PhantomData;

/// A consumer registered with the bus
///
/// The interest set returned by [`subscribed_event_types`](Self::subscribed_event_types)
/// must not change for the lifetime of the subscriber.
pub trait EventSubscriber: Send + Sync {
    /// Event type tags this subscriber wants to receive
    fn subscribed_event_types(&self) -> &EventTypes;

    /// Optional filter applied after type matching
    ///
    /// `None` delivers every event of a subscribed type.
    fn event_filter(&self) -> Option<&dyn EventFilter> {
        None
    }

    /// Handle a dispatched event
    ///
    /// Called synchronously on the publishing thread. Long-running work
    /// should be handed off (see [`ChannelSubscriber`](crate::ChannelSubscriber)).
    fn receive(&self, event: &Event) -> Result<()>;

    /// Name used in logs and failure records
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// A concrete event type that can be narrowed from a generic [`Event`]
///
/// ```rust
/// use a3s_dispatch::{Event, Result, TypedEvent};
///
/// struct LightChanged {
///     light: String,
///     on: bool,
/// }
///
/// impl TypedEvent for LightChanged {
///     const EVENT_TYPE: &'static str = "LightChangedEvent";
///
///     fn from_event(event: &Event) -> Result<Self> {
///         Ok(Self {
///             light: event.topic().to_string(),
///             on: event.decode_payload()?,
///         })
///     }
/// }
/// ```
pub trait TypedEvent: Sized {
    /// The type tag events of this type are published under
    const EVENT_TYPE: &'static str;

    /// Build the concrete value from an event carrying [`Self::EVENT_TYPE`]
    fn from_event(event: &Event) -> Result<Self>;
}

/// Handler logic for one concrete event type
pub trait TypedEventHandler<T>: Send + Sync {
    fn receive_typed_event(&self, event: T) -> Result<()>;
}

impl<T, F> TypedEventHandler<T> for F
where
    F: Fn(T) -> Result<()> + Send + Sync,
{
    fn receive_typed_event(&self, event: T) -> Result<()> {
        self(event)
    }
}

/// Subscriber adapter for exactly one event type
///
/// The interest set is always `{T::EVENT_TYPE}` and no filter is set
/// unless [`with_filter`](Self::with_filter) supplies one.
pub struct TypedSubscriber<T, H> {
    types: EventTypes,
    filter: Option<Box<dyn EventFilter>>,
    name: String,
    handler: H,
    _event: PhantomData<fn(T)>,
}

impl<T, H> TypedSubscriber<T, H>
where
    T: TypedEvent,
    H: TypedEventHandler<T>,
{
    /// Create a typed subscriber around a handler
    pub fn new(handler: H) -> Self {
        Self {
            types: EventTypes::single(T::EVENT_TYPE),
            filter: None,
            name: format!("typed:{}", T::EVENT_TYPE),
            handler,
            _event: PhantomData,
        }
    }

    /// Narrow delivery with a filter
    pub fn with_filter(mut self, filter: impl EventFilter + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Override the name used in logs and failure records
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The declared event type tag
    pub fn event_type(&self) -> &'static str {
        T::EVENT_TYPE
    }

    /// Access the wrapped handler
    pub fn handler(&self) -> &H {
        &self.handler
    }
}

impl<T, H> EventSubscriber for TypedSubscriber<T, H>
where
    T: TypedEvent,
    H: TypedEventHandler<T>,
{
    fn subscribed_event_types(&self) -> &EventTypes {
        &self.types
    }

    fn event_filter(&self) -> Option<&dyn EventFilter> {
        self.filter.as_deref()
    }

    fn receive(&self, event: &Event) -> Result<()> {
        if event.event_type() != T::EVENT_TYPE {
            tracing::error!(
                subscriber = %self.name,
                expected = T::EVENT_TYPE,
                actual = %event.event_type(),
                event_id = %event.id(),
                "Typed subscriber received an event outside its declared type"
            );
            return Err(EventError::RoutingMismatch {
                expected: T::EVENT_TYPE.to_string(),
                actual: event.event_type().to_string(),
            });
        }

        let typed = T::from_event(event)?;
        self.handler.receive_typed_event(typed)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Untyped subscriber backed by a closure
///
/// Handy for subscribers spanning several event types or using the
/// `ALL` wildcard.
pub struct FnSubscriber<F> {
    name: String,
    types: EventTypes,
    filter: Option<Box<dyn EventFilter>>,
    handler: F,
}

impl<F> FnSubscriber<F>
where
    F: Fn(&Event) -> Result<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, types: EventTypes, handler: F) -> Self {
        Self {
            name: name.into(),
            types,
            filter: None,
            handler,
        }
    }

    /// Narrow delivery with a filter
    pub fn with_filter(mut self, filter: impl EventFilter + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }
}

impl<F> EventSubscriber for FnSubscriber<F>
where
    F: Fn(&Event) -> Result<()> + Send + Sync,
{
    fn subscribed_event_types(&self) -> &EventTypes {
        &self.types
    }

    fn event_filter(&self) -> Option<&dyn EventFilter> {
        self.filter.as_deref()
    }

    fn receive(&self, event: &Event) -> Result<()> {
        (self.handler)(event)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
