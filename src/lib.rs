//! # a3s-dispatch
//!
//! In-process typed event dispatch for the A3S ecosystem.
//!
//! ## Overview
//!
//! `a3s-dispatch` routes heterogeneous events to the subscribers that
//! declared interest in their type tag, narrows delivery with optional
//! filters, and keeps one misbehaving subscriber from affecting the
//! publisher or anyone else.
//!
//! ## Quick Start
//!
//! ```rust
//! use a3s_dispatch::{Event, EventBus, Result, TypedEvent, TypedSubscriber};
//! use std::sync::Arc;
//!
//! struct LightChanged {
//!     on: bool,
//! }
//!
//! impl TypedEvent for LightChanged {
//!     const EVENT_TYPE: &'static str = "LightChangedEvent";
//!
//!     fn from_event(event: &Event) -> Result<Self> {
//!         Ok(Self { on: event.decode_payload()? })
//!     }
//! }
//!
//! # fn example() -> Result<()> {
//! let bus = EventBus::new();
//!
//! let subscriber = Arc::new(TypedSubscriber::<LightChanged, _>::new(
//!     |event: LightChanged| -> Result<()> {
//!         println!("light is {}", if event.on { "on" } else { "off" });
//!         Ok(())
//!     },
//! ));
//! bus.register(&subscriber);
//!
//! let report = bus.publish(&Event::new(
//!     "LightChangedEvent",
//!     "smarthome/lights/desk",
//!     serde_json::json!(true),
//! ))?;
//! assert_eq!(report.delivered, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **EventBus**: subscriber registry and synchronous dispatch
//! - **EventSubscriber** trait: what the bus delivers to
//! - **TypedSubscriber**: single-type adapter narrowing events to a concrete type
//! - **EventFilter** trait: predicate applied after type routing
//! - **ChannelSubscriber**: hands events to an async consumer
//! - **FailureHandler** trait: bus-level callback for contained failures

pub mod bus;
pub mod channel;
pub mod config;
pub mod error;
pub mod failure;
pub mod filter;
pub mod subscriber;
pub mod types;

// Re-export core types
pub use bus::{EventBus, EventPublisher};
pub use channel::{ChannelSubscriber, EventReceiver};
pub use config::BusConfig;
pub use error::{EventError, Result};
pub use failure::{DeliveryFailure, FailureHandler, FailureKind, MemoryFailureHandler};
pub use filter::{EventFilter, TopicEventFilter};
pub use subscriber::{EventSubscriber, FnSubscriber, TypedEvent, TypedEventHandler, TypedSubscriber};
pub use types::{BusStats, DeliveryReport, Event, EventTypes, ALL_EVENT_TYPES};
