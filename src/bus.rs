//! Event bus: subscriber registry and synchronous dispatch
//!
//! `EventBus` keeps a registry of live subscribers keyed by event type and
//! delivers each published event to every subscriber whose interest set
//! and filter accept it. Delivery runs on the publishing thread.
//!
//! The registry is copy-on-write: `publish` clones an `Arc` snapshot under
//! a short read lock and dispatches without holding any lock, so
//! subscribers may register or unregister from inside `receive`.

use crate::config::BusConfig;
use crate::error::{EventError, Result};
use crate::failure::{DeliveryFailure, FailureHandler, FailureKind, MemoryFailureHandler};
use crate::subscriber::EventSubscriber;
use crate::types::{BusStats, DeliveryReport, Event, EventTypes, ALL_EVENT_TYPES};
use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

/// Producer-facing side of the bus
pub trait EventPublisher: Send + Sync {
    /// Publish an event to all matching subscribers
    fn post(&self, event: &Event) -> Result<DeliveryReport>;
}

/// Registry key: the address of the subscriber allocation
type SubscriberId = usize;

fn subscriber_id<S: ?Sized>(subscriber: &Arc<S>) -> SubscriberId {
    Arc::as_ptr(subscriber).cast::<()>() as usize
}

/// Non-owning registry entry
#[derive(Clone)]
struct Registration {
    subscriber: Weak<dyn EventSubscriber>,
    types: EventTypes,
}

impl Registration {
    fn is_live(&self) -> bool {
        self.subscriber.strong_count() > 0
    }
}

#[derive(Clone, Default)]
struct Registry {
    entries: HashMap<SubscriberId, Registration>,

    /// event type → subscribers in registration order
    by_type: HashMap<String, Vec<SubscriberId>>,

    /// `ALL` subscribers in registration order
    wildcard: Vec<SubscriberId>,
}

impl Registry {
    fn insert(&mut self, id: SubscriberId, registration: Registration) {
        if registration.types.is_all() {
            self.wildcard.push(id);
        } else {
            for tag in registration.types.iter() {
                self.by_type.entry(tag.to_string()).or_default().push(id);
            }
        }
        self.entries.insert(id, registration);
    }

    fn remove(&mut self, id: SubscriberId) -> bool {
        let Some(registration) = self.entries.remove(&id) else {
            return false;
        };

        if registration.types.is_all() {
            self.wildcard.retain(|other| *other != id);
        } else {
            for tag in registration.types.iter() {
                if let Some(ids) = self.by_type.get_mut(tag) {
                    ids.retain(|other| *other != id);
                    if ids.is_empty() {
                        self.by_type.remove(tag);
                    }
                }
            }
        }
        true
    }

    /// Drop entries whose subscriber has been deallocated
    fn prune(&mut self) {
        let dead: Vec<SubscriberId> = self
            .entries
            .iter()
            .filter(|(_, registration)| !registration.is_live())
            .map(|(id, _)| *id)
            .collect();
        for id in dead {
            self.remove(id);
        }
    }

    /// Subscribers for an event type: exact matches first, then `ALL`
    fn targets<'a>(&'a self, event_type: &str) -> impl Iterator<Item = &'a Registration> + 'a {
        self.by_type
            .get(event_type)
            .into_iter()
            .flatten()
            .chain(self.wildcard.iter())
            .filter_map(move |id| self.entries.get(id))
    }
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    delivered: AtomicU64,
    filtered: AtomicU64,
    failed: AtomicU64,
}

enum Outcome {
    Delivered,
    Filtered,
    Failed,
}

/// In-process event bus
///
/// Thread-safe; share it behind an `Arc`. Subscribers are held through
/// weak references, so the registrant keeps ownership and a dropped
/// subscriber simply stops receiving events.
pub struct EventBus {
    config: BusConfig,
    registry: RwLock<Arc<Registry>>,
    failures: MemoryFailureHandler,
    failure_handler: Option<Arc<dyn FailureHandler>>,
    counters: Counters,
}

impl EventBus {
    /// Create a bus with the default config
    pub fn new() -> Self {
        Self::build(BusConfig::default())
    }

    /// Create a bus from a validated config
    pub fn with_config(config: BusConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: BusConfig) -> Self {
        Self {
            failures: MemoryFailureHandler::new(config.failure_capacity),
            config,
            registry: RwLock::new(Arc::new(Registry::default())),
            failure_handler: None,
            counters: Counters::default(),
        }
    }

    /// Forward every contained failure to a callback
    pub fn with_failure_handler(mut self, handler: Arc<dyn FailureHandler>) -> Self {
        self.failure_handler = Some(handler);
        self
    }

    /// Bus name from the config
    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Register a subscriber under every tag in its interest set
    ///
    /// Returns `false` if this subscriber instance is already registered.
    pub fn register<S: EventSubscriber + 'static>(&self, subscriber: &Arc<S>) -> bool {
        let weak: Weak<S> = Arc::downgrade(subscriber);
        self.insert(subscriber_id(subscriber), weak, subscriber.as_ref())
    }

    /// Register a type-erased subscriber
    pub fn register_dyn(&self, subscriber: &Arc<dyn EventSubscriber>) -> bool {
        self.insert(
            subscriber_id(subscriber),
            Arc::downgrade(subscriber),
            subscriber.as_ref(),
        )
    }

    fn insert(
        &self,
        id: SubscriberId,
        weak: Weak<dyn EventSubscriber>,
        subscriber: &dyn EventSubscriber,
    ) -> bool {
        let types = subscriber.subscribed_event_types().clone();

        {
            let mut guard = self.registry.write().unwrap_or_else(PoisonError::into_inner);
            if guard.entries.get(&id).is_some_and(Registration::is_live) {
                return false;
            }

            let registry = Arc::make_mut(&mut *guard);
            registry.prune();
            registry.insert(id, Registration {
                subscriber: weak,
                types: types.clone(),
            });
        }

        tracing::debug!(
            bus = %self.config.name,
            subscriber = %subscriber.name(),
            event_types = ?types.iter().collect::<Vec<_>>(),
            "Subscriber registered"
        );
        true
    }

    /// Remove every registry entry for a subscriber
    ///
    /// Returns `false` if the subscriber was not registered.
    pub fn unregister<S: EventSubscriber + ?Sized>(&self, subscriber: &Arc<S>) -> bool {
        let id = subscriber_id(subscriber);
        let removed = {
            let mut guard = self.registry.write().unwrap_or_else(PoisonError::into_inner);
            if !guard.entries.contains_key(&id) {
                return false;
            }
            let registry = Arc::make_mut(&mut *guard);
            registry.prune();
            registry.remove(id)
        };

        if removed {
            tracing::debug!(
                bus = %self.config.name,
                subscriber = %subscriber.name(),
                "Subscriber unregistered"
            );
        }
        removed
    }

    /// Check whether a subscriber instance is currently registered
    pub fn is_registered<S: EventSubscriber + ?Sized>(&self, subscriber: &Arc<S>) -> bool {
        self.snapshot()
            .entries
            .get(&subscriber_id(subscriber))
            .is_some_and(Registration::is_live)
    }

    /// Number of live registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.snapshot()
            .entries
            .values()
            .filter(|registration| registration.is_live())
            .count()
    }

    /// Event types with at least one live subscriber, sorted
    pub fn subscribed_event_types(&self) -> Vec<String> {
        let registry = self.snapshot();
        let mut types = BTreeSet::new();
        for registration in registry.entries.values().filter(|r| r.is_live()) {
            if registration.types.is_all() {
                types.insert(ALL_EVENT_TYPES.to_string());
            } else {
                types.extend(registration.types.iter().map(str::to_string));
            }
        }
        types.into_iter().collect()
    }

    /// Deliver an event to every matching subscriber
    ///
    /// Only fails for malformed events. Subscriber and filter failures are
    /// contained, logged and reported through the failure handler.
    pub fn publish(&self, event: &Event) -> Result<DeliveryReport> {
        event.validate()?;

        let registry = self.snapshot();
        self.counters.published.fetch_add(1, Ordering::Relaxed);

        let mut report = DeliveryReport::default();
        for registration in registry.targets(event.event_type()) {
            let Some(subscriber) = registration.subscriber.upgrade() else {
                continue;
            };
            report.matched += 1;

            match self.deliver(subscriber.as_ref(), event) {
                Outcome::Delivered => report.delivered += 1,
                Outcome::Filtered => report.filtered += 1,
                Outcome::Failed => report.failed += 1,
            }
        }

        self.counters
            .delivered
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.counters
            .filtered
            .fetch_add(report.filtered as u64, Ordering::Relaxed);
        self.counters
            .failed
            .fetch_add(report.failed as u64, Ordering::Relaxed);

        tracing::debug!(
            bus = %self.config.name,
            event_id = %event.id(),
            event_type = %event.event_type(),
            topic = %event.topic(),
            matched = report.matched,
            delivered = report.delivered,
            failed = report.failed,
            "Event published"
        );

        Ok(report)
    }

    fn deliver(&self, subscriber: &dyn EventSubscriber, event: &Event) -> Outcome {
        if let Some(filter) = subscriber.event_filter() {
            match self.contain(|| filter.apply(event)) {
                Ok(Ok(true)) => {}
                Ok(Ok(false)) => return Outcome::Filtered,
                Ok(Err(e)) => {
                    self.report_failure(subscriber, event, FailureKind::Filter, e.to_string());
                    return Outcome::Failed;
                }
                Err(panic) => {
                    self.report_failure(
                        subscriber,
                        event,
                        FailureKind::Panic,
                        format!("filter panicked: {}", panic),
                    );
                    return Outcome::Failed;
                }
            }
        }

        match self.contain(|| subscriber.receive(event)) {
            Ok(Ok(())) => Outcome::Delivered,
            Ok(Err(e @ EventError::RoutingMismatch { .. })) => {
                self.report_failure(subscriber, event, FailureKind::RoutingMismatch, e.to_string());
                Outcome::Failed
            }
            Ok(Err(e)) => {
                self.report_failure(subscriber, event, FailureKind::Subscriber, e.to_string());
                Outcome::Failed
            }
            Err(panic) => {
                self.report_failure(
                    subscriber,
                    event,
                    FailureKind::Panic,
                    format!("subscriber panicked: {}", panic),
                );
                Outcome::Failed
            }
        }
    }

    /// Run `f`, turning a panic into its message
    fn contain<R>(&self, f: impl FnOnce() -> R) -> std::result::Result<R, String> {
        panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()))
    }

    fn report_failure(
        &self,
        subscriber: &dyn EventSubscriber,
        event: &Event,
        kind: FailureKind,
        reason: String,
    ) {
        match kind {
            FailureKind::RoutingMismatch | FailureKind::Panic => tracing::error!(
                bus = %self.config.name,
                subscriber = %subscriber.name(),
                event_id = %event.id(),
                event_type = %event.event_type(),
                kind = ?kind,
                reason = %reason,
                "Event delivery failed"
            ),
            FailureKind::Subscriber | FailureKind::Filter => tracing::warn!(
                bus = %self.config.name,
                subscriber = %subscriber.name(),
                event_id = %event.id(),
                event_type = %event.event_type(),
                kind = ?kind,
                reason = %reason,
                "Event delivery failed"
            ),
        }

        let failure = DeliveryFailure::new(subscriber.name(), event, kind, reason);
        if let Some(handler) = &self.failure_handler {
            if let Err(panic) = self.contain(|| handler.handle(failure.clone())) {
                tracing::error!(
                    bus = %self.config.name,
                    event_id = %event.id(),
                    reason = %panic,
                    "Failure handler panicked"
                );
            }
        }
        self.failures.handle(failure);
    }

    /// Recent contained failures, most recent first
    pub fn recent_failures(&self, limit: usize) -> Vec<DeliveryFailure> {
        self.failures.list(limit)
    }

    /// Snapshot of the bus counters
    pub fn stats(&self) -> BusStats {
        BusStats {
            published: self.counters.published.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            filtered: self.counters.filtered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            subscribers: self.subscriber_count(),
        }
    }

    fn snapshot(&self) -> Arc<Registry> {
        let guard = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventPublisher for EventBus {
    fn post(&self, event: &Event) -> Result<DeliveryReport> {
        self.publish(event)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
