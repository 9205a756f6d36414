//! Event bus integration tests
//!
//! End-to-end tests exercising the public API: type routing, typed
//! subscribers, filters, failure isolation, registration lifecycle,
//! channel hand-off and concurrency.

use a3s_dispatch::{
    BusConfig, DeliveryFailure, Event, EventBus, EventError, EventSubscriber, EventTypes,
    FailureKind, FnSubscriber, MemoryFailureHandler, Result, TopicEventFilter, TypedEvent,
    TypedEventHandler, TypedSubscriber,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

type Log = Arc<Mutex<Vec<String>>>;

fn event(event_type: &str) -> Event {
    Event::new(event_type, "test/topic", serde_json::json!({}))
}

struct Ping;

impl TypedEvent for Ping {
    const EVENT_TYPE: &'static str = "Ping";

    fn from_event(_event: &Event) -> Result<Self> {
        Ok(Ping)
    }
}

struct Pong;

impl TypedEvent for Pong {
    const EVENT_TYPE: &'static str = "Pong";

    fn from_event(_event: &Event) -> Result<Self> {
        Ok(Pong)
    }
}

#[derive(Debug)]
struct LightChanged {
    light: String,
    on: bool,
}

impl TypedEvent for LightChanged {
    const EVENT_TYPE: &'static str = "LightChangedEvent";

    fn from_event(event: &Event) -> Result<Self> {
        Ok(Self {
            light: event.topic().to_string(),
            on: event.decode_payload()?,
        })
    }
}

/// Appends a fixed label to a shared log
struct Append {
    label: &'static str,
    log: Log,
}

impl<T> TypedEventHandler<T> for Append {
    fn receive_typed_event(&self, _event: T) -> Result<()> {
        self.log.lock().unwrap().push(self.label.to_string());
        Ok(())
    }
}

/// Subscriber counting deliveries per instance
struct Counter {
    types: EventTypes,
    hits: AtomicUsize,
}

impl Counter {
    fn new(types: EventTypes) -> Arc<Self> {
        Arc::new(Self {
            types,
            hits: AtomicUsize::new(0),
        })
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl EventSubscriber for Counter {
    fn subscribed_event_types(&self) -> &EventTypes {
        &self.types
    }

    fn receive(&self, _event: &Event) -> Result<()> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ─── Type Routing ────────────────────────────────────────────────

#[test]
fn test_ping_pong_scenario() {
    let bus = EventBus::new();
    let log: Log = Arc::default();

    let a1 = Arc::new(TypedSubscriber::<Ping, _>::new(Append {
        label: "A1",
        log: log.clone(),
    }));
    let a2 = Arc::new(TypedSubscriber::<Pong, _>::new(Append {
        label: "A2",
        log: log.clone(),
    }));
    bus.register(&a1);
    bus.register(&a2);

    bus.publish(&event("Ping")).unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["A1"]);

    bus.publish(&event("Pong")).unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["A1", "A2"]);
}

#[test]
fn test_multi_type_interest() {
    let bus = EventBus::new();
    let s = Counter::new(EventTypes::new(["A", "B"]).unwrap());
    bus.register(&s);

    bus.publish(&event("A")).unwrap();
    assert_eq!(s.hits(), 1);

    bus.publish(&event("C")).unwrap();
    assert_eq!(s.hits(), 1);

    bus.publish(&event("B")).unwrap();
    assert_eq!(s.hits(), 2);
}

#[test]
fn test_exactly_matching_subscribers_receive() {
    let bus = EventBus::new();
    let a = Counter::new(EventTypes::single("A"));
    let ab = Counter::new(EventTypes::new(["A", "B"]).unwrap());
    let b = Counter::new(EventTypes::single("B"));
    let filtered = Arc::new(
        FnSubscriber::new("never", EventTypes::single("A"), |_: &Event| {
            panic!("filter should have skipped this subscriber")
        })
        .with_filter(|_: &Event| false),
    );
    bus.register(&a);
    bus.register(&ab);
    bus.register(&b);
    bus.register(&filtered);

    let report = bus.publish(&event("A")).unwrap();
    assert_eq!(report.matched, 3);
    assert_eq!(report.delivered, 2);
    assert_eq!(report.filtered, 1);
    assert_eq!(report.failed, 0);

    assert_eq!(a.hits(), 1);
    assert_eq!(ab.hits(), 1);
    assert_eq!(b.hits(), 0);
}

#[test]
fn test_typed_subscriber_defaults() {
    let sub = TypedSubscriber::<LightChanged, _>::new(|_: LightChanged| -> Result<()> { Ok(()) });

    let types: Vec<&str> = sub.subscribed_event_types().iter().collect();
    assert_eq!(types, vec!["LightChangedEvent"]);
    assert!(sub.event_filter().is_none());
}

#[test]
fn test_typed_subscriber_receives_narrowed_event() {
    let bus = EventBus::new();
    let seen: Arc<Mutex<Vec<(String, bool)>>> = Arc::default();
    let sink = seen.clone();

    let sub = Arc::new(
        TypedSubscriber::<LightChanged, _>::new(move |e: LightChanged| -> Result<()> {
            sink.lock().unwrap().push((e.light, e.on));
            Ok(())
        })
        .with_filter(TopicEventFilter::new("lights/.*").unwrap()),
    );
    bus.register(&sub);

    bus.publish(&Event::new("LightChangedEvent", "lights/desk", serde_json::json!(true)))
        .unwrap();
    bus.publish(&Event::new("LightChangedEvent", "garage/door", serde_json::json!(true)))
        .unwrap();
    bus.publish(&Event::new("DoorOpenedEvent", "lights/desk", serde_json::json!(true)))
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![("lights/desk".to_string(), true)]);
    assert!(bus.recent_failures(10).is_empty());
}

#[test]
fn test_malformed_event_rejected() {
    let bus = EventBus::new();
    let s = Counter::new(EventTypes::all());
    bus.register(&s);

    let err = bus.publish(&event("")).unwrap_err();
    assert!(matches!(err, EventError::InvalidEvent(_)));
    assert_eq!(s.hits(), 0);
}

// ─── Registration Lifecycle ──────────────────────────────────────

#[test]
fn test_double_register_delivers_once() {
    let bus = EventBus::new();
    let s = Counter::new(EventTypes::single("A"));

    assert!(bus.register(&s));
    assert!(!bus.register(&s));

    bus.publish(&event("A")).unwrap();
    assert_eq!(s.hits(), 1);
}

#[test]
fn test_unregister_stops_delivery() {
    let bus = EventBus::new();
    let s = Counter::new(EventTypes::new(["A", "B"]).unwrap());
    bus.register(&s);
    bus.publish(&event("A")).unwrap();

    assert!(bus.unregister(&s));
    bus.publish(&event("A")).unwrap();
    bus.publish(&event("B")).unwrap();

    assert_eq!(s.hits(), 1);
    assert_eq!(bus.subscriber_count(), 0);
}

#[test]
fn test_reregister_after_unregister() {
    let bus = EventBus::new();
    let s = Counter::new(EventTypes::single("A"));

    bus.register(&s);
    bus.unregister(&s);
    assert!(bus.register(&s));

    bus.publish(&event("A")).unwrap();
    assert_eq!(s.hits(), 1);
}

#[test]
fn test_registration_during_dispatch_uses_snapshot() {
    let bus = Arc::new(EventBus::new());
    let late = Counter::new(EventTypes::single("A"));

    let registrar = {
        let bus = bus.clone();
        let late = late.clone();
        Arc::new(FnSubscriber::new(
            "registrar",
            EventTypes::single("A"),
            move |_: &Event| {
                bus.register(&late);
                Ok(())
            },
        ))
    };
    bus.register(&registrar);

    let report = bus.publish(&event("A")).unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(late.hits(), 0);
    assert!(bus.is_registered(&late));

    bus.publish(&event("A")).unwrap();
    assert_eq!(late.hits(), 1);
}

#[test]
fn test_unregister_during_dispatch() {
    let bus = Arc::new(EventBus::new());
    let victim = Counter::new(EventTypes::single("A"));

    let remover = {
        let bus = bus.clone();
        let victim = victim.clone();
        Arc::new(FnSubscriber::new(
            "remover",
            EventTypes::single("A"),
            move |_: &Event| {
                bus.unregister(&victim);
                Ok(())
            },
        ))
    };
    bus.register(&remover);
    bus.register(&victim);

    // The in-flight publish still sees the victim in its snapshot
    bus.publish(&event("A")).unwrap();
    assert_eq!(victim.hits(), 1);

    bus.publish(&event("A")).unwrap();
    assert_eq!(victim.hits(), 1);
}

#[test]
fn test_subscriber_unregisters_itself_during_dispatch() {
    struct OneShot {
        me: Weak<OneShot>,
        bus: Arc<EventBus>,
        types: EventTypes,
        hits: AtomicUsize,
    }

    impl EventSubscriber for OneShot {
        fn subscribed_event_types(&self) -> &EventTypes {
            &self.types
        }

        fn receive(&self, _event: &Event) -> Result<()> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            if let Some(me) = self.me.upgrade() {
                self.bus.unregister(&me);
            }
            Ok(())
        }
    }

    let bus = Arc::new(EventBus::new());
    let once = Arc::new_cyclic(|me| OneShot {
        me: me.clone(),
        bus: bus.clone(),
        types: EventTypes::single("A"),
        hits: AtomicUsize::new(0),
    });
    assert!(bus.register(&once));

    let report = bus.publish(&event("A")).unwrap();
    assert_eq!(report.delivered, 1);
    assert!(!bus.is_registered(&once));

    let report = bus.publish(&event("A")).unwrap();
    assert_eq!(report.matched, 0);
    assert_eq!(once.hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_subscriber_lifetime_belongs_to_registrant() {
    let bus = EventBus::new();
    let s = Counter::new(EventTypes::single("A"));
    bus.register(&s);
    assert_eq!(Arc::strong_count(&s), 1);

    drop(s);
    let report = bus.publish(&event("A")).unwrap();
    assert_eq!(report.matched, 0);
    assert_eq!(bus.stats().subscribers, 0);
}

// ─── Failure Isolation ───────────────────────────────────────────

#[test]
fn test_failing_subscriber_does_not_block_others() {
    let failures = Arc::new(MemoryFailureHandler::default());
    let bus = EventBus::new().with_failure_handler(failures.clone());

    let s1 = Arc::new(FnSubscriber::new("s1", EventTypes::single("A"), |_: &Event| {
        Err(EventError::subscriber("s1", "database unavailable"))
    }));
    let s2 = Counter::new(EventTypes::single("A"));
    bus.register(&s1);
    bus.register(&s2);

    let report = bus.publish(&event("A")).unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(s2.hits(), 1);

    assert_eq!(failures.count(), 1);
    let recorded = failures.list(1);
    assert_eq!(recorded[0].subscriber, "s1");
    assert_eq!(recorded[0].kind, FailureKind::Subscriber);
    assert!(recorded[0].reason.contains("database unavailable"));
}

#[test]
fn test_panicking_subscriber_and_filter_are_contained() {
    let bus = EventBus::new();

    let panicking_filter = Arc::new(
        FnSubscriber::new("bad-filter", EventTypes::single("A"), |_: &Event| Ok(()))
            .with_filter(|_: &Event| -> bool { panic!("filter blew up") }),
    );
    let panicking_receive = Arc::new(FnSubscriber::new(
        "bad-receive",
        EventTypes::single("A"),
        |_: &Event| panic!("receive blew up"),
    ));
    let healthy = Counter::new(EventTypes::single("A"));
    bus.register(&panicking_filter);
    bus.register(&panicking_receive);
    bus.register(&healthy);

    let report = bus.publish(&event("A")).unwrap();
    assert_eq!(report.failed, 2);
    assert_eq!(report.delivered, 1);
    assert_eq!(healthy.hits(), 1);

    let kinds: Vec<FailureKind> = bus.recent_failures(10).iter().map(|f| f.kind).collect();
    assert_eq!(kinds, vec![FailureKind::Panic, FailureKind::Panic]);
}

#[test]
fn test_decode_failure_reported_as_subscriber_failure() {
    let bus = EventBus::new();
    let sub = Arc::new(TypedSubscriber::<LightChanged, _>::new(
        |_: LightChanged| -> Result<()> { Ok(()) },
    ));
    bus.register(&sub);

    let report = bus
        .publish(&Event::new("LightChangedEvent", "lights/desk", serde_json::json!("bright")))
        .unwrap();
    assert_eq!(report.failed, 1);

    let failure = &bus.recent_failures(1)[0];
    assert_eq!(failure.kind, FailureKind::Subscriber);
    assert_eq!(failure.subscriber, "typed:LightChangedEvent");
}

#[test]
fn test_routing_mismatch_reported() {
    // A subscriber that lies about its interest set exposes the typed
    // adapter's tag check.
    struct Misrouted {
        types: EventTypes,
        inner: TypedSubscriber<Ping, fn(Ping) -> Result<()>>,
    }

    impl EventSubscriber for Misrouted {
        fn subscribed_event_types(&self) -> &EventTypes {
            &self.types
        }

        fn receive(&self, event: &Event) -> Result<()> {
            self.inner.receive(event)
        }
    }

    fn ignore(_: Ping) -> Result<()> {
        Ok(())
    }

    let seen: Arc<Mutex<Vec<DeliveryFailure>>> = Arc::default();
    let sink = seen.clone();
    let bus = EventBus::new().with_failure_handler(Arc::new(move |f: DeliveryFailure| {
        sink.lock().unwrap().push(f)
    }));

    let sub = Arc::new(Misrouted {
        types: EventTypes::single("Pong"),
        inner: TypedSubscriber::new(ignore as fn(Ping) -> Result<()>),
    });
    bus.register(&sub);
    bus.publish(&event("Pong")).unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].kind, FailureKind::RoutingMismatch);
    assert!(seen[0].reason.contains("Ping"));
}

#[test]
fn test_panic_never_reaches_later_subscribers_or_publisher() {
    let bus = EventBus::with_config(BusConfig::named("isolation")).unwrap();
    let first = Arc::new(FnSubscriber::new("first", EventTypes::single("A"), |_: &Event| {
        panic!("first subscriber exploded")
    }));
    let later = Counter::new(EventTypes::single("A"));
    bus.register(&first);
    bus.register(&later);

    let report = bus.publish(&event("A")).unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.delivered, 1);
    assert_eq!(later.hits(), 1);
}

#[test]
fn test_panicking_failure_handler_does_not_escape_publish() {
    let bus = EventBus::new().with_failure_handler(Arc::new(|_: DeliveryFailure| {
        panic!("failure handler exploded")
    }));
    let bad = Arc::new(FnSubscriber::new("bad", EventTypes::single("A"), |_: &Event| {
        Err(EventError::subscriber("bad", "boom"))
    }));
    let later = Counter::new(EventTypes::single("A"));
    bus.register(&bad);
    bus.register(&later);

    let report = bus.publish(&event("A")).unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(later.hits(), 1);
    assert_eq!(bus.recent_failures(10)[0].subscriber, "bad");
}

// ─── Channel Hand-off ────────────────────────────────────────────

#[tokio::test]
async fn test_channel_subscriber_hands_off_to_task() {
    let bus = Arc::new(EventBus::new());
    let (sub, mut rx) = bus.subscribe_channel("worker", EventTypes::single("Job"));

    let worker = tokio::spawn(async move {
        let mut ids = Vec::new();
        while let Some(event) = rx.recv().await {
            ids.push(event.payload()["id"].as_u64().unwrap());
        }
        ids
    });

    for id in 0..10u64 {
        bus.publish(&Event::new("Job", "jobs", serde_json::json!({"id": id})))
            .unwrap();
    }
    drop(sub);

    let ids = worker.await.unwrap();
    assert_eq!(ids, (0..10).collect::<Vec<_>>());
}

// ─── Concurrency ─────────────────────────────────────────────────

#[test]
fn test_concurrent_publish_from_threads() {
    let bus = Arc::new(EventBus::new());
    let s = Counter::new(EventTypes::single("A"));
    bus.register(&s);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let bus = bus.clone();
            std::thread::spawn(move || {
                for _ in 0..100 {
                    bus.publish(&event("A")).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(s.hits(), 800);
    let stats = bus.stats();
    assert_eq!(stats.published, 800);
    assert_eq!(stats.delivered, 800);
}

#[test]
fn test_concurrent_register_and_publish() {
    let bus = Arc::new(EventBus::new());
    let stable = Counter::new(EventTypes::single("A"));
    bus.register(&stable);

    let churn = {
        let bus = bus.clone();
        std::thread::spawn(move || {
            for _ in 0..200 {
                let transient = Counter::new(EventTypes::single("A"));
                bus.register(&transient);
                bus.unregister(&transient);
            }
        })
    };

    let publisher = {
        let bus = bus.clone();
        std::thread::spawn(move || {
            for _ in 0..200 {
                bus.publish(&event("A")).unwrap();
            }
        })
    };

    churn.join().unwrap();
    publisher.join().unwrap();

    assert_eq!(stable.hits(), 200);
    assert_eq!(bus.subscriber_count(), 1);
}

#[tokio::test]
async fn test_concurrent_publish_50_tasks() {
    let bus = Arc::new(EventBus::new());
    let s = Counter::new(EventTypes::all());
    bus.register(&s);

    let mut handles = Vec::new();
    for i in 0..50 {
        let bus = bus.clone();
        handles.push(tokio::spawn(async move {
            bus.publish(&Event::new(
                format!("Load{}", i % 5),
                format!("load/{}", i),
                serde_json::json!({"index": i}),
            ))
            .unwrap()
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().delivered, 1);
    }

    assert_eq!(s.hits(), 50);
    assert_eq!(bus.stats().failed, 0);
}
