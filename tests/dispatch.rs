//! Posting, ordering and thread-mode delivery through the public API.

#![allow(clippy::panic)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use switchyard::bus::{EventBus, UiThread};
use switchyard::config::BusConfig;
use switchyard::domain::{Event, HandlerSpec, Payload, Subscriber, ThreadMode};
use switchyard::error::HandlerError;

fn bus() -> Arc<EventBus> {
    let config = BusConfig {
        background_thread_name: "dispatch-bg".to_string(),
        ..BusConfig::default()
    };
    let Ok(bus) = EventBus::builder().config(config).build() else {
        panic!("default bus builds");
    };
    Arc::new(bus)
}

fn wait_until(condition: impl Fn() -> bool) -> bool {
    for _ in 0..400 {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[derive(Debug, Default)]
struct Journal(Mutex<Vec<String>>);

impl Journal {
    fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

/// Re-posts `second` from inside its `first` handler.
#[derive(Debug)]
struct Chain {
    bus: OnceLock<Arc<EventBus>>,
    journal: Arc<Journal>,
}

impl Chain {
    fn first(&self, _: &Event<'_>) -> Result<(), HandlerError> {
        self.journal.push("first:start");
        if let Some(bus) = self.bus.get() {
            bus.post("second", Payload::new());
        }
        self.journal.push("first:end");
        Ok(())
    }

    fn second(&self, _: &Event<'_>) -> Result<(), HandlerError> {
        self.journal.push("second");
        Ok(())
    }
}

impl Subscriber for Chain {
    fn handlers(&self) -> Vec<HandlerSpec<Self>> {
        vec![
            HandlerSpec::new("first", Self::first),
            HandlerSpec::new("second", Self::second),
        ]
    }
}

#[test]
fn nested_posts_are_drained_after_the_current_event() {
    let bus = bus();
    let journal = Arc::new(Journal::default());
    let chain = Arc::new(Chain {
        bus: OnceLock::new(),
        journal: Arc::clone(&journal),
    });
    let _ = chain.bus.set(Arc::clone(&bus));
    assert!(bus.register(&chain).is_ok());

    bus.post("first", Payload::new());
    assert_eq!(journal.entries(), vec!["first:start", "first:end", "second"]);

    bus.unregister(&chain);
}

/// Cancels the fan-out when the payload asks for it.
#[derive(Debug)]
struct Gate {
    journal: Arc<Journal>,
}

impl Gate {
    fn guard(&self, event: &Event<'_>) -> Result<(), HandlerError> {
        self.journal.push("guard");
        if event.payload().get("stop").and_then(serde_json::Value::as_bool) == Some(true) {
            event.cancel_delivery().map_err(|e| HandlerError::failed(e.to_string()))?;
        }
        Ok(())
    }
}

impl Subscriber for Gate {
    fn handlers(&self) -> Vec<HandlerSpec<Self>> {
        vec![HandlerSpec::new("door", Self::guard).priority(100)]
    }
}

#[derive(Debug)]
struct Visitor {
    journal: Arc<Journal>,
}

impl Visitor {
    fn enter(&self, _: &Event<'_>) -> Result<(), HandlerError> {
        self.journal.push("visitor");
        Ok(())
    }
}

impl Subscriber for Visitor {
    fn handlers(&self) -> Vec<HandlerSpec<Self>> {
        vec![HandlerSpec::new("door", Self::enter)]
    }
}

#[test]
fn cancel_stops_only_the_current_event() {
    let bus = bus();
    let journal = Arc::new(Journal::default());
    assert!(bus.register(&Arc::new(Gate { journal: Arc::clone(&journal) })).is_ok());
    assert!(bus.register(&Arc::new(Visitor { journal: Arc::clone(&journal) })).is_ok());

    bus.post("door", Payload::new().with("stop", true));
    assert_eq!(journal.entries(), vec!["guard"]);

    bus.post("door", Payload::new());
    assert_eq!(journal.entries(), vec!["guard", "guard", "visitor"]);
}

/// Sees the door first but only on the UI thread.
#[derive(Debug)]
struct Lookout {
    journal: Arc<Journal>,
}

impl Lookout {
    fn watch(&self, _: &Event<'_>) -> Result<(), HandlerError> {
        self.journal.push("lookout");
        Ok(())
    }
}

impl Subscriber for Lookout {
    fn handlers(&self) -> Vec<HandlerSpec<Self>> {
        vec![
            HandlerSpec::new("door", Self::watch)
                .priority(200)
                .thread_mode(ThreadMode::UiAffine),
        ]
    }
}

#[test]
fn cancel_leaves_already_queued_deliveries_alone() {
    let bus = bus();
    let journal = Arc::new(Journal::default());
    assert!(bus.register(&Arc::new(Lookout { journal: Arc::clone(&journal) })).is_ok());
    assert!(bus.register(&Arc::new(Gate { journal: Arc::clone(&journal) })).is_ok());
    assert!(bus.register(&Arc::new(Visitor { journal: Arc::clone(&journal) })).is_ok());

    let poster = Arc::clone(&bus);
    let posted = thread::spawn(move || poster.post("door", Payload::new().with("stop", true)));
    assert!(posted.join().is_ok());
    assert_eq!(journal.entries(), vec!["guard"]);

    let Some(queue) = bus.ui_queue() else {
        panic!("default bus has a UI queue");
    };
    assert!(matches!(queue.run_pending(), Ok(1)));
    assert_eq!(journal.entries(), vec!["guard", "lookout"]);
}

/// Cancels the current door event and posts a fresh one in its place.
#[derive(Debug)]
struct Relay {
    bus: OnceLock<Arc<EventBus>>,
    journal: Arc<Journal>,
}

impl Relay {
    fn redirect(&self, event: &Event<'_>) -> Result<(), HandlerError> {
        self.journal.push("relay");
        if event.payload().get("stop").and_then(serde_json::Value::as_bool) == Some(true) {
            event.cancel_delivery().map_err(|e| HandlerError::failed(e.to_string()))?;
            if let Some(bus) = self.bus.get() {
                bus.post("door", Payload::new());
            }
        }
        Ok(())
    }
}

impl Subscriber for Relay {
    fn handlers(&self) -> Vec<HandlerSpec<Self>> {
        vec![HandlerSpec::new("door", Self::redirect).priority(100)]
    }
}

#[test]
fn event_posted_by_a_cancelling_handler_reaches_everyone() {
    let bus = bus();
    let journal = Arc::new(Journal::default());
    let relay = Arc::new(Relay {
        bus: OnceLock::new(),
        journal: Arc::clone(&journal),
    });
    let _ = relay.bus.set(Arc::clone(&bus));
    assert!(bus.register(&relay).is_ok());
    assert!(bus.register(&Arc::new(Visitor { journal: Arc::clone(&journal) })).is_ok());

    bus.post("door", Payload::new().with("stop", true));
    assert_eq!(journal.entries(), vec!["relay", "relay", "visitor"]);

    bus.unregister(&relay);
}

/// Fails or panics before lower-priority bindings run.
#[derive(Debug)]
struct Faulty {
    panics: bool,
}

impl Faulty {
    fn explode(&self, _: &Event<'_>) -> Result<(), HandlerError> {
        if self.panics {
            panic!("handler blew up");
        }
        Err(HandlerError::failed("handler refused"))
    }
}

impl Subscriber for Faulty {
    fn handlers(&self) -> Vec<HandlerSpec<Self>> {
        vec![HandlerSpec::new("door", Self::explode).priority(50)]
    }
}

#[test]
fn failing_handlers_do_not_abort_the_fan_out() {
    let bus = bus();
    let journal = Arc::new(Journal::default());
    assert!(bus.register(&Arc::new(Faulty { panics: false })).is_ok());
    assert!(bus.register(&Arc::new(Faulty { panics: true })).is_ok());
    assert!(bus.register(&Arc::new(Visitor { journal: Arc::clone(&journal) })).is_ok());

    bus.post("door", Payload::new());
    assert_eq!(journal.entries(), vec!["visitor"]);
}

/// Counts deliveries per mode and remembers the delivering thread.
#[derive(Debug)]
struct Tally {
    mode: ThreadMode,
    hits: AtomicUsize,
    threads: Mutex<Vec<Option<String>>>,
}

impl Tally {
    fn new(mode: ThreadMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            hits: AtomicUsize::new(0),
            threads: Mutex::new(Vec::new()),
        })
    }

    fn hit(&self, _: &Event<'_>) -> Result<(), HandlerError> {
        self.threads
            .lock()
            .push(thread::current().name().map(str::to_string));
        self.hits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Subscriber for Tally {
    fn handlers(&self) -> Vec<HandlerSpec<Self>> {
        vec![HandlerSpec::new("tick", Self::hit).thread_mode(self.mode)]
    }
}

#[test]
fn ui_affine_posts_from_other_threads_wait_for_the_ui_queue() {
    let bus = bus();
    let tally = Tally::new(ThreadMode::UiAffine);
    assert!(bus.register(&tally).is_ok());

    // Posted on the UI thread: invoked inline.
    bus.post("tick", Payload::new());
    assert_eq!(tally.hits(), 1);

    let poster = Arc::clone(&bus);
    let posted = thread::spawn(move || poster.post("tick", Payload::new())).join();
    assert!(posted.is_ok());
    assert_eq!(tally.hits(), 1);

    let Some(queue) = bus.ui_queue() else {
        panic!("default bus has a UI queue");
    };
    assert!(queue.is_ui_thread());
    assert!(matches!(queue.run_pending(), Ok(1)));
    assert_eq!(tally.hits(), 2);
}

#[test]
fn queued_delivery_is_dropped_after_unregister() {
    let bus = bus();
    let tally = Tally::new(ThreadMode::UiAffine);
    assert!(bus.register(&tally).is_ok());

    let poster = Arc::clone(&bus);
    assert!(thread::spawn(move || poster.post("tick", Payload::new())).join().is_ok());
    bus.unregister(&tally);

    let Some(queue) = bus.ui_queue() else {
        panic!("default bus has a UI queue");
    };
    assert!(matches!(queue.run_pending(), Ok(1)));
    assert_eq!(tally.hits(), 0);
}

#[test]
fn background_mode_leaves_the_ui_thread_and_stays_serial() {
    let bus = bus();
    let tally = Tally::new(ThreadMode::Background);
    assert!(bus.register(&tally).is_ok());

    for _ in 0..5 {
        bus.post("tick", Payload::new());
    }
    bus.shutdown();
    assert_eq!(tally.hits(), 5);
    assert!(
        tally
            .threads
            .lock()
            .iter()
            .all(|name| name.as_deref() == Some("dispatch-bg"))
    );

    // Off the UI thread, background mode runs on the posting thread.
    let bus = self::bus();
    let tally = Tally::new(ThreadMode::Background);
    assert!(bus.register(&tally).is_ok());
    let poster = Arc::clone(&bus);
    let posted = thread::Builder::new()
        .name("worker-poster".to_string())
        .spawn(move || poster.post("tick", Payload::new()));
    let Ok(posted) = posted else {
        panic!("thread spawn");
    };
    assert!(posted.join().is_ok());
    assert_eq!(tally.hits(), 1);
    assert_eq!(
        tally.threads.lock().first().cloned().flatten().as_deref(),
        Some("worker-poster")
    );
}

#[test]
fn parallel_mode_always_goes_to_the_pool() {
    let bus = bus();
    let tally = Tally::new(ThreadMode::Parallel);
    assert!(bus.register(&tally).is_ok());

    bus.post("tick", Payload::new());
    bus.post("tick", Payload::new());
    assert!(wait_until(|| tally.hits() == 2));
    let threads = tally.threads.lock();
    let main = thread::current().name().map(str::to_string);
    assert!(threads.iter().all(|name| *name != main));
}

#[test]
fn priority_order_holds_regardless_of_registration_order() {
    let bus = bus();
    let journal = Arc::new(Journal::default());
    assert!(bus.register(&Arc::new(Visitor { journal: Arc::clone(&journal) })).is_ok());
    assert!(bus.register(&Arc::new(Gate { journal: Arc::clone(&journal) })).is_ok());

    bus.post("door", Payload::new());
    assert_eq!(journal.entries(), vec!["guard", "visitor"]);
    assert!(bus.has_subscribers_for("door"));
    assert!(!bus.has_subscribers_for("window"));
    bus.post("window", Payload::new());
}
