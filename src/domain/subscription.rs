//! Priority-ordered subscriber lists per event type.
//!
//! [`SubscriptionRegistry`] keeps, for every event type, an ordered list
//! of [`HandlerBinding`]s (descending priority, insertion order among
//! equals) plus a reverse index from subscriber to its event types for
//! bulk unregistration.
//!
//! # Concurrency
//!
//! - All mutations and queries take one lock.
//! - Each per-event-type list is copy-on-write behind an `Arc`; fan-out
//!   clones the `Arc` under the lock and iterates outside it, so removals
//!   never disturb an iteration in progress.
//! - Unregistration clears each binding's `active` flag before removing
//!   it, which lets already-queued deliveries notice and drop themselves.

use std::any::type_name;
use std::cell::Cell;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{BindingId, Payload};
use crate::error::{BusError, HandlerError, catch_handler};

/// Delivery scheduling policy of a binding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadMode {
    /// Runs on the posting thread.
    #[default]
    Immediate,
    /// Runs on the UI thread: inline if posted there, queued otherwise.
    UiAffine,
    /// Runs off the UI thread, serialized with every other background
    /// delivery: queued if posted on the UI thread, inline otherwise.
    Background,
    /// Always queued to the worker pool; no ordering guarantee.
    Parallel,
}

/// Identity of a registered subscriber instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(usize);

impl SubscriberId {
    /// Identity of the instance behind `subscriber`.
    #[must_use]
    pub fn of<S: ?Sized>(subscriber: &Arc<S>) -> Self {
        Self(Arc::as_ptr(subscriber).cast::<()>() as usize)
    }
}

/// An event as seen by a handler.
#[derive(Debug)]
pub struct Event<'a> {
    event_type: &'a str,
    payload: &'a Payload,
    cancel: Option<&'a Cell<bool>>,
}

impl<'a> Event<'a> {
    /// Event seen during the synchronous fan-out on the posting thread.
    pub(crate) const fn inline(
        event_type: &'a str,
        payload: &'a Payload,
        cancel: &'a Cell<bool>,
    ) -> Self {
        Self {
            event_type,
            payload,
            cancel: Some(cancel),
        }
    }

    /// Event delivered from a queue on another thread.
    pub(crate) const fn deferred(event_type: &'a str, payload: &'a Payload) -> Self {
        Self {
            event_type,
            payload,
            cancel: None,
        }
    }

    /// Event type the event was posted to.
    #[must_use]
    pub const fn event_type(&self) -> &str {
        self.event_type
    }

    /// Posted payload.
    #[must_use]
    pub const fn payload(&self) -> &Payload {
        self.payload
    }

    /// Returns `true` if the event arrived through a delivery queue.
    #[must_use]
    pub const fn is_deferred(&self) -> bool {
        self.cancel.is_none()
    }

    /// Stops delivery of this event to the remaining bindings of the
    /// current synchronous fan-out.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::ContractViolation`] when called from a deferred
    /// delivery, which has no fan-out to cancel.
    pub fn cancel_delivery(&self) -> Result<(), BusError> {
        match self.cancel {
            Some(flag) => {
                flag.set(true);
                Ok(())
            }
            None => Err(BusError::ContractViolation(format!(
                "cancel_delivery called outside the posting fan-out of `{}`",
                self.event_type
            ))),
        }
    }
}

/// Signature of a subscriber handler operation.
pub type HandlerFn<S> = fn(&S, &Event<'_>) -> Result<(), HandlerError>;

/// One declared handler operation of a subscriber.
pub struct HandlerSpec<S> {
    event_type: String,
    priority: i32,
    thread_mode: ThreadMode,
    handler: HandlerFn<S>,
}

impl<S> HandlerSpec<S> {
    /// Declares `handler` for `event_type` with priority 0 and
    /// [`ThreadMode::Immediate`].
    pub fn new(event_type: impl Into<String>, handler: HandlerFn<S>) -> Self {
        Self {
            event_type: event_type.into(),
            priority: 0,
            thread_mode: ThreadMode::Immediate,
            handler,
        }
    }

    /// Sets the priority; higher runs first.
    #[must_use]
    pub const fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the thread mode.
    #[must_use]
    pub const fn thread_mode(mut self, thread_mode: ThreadMode) -> Self {
        self.thread_mode = thread_mode;
        self
    }
}

impl<S> fmt::Debug for HandlerSpec<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerSpec")
            .field("event_type", &self.event_type)
            .field("priority", &self.priority)
            .field("thread_mode", &self.thread_mode)
            .finish_non_exhaustive()
    }
}

/// A type that receives events.
///
/// [`Subscriber::handlers`] is the explicit replacement for scanning a type
/// for annotated handler methods: it lists one [`HandlerSpec`] per handler.
pub trait Subscriber: Send + Sync + Sized + 'static {
    /// Declared handler operations.
    fn handlers(&self) -> Vec<HandlerSpec<Self>>;
}

type ErasedHandler = Box<dyn Fn(&Event<'_>) -> Result<(), HandlerError> + Send + Sync>;

/// One subscriber's registered handler for one event type.
pub struct HandlerBinding {
    id: BindingId,
    subscriber: SubscriberId,
    subscriber_name: &'static str,
    event_type: String,
    priority: i32,
    thread_mode: ThreadMode,
    active: AtomicBool,
    handler: ErasedHandler,
}

impl HandlerBinding {
    /// Binds `spec` to the subscriber instance.
    pub(crate) fn new<S: Subscriber>(subscriber: &Arc<S>, spec: HandlerSpec<S>) -> Self {
        let target = Arc::clone(subscriber);
        let handler = spec.handler;
        Self {
            id: BindingId::new(),
            subscriber: SubscriberId::of(subscriber),
            subscriber_name: type_name::<S>(),
            event_type: spec.event_type,
            priority: spec.priority,
            thread_mode: spec.thread_mode,
            active: AtomicBool::new(true),
            handler: Box::new(move |event: &Event<'_>| handler(&target, event)),
        }
    }

    /// Binding identifier.
    #[must_use]
    pub const fn id(&self) -> BindingId {
        self.id
    }

    /// Owning subscriber.
    #[must_use]
    pub const fn subscriber(&self) -> SubscriberId {
        self.subscriber
    }

    /// Event type this binding listens to.
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Priority; higher runs first.
    #[must_use]
    pub const fn priority(&self) -> i32 {
        self.priority
    }

    /// Thread mode.
    #[must_use]
    pub const fn thread_mode(&self) -> ThreadMode {
        self.thread_mode
    }

    /// Returns `false` once the subscriber has been unregistered.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Runs the handler if the binding is still active. Failures and
    /// panics are logged and contained.
    pub(crate) fn invoke(&self, event: &Event<'_>) {
        if !self.is_active() {
            tracing::debug!(
                binding = %self.id,
                event_type = event.event_type(),
                "binding inactive, delivery dropped"
            );
            return;
        }
        if let Err(error) = catch_handler(|| (self.handler)(event)) {
            tracing::error!(
                binding = %self.id,
                subscriber = self.subscriber_name,
                event_type = event.event_type(),
                %error,
                "subscriber handler failed"
            );
        }
    }
}

impl fmt::Debug for HandlerBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerBinding")
            .field("id", &self.id)
            .field("subscriber", &self.subscriber_name)
            .field("event_type", &self.event_type)
            .field("priority", &self.priority)
            .field("thread_mode", &self.thread_mode)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

/// Immutable view of one event type's bindings, in delivery order.
pub type BindingList = Arc<Vec<Arc<HandlerBinding>>>;

#[derive(Debug, Default)]
struct RegistryState {
    by_event_type: HashMap<String, BindingList>,
    by_subscriber: HashMap<SubscriberId, Vec<String>>,
}

/// Event-type-to-bindings table with a per-subscriber reverse index.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    state: Mutex<RegistryState>,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every binding of one subscriber.
    ///
    /// Each binding is inserted before the first existing entry with a
    /// strictly lower priority. The call is all-or-nothing.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::DuplicateBinding`] if the subscriber is already
    /// bound to one of the event types, or lists an event type twice.
    pub fn register(&self, bindings: Vec<HandlerBinding>) -> Result<(), BusError> {
        let mut state = self.state.lock();

        for (index, binding) in bindings.iter().enumerate() {
            let already_bound = state
                .by_subscriber
                .get(&binding.subscriber)
                .is_some_and(|types| types.contains(&binding.event_type));
            let listed_twice = bindings
                .iter()
                .take(index)
                .any(|earlier| earlier.event_type == binding.event_type);
            if already_bound || listed_twice {
                return Err(BusError::DuplicateBinding {
                    subscriber: binding.subscriber_name.to_string(),
                    event_type: binding.event_type.clone(),
                });
            }
        }

        for binding in bindings {
            let binding = Arc::new(binding);
            state
                .by_subscriber
                .entry(binding.subscriber)
                .or_default()
                .push(binding.event_type.clone());

            let list = state
                .by_event_type
                .entry(binding.event_type.clone())
                .or_default();
            let list = Arc::make_mut(list);
            let position = list
                .iter()
                .position(|existing| existing.priority < binding.priority)
                .unwrap_or(list.len());
            list.insert(position, binding);
        }
        Ok(())
    }

    /// Deactivates and removes every binding of `subscriber`.
    ///
    /// Returns `false`, after logging a warning, if the subscriber was
    /// never registered.
    pub fn unregister(&self, subscriber: SubscriberId, subscriber_name: &str) -> bool {
        let mut state = self.state.lock();
        let Some(event_types) = state.by_subscriber.remove(&subscriber) else {
            tracing::warn!(
                subscriber = subscriber_name,
                "subscriber to unregister was not registered before"
            );
            return false;
        };

        for event_type in event_types {
            let Entry::Occupied(mut entry) = state.by_event_type.entry(event_type) else {
                continue;
            };
            let list = Arc::make_mut(entry.get_mut());
            list.retain(|binding| {
                if binding.subscriber == subscriber {
                    binding.deactivate();
                    false
                } else {
                    true
                }
            });
            if list.is_empty() {
                entry.remove();
            }
        }
        true
    }

    /// Returns `true` if `subscriber` has at least one binding.
    #[must_use]
    pub fn is_registered(&self, subscriber: SubscriberId) -> bool {
        self.state.lock().by_subscriber.contains_key(&subscriber)
    }

    /// Returns `true` if at least one binding listens to `event_type`.
    #[must_use]
    pub fn has_subscribers_for(&self, event_type: &str) -> bool {
        self.state
            .lock()
            .by_event_type
            .get(event_type)
            .is_some_and(|list| !list.is_empty())
    }

    /// Stable snapshot of the bindings for `event_type`.
    #[must_use]
    pub fn snapshot(&self, event_type: &str) -> Option<BindingList> {
        self.state.lock().by_event_type.get(event_type).map(Arc::clone)
    }
}
