//! The dispatcher: posting loop, thread-mode routing, call and open.
//!
//! [`EventBus`] ties the subscription registry, the per-thread posting
//! table and the three deferred delivery paths together, and fronts the
//! [`CallInvoker`] and [`NavigationResolver`] for url-addressed requests.
//!
//! # Routing
//!
//! | mode        | posted on the UI thread | posted elsewhere   |
//! |-------------|-------------------------|--------------------|
//! | immediate   | invoke now              | invoke now         |
//! | ui-affine   | invoke now              | UI queue           |
//! | background  | background queue        | invoke now         |
//! | parallel    | worker pool             | worker pool        |

use std::cell::Cell;
use std::sync::Arc;

use super::EventBusBuilder;
use super::poster::{AsyncPoster, BackgroundPoster, Delivery, UiQueue, UiThread};
use super::posting::{PendingEvent, PostingTable};
use crate::config::BusConfig;
use crate::domain::{
    CallCallback, Event, HandlerBinding, HostContext, Payload, ServiceRegistry, Subscriber,
    SubscriberId, SubscriptionRegistry, ThreadMode,
};
use crate::error::BusError;
use crate::service::{CallInvoker, NavigationResolver};

/// In-process event bus with url-addressed call and navigation.
///
/// Built with [`EventBus::builder`] and shared by `Arc`; there is no
/// global instance.
#[derive(Debug)]
pub struct EventBus {
    config: BusConfig,
    subscriptions: SubscriptionRegistry,
    posting: PostingTable,
    ui: Arc<dyn UiThread>,
    ui_queue: Option<Arc<UiQueue>>,
    background: BackgroundPoster,
    pool: AsyncPoster,
    invoker: CallInvoker,
    navigation: NavigationResolver,
}

impl EventBus {
    /// Starts building a bus.
    #[must_use]
    pub fn builder() -> EventBusBuilder {
        EventBusBuilder::default()
    }

    pub(crate) fn from_parts(
        config: BusConfig,
        ui: Arc<dyn UiThread>,
        ui_queue: Option<Arc<UiQueue>>,
        background: BackgroundPoster,
        pool: AsyncPoster,
        registry: Arc<ServiceRegistry>,
        navigation: NavigationResolver,
    ) -> Self {
        Self {
            config,
            subscriptions: SubscriptionRegistry::new(),
            posting: PostingTable::new(),
            ui,
            ui_queue,
            background,
            pool,
            invoker: CallInvoker::new(registry),
            navigation,
        }
    }

    /// Configuration the bus was built with.
    #[must_use]
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// The bundled UI queue, when no host [`UiThread`] was supplied.
    #[must_use]
    pub fn ui_queue(&self) -> Option<&Arc<UiQueue>> {
        self.ui_queue.as_ref()
    }

    /// Loaded service declarations.
    #[must_use]
    pub fn services(&self) -> &ServiceRegistry {
        self.invoker.registry()
    }

    /// Registers every handler `subscriber` declares.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::DuplicateBinding`] if the subscriber is already
    /// bound to one of the event types, or
    /// [`BusError::ContractViolation`] if it declares no handlers.
    pub fn register<S: Subscriber>(&self, subscriber: &Arc<S>) -> Result<(), BusError> {
        let specs = subscriber.handlers();
        if specs.is_empty() {
            return Err(BusError::ContractViolation(format!(
                "{} declares no handlers",
                std::any::type_name::<S>()
            )));
        }
        let bindings = specs
            .into_iter()
            .map(|spec| HandlerBinding::new(subscriber, spec))
            .collect();
        self.subscriptions.register(bindings)?;
        tracing::debug!(subscriber = std::any::type_name::<S>(), "subscriber registered");
        Ok(())
    }

    /// Removes every binding of `subscriber`. Queued deliveries to it are
    /// dropped. Unknown subscribers are logged and ignored.
    pub fn unregister<S: Subscriber>(&self, subscriber: &Arc<S>) {
        self.subscriptions
            .unregister(SubscriberId::of(subscriber), std::any::type_name::<S>());
    }

    /// Returns `true` if `subscriber` has live bindings.
    #[must_use]
    pub fn is_registered<S: Subscriber>(&self, subscriber: &Arc<S>) -> bool {
        self.subscriptions.is_registered(SubscriberId::of(subscriber))
    }

    /// Returns `true` if at least one binding listens to `event_type`.
    #[must_use]
    pub fn has_subscribers_for(&self, event_type: &str) -> bool {
        self.subscriptions.has_subscribers_for(event_type)
    }

    /// Posts an event.
    ///
    /// On an idle thread this drains the thread's queue before returning,
    /// including every event handlers post while it runs. Inside a handler
    /// it only enqueues.
    pub fn post(&self, event_type: &str, payload: Payload) {
        let Some(drain) = self.posting.enqueue(PendingEvent::new(event_type, payload)) else {
            return;
        };
        while let Some(event) = drain.next_event() {
            self.fan_out(&event);
        }
    }

    fn fan_out(&self, event: &PendingEvent) {
        let Some(bindings) = self.subscriptions.snapshot(&event.event_type) else {
            if self.config.log_no_subscriber_messages {
                tracing::debug!(
                    event_type = %event.event_type,
                    "no subscribers registered for event"
                );
            }
            return;
        };

        let on_ui_thread = self.ui.is_ui_thread();
        let cancelled = Cell::new(false);
        for binding in bindings.iter() {
            if cancelled.get() {
                tracing::debug!(event_type = %event.event_type, "delivery cancelled");
                break;
            }
            self.route(binding, event, on_ui_thread, &cancelled);
        }
    }

    fn route(
        &self,
        binding: &Arc<HandlerBinding>,
        event: &PendingEvent,
        on_ui_thread: bool,
        cancelled: &Cell<bool>,
    ) {
        match (binding.thread_mode(), on_ui_thread) {
            (ThreadMode::Immediate, _)
            | (ThreadMode::UiAffine, true)
            | (ThreadMode::Background, false) => {
                binding.invoke(&Event::inline(&event.event_type, &event.payload, cancelled));
            }
            (ThreadMode::UiAffine, false) => self.ui.enqueue(Delivery::new(binding, event)),
            (ThreadMode::Background, true) => {
                self.background.enqueue(Delivery::new(binding, event));
            }
            (ThreadMode::Parallel, _) => self.pool.spawn(Delivery::new(binding, event)),
        }
    }

    /// Calls the method addressed by `url` without a callback; failures
    /// are logged.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::ContractViolation`] if the target reads an
    /// argument slot as something other than what it declared.
    pub fn call(&self, url: &str, payload: &Payload) -> Result<(), BusError> {
        self.invoker.call(None, url, payload, None)
    }

    /// Calls the method addressed by `url`, reporting failures to
    /// `callback`.
    ///
    /// # Errors
    ///
    /// Same as [`EventBus::call`].
    pub fn call_with_callback(
        &self,
        url: &str,
        payload: &Payload,
        callback: Arc<dyn CallCallback>,
    ) -> Result<(), BusError> {
        self.invoker.call(None, url, payload, Some(&callback))
    }

    /// Calls the method addressed by `url` with a caller context and an
    /// optional callback.
    ///
    /// # Errors
    ///
    /// Same as [`EventBus::call`].
    pub fn call_with_context(
        &self,
        context: &dyn HostContext,
        url: &str,
        payload: &Payload,
        callback: Option<Arc<dyn CallCallback>>,
    ) -> Result<(), BusError> {
        self.invoker.call(Some(context), url, payload, callback.as_ref())
    }

    /// Opens the page addressed by `url`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::ContractViolation`] if the bus has no
    /// navigator. Other failures are logged and navigation is skipped.
    pub fn open(
        &self,
        context: &dyn HostContext,
        url: &str,
        payload: Option<&Payload>,
    ) -> Result<(), BusError> {
        self.navigation.open(context, url, payload)
    }

    /// Stops accepting background deliveries and waits for the queued
    /// ones to finish. Later background deliveries are dropped.
    pub fn shutdown(&self) {
        tracing::info!("event bus shutting down");
        self.background.shutdown();
    }
}
