//! Deferred delivery paths.
//!
//! A [`Delivery`] is one binding's share of one posted event, handed to a
//! queue instead of being invoked on the posting thread:
//!
//! - UI-affine deliveries go to the host's [`UiThread`] ([`UiQueue`] is the
//!   bundled implementation).
//! - Background deliveries go to a single named thread that runs them one
//!   at a time, in enqueue order.
//! - Parallel deliveries go to the tokio blocking pool.
//!
//! Every path re-checks the binding's active flag right before running.

use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::Mutex;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::mpsc;

use super::posting::PendingEvent;
use crate::config::BusConfig;
use crate::domain::{Event, HandlerBinding, Payload};
use crate::error::BusError;

/// One binding's pending delivery of one event.
pub struct Delivery {
    binding: Arc<HandlerBinding>,
    event_type: Arc<str>,
    payload: Arc<Payload>,
}

impl Delivery {
    pub(crate) fn new(binding: &Arc<HandlerBinding>, event: &PendingEvent) -> Self {
        Self {
            binding: Arc::clone(binding),
            event_type: Arc::clone(&event.event_type),
            payload: Arc::clone(&event.payload),
        }
    }

    /// Binding the delivery is addressed to.
    #[must_use]
    pub fn binding(&self) -> &HandlerBinding {
        &self.binding
    }

    /// Event type of the delivered event.
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Invokes the handler, unless the binding was deactivated since the
    /// delivery was queued.
    pub fn run(self) {
        self.binding
            .invoke(&Event::deferred(&self.event_type, &self.payload));
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("binding", &self.binding.id())
            .field("event_type", &self.event_type)
            .finish_non_exhaustive()
    }
}

/// Host UI thread as seen by the bus.
pub trait UiThread: Send + Sync + fmt::Debug {
    /// Returns `true` if the calling thread is the UI thread.
    fn is_ui_thread(&self) -> bool;

    /// Queues `delivery` to run on the UI thread, in enqueue order.
    fn enqueue(&self, delivery: Delivery);
}

/// A [`UiThread`] bound to the thread that created it.
///
/// The owning thread drains queued deliveries with
/// [`UiQueue::run_pending`], typically once per turn of its event loop.
#[derive(Debug)]
pub struct UiQueue {
    owner: ThreadId,
    sender: mpsc::UnboundedSender<Delivery>,
    receiver: Mutex<mpsc::UnboundedReceiver<Delivery>>,
}

impl UiQueue {
    /// Creates a queue owned by the calling thread.
    #[must_use]
    pub fn for_current_thread() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            owner: thread::current().id(),
            sender,
            receiver: Mutex::new(receiver),
        }
    }

    /// Runs every delivery queued so far, plus any queued while running.
    /// Returns how many ran or were dropped as inactive.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::ContractViolation`] if called from a thread
    /// other than the owner.
    pub fn run_pending(&self) -> Result<usize, BusError> {
        if !self.is_ui_thread() {
            return Err(BusError::ContractViolation(
                "UiQueue drained from a thread other than its owner".to_string(),
            ));
        }
        let mut count = 0_usize;
        loop {
            // Pop outside the handler call so handlers may enqueue more.
            let next = self.receiver.lock().try_recv();
            let Ok(delivery) = next else {
                break;
            };
            delivery.run();
            count = count.saturating_add(1);
        }
        Ok(count)
    }
}

impl UiThread for UiQueue {
    fn is_ui_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    fn enqueue(&self, delivery: Delivery) {
        // The receiver lives as long as `self`, so sending cannot fail.
        let _ = self.sender.send(delivery);
    }
}

/// Single named thread running background deliveries serially.
#[derive(Debug)]
pub(crate) struct BackgroundPoster {
    sender: Mutex<Option<mpsc::UnboundedSender<Delivery>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundPoster {
    /// Spawns the background thread.
    pub(crate) fn start(name: &str) -> Result<Self, BusError> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Delivery>();
        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while let Some(delivery) = receiver.blocking_recv() {
                    delivery.run();
                }
                tracing::debug!("background poster stopped");
            })
            .map_err(|e| {
                BusError::Config(format!("cannot spawn background thread `{name}`: {e}"))
            })?;
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    pub(crate) fn enqueue(&self, delivery: Delivery) {
        match self.sender.lock().as_ref() {
            Some(sender) => {
                if let Err(rejected) = sender.send(delivery) {
                    tracing::warn!(
                        delivery = ?rejected.0,
                        "background poster gone, delivery dropped"
                    );
                }
            }
            None => {
                tracing::debug!(delivery = ?delivery, "bus shut down, background delivery dropped");
            }
        }
    }

    /// Closes the queue and waits for queued deliveries to finish.
    pub(crate) fn shutdown(&self) {
        self.sender.lock().take();
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        if worker.thread().id() == thread::current().id() {
            // Called from a background handler; the loop ends once it returns.
            return;
        }
        if worker.join().is_err() {
            tracing::error!("background poster thread panicked");
        }
    }
}

impl Drop for BackgroundPoster {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Worker pool for parallel deliveries.
#[derive(Debug)]
pub(crate) struct AsyncPoster {
    handle: Handle,
    owned: Option<Runtime>,
}

impl AsyncPoster {
    /// Spawns onto an existing runtime.
    pub(crate) const fn borrowed(handle: Handle) -> Self {
        Self {
            handle,
            owned: None,
        }
    }

    /// Builds a dedicated runtime sized from `config`.
    pub(crate) fn owned(config: &BusConfig) -> Result<Self, BusError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads)
            .max_blocking_threads(config.max_blocking_threads)
            .thread_name(format!("{}-pool", config.background_thread_name))
            .build()
            .map_err(|e| BusError::Config(format!("cannot build delivery runtime: {e}")))?;
        Ok(Self {
            handle: runtime.handle().clone(),
            owned: Some(runtime),
        })
    }

    pub(crate) fn spawn(&self, delivery: Delivery) {
        drop(self.handle.spawn_blocking(move || delivery.run()));
    }
}

impl Drop for AsyncPoster {
    fn drop(&mut self) {
        if let Some(runtime) = self.owned.take() {
            runtime.shutdown_background();
        }
    }
}
