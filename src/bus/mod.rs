//! Dispatch layer: the event bus and its delivery queues.
//!
//! [`EventBus`] is built through [`EventBusBuilder`]. Posting state is kept
//! per thread in `posting`; deferred deliveries travel through the queues
//! in `poster`.

pub mod builder;
pub mod event_bus;
pub mod poster;
mod posting;

pub use builder::EventBusBuilder;
pub use event_bus::EventBus;
pub use poster::{Delivery, UiQueue, UiThread};
