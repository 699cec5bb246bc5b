//! # switchyard
//!
//! In-process event bus with a declarative service registry.
//!
//! Producers address consumers by string instead of by reference:
//! `post` fans an event out to subscribers in priority order, `call`
//! resolves a url to a declared method and invokes it with arguments
//! bound from a key-value payload, and `open` resolves a url to a declared
//! page and hands a typed bundle to the host's navigator.
//!
//! ## Architecture
//!
//! ```text
//! Producers (post / call / open)
//!     │
//!     ├── EventBus (bus/)
//!     │     ├── PostingTable      per-thread drain loop
//!     │     └── UI queue · background thread · worker pool
//!     │
//!     ├── CallInvoker · NavigationResolver (service/)
//!     │
//!     ├── SubscriptionRegistry (domain/)
//!     ├── ServiceRegistry + TargetCatalog (domain/)
//!     └── ParameterBinder + ValueType coercion (domain/)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use switchyard::bus::EventBus;
//! use switchyard::domain::{Event, HandlerSpec, Payload, Subscriber};
//! use switchyard::error::HandlerError;
//!
//! #[derive(Debug)]
//! struct Greeter;
//!
//! impl Greeter {
//!     fn greet(&self, event: &Event<'_>) -> Result<(), HandlerError> {
//!         println!("hello {:?}", event.payload().get("name"));
//!         Ok(())
//!     }
//! }
//!
//! impl Subscriber for Greeter {
//!     fn handlers(&self) -> Vec<HandlerSpec<Self>> {
//!         vec![HandlerSpec::new("greet", Self::greet)]
//!     }
//! }
//!
//! # fn main() -> Result<(), switchyard::error::BusError> {
//! let bus = EventBus::builder().build()?;
//! bus.register(&Arc::new(Greeter))?;
//! bus.post("greet", Payload::new().with("name", "ada"));
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
