//! Domain layer: payloads, service declarations, and subscriptions.
//!
//! This module contains the bus's data model: the event [`Payload`], the
//! declarative [`ServiceRegistry`] built from [`ServiceRecord`]s against a
//! [`TargetCatalog`], the [`ParameterBinder`] that turns payload entries
//! into typed arguments, and the [`SubscriptionRegistry`] holding
//! priority-ordered handler bindings.

pub mod binder;
pub mod binding_id;
pub mod capability;
pub mod payload;
pub mod records;
pub mod service;
pub mod service_registry;
pub mod subscription;
pub mod target;
pub mod value;

pub use binder::{Bundle, ParameterBinder};
pub use binding_id::BindingId;
pub use capability::{CallCallback, HostContext};
pub use payload::Payload;
pub use records::{FieldRecord, MethodRecord, PageRecord, ServiceRecord};
pub use service::{DataSpec, MethodSpec, PageSpec, Route, Service};
pub use service_registry::ServiceRegistry;
pub use subscription::{
    BindingList, Event, HandlerBinding, HandlerFn, HandlerSpec, Subscriber, SubscriberId,
    SubscriptionRegistry, ThreadMode,
};
pub use target::{
    Argument, Arguments, CallPlan, Operation, OperationBody, Slot, TargetCatalog, TargetType,
};
pub use value::{BoundValue, CoercionError, FromBound, Structured, ValueType};
