//! Target types and their invocable operations.
//!
//! A [`TargetType`] is an explicit table of [`Operation`]s, each declaring
//! an ordered list of [`Slot`]s. Types may extend a parent; operation
//! lookup scans the type first, then each ancestor in turn.
//!
//! ## Slot rules
//!
//! - A leading run of capability slots ([`Slot::Context`],
//!   [`Slot::Callback`]) is filled from the call site.
//! - Every following slot must be [`Slot::Bound`] to a data key declared
//!   on the method; a capability slot after a bound slot is a structural
//!   reject.
//! - An operation is an exact match when its bound slots cover every
//!   declared data field exactly once.
//!
//! [`plan_call`] applies these rules once per method and produces a
//! [`CallPlan`]: the selected body plus a slot-to-field map.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::capability::{CallCallback, HostContext};
use super::service::DataSpec;
use super::value::{BoundValue, FromBound};
use crate::error::{BusError, HandlerError};

/// One declared parameter slot of an [`Operation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    /// Receives the caller's [`HostContext`].
    Context,
    /// Receives the caller's [`CallCallback`].
    Callback,
    /// Receives the payload value whose data key equals this name
    /// (case-insensitive).
    Bound(String),
}

impl Slot {
    /// Shorthand for [`Slot::Bound`].
    pub fn bound(key: impl Into<String>) -> Self {
        Self::Bound(key.into())
    }
}

/// Body of an operation.
pub type OperationBody = Arc<dyn Fn(&Arguments<'_>) -> Result<(), HandlerError> + Send + Sync>;

/// A named, invocable entry of a [`TargetType`].
#[derive(Clone)]
pub struct Operation {
    name: String,
    slots: Vec<Slot>,
    body: OperationBody,
}

impl Operation {
    /// Declares an operation with its slot list and body.
    pub fn new<F>(name: impl Into<String>, slots: impl IntoIterator<Item = Slot>, body: F) -> Self
    where
        F: Fn(&Arguments<'_>) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            slots: slots.into_iter().collect(),
            body: Arc::new(body),
        }
    }

    /// Operation name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared slots, in order.
    #[must_use]
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("slots", &self.slots)
            .finish_non_exhaustive()
    }
}

/// A type exposing operations to `call` and acting as a navigation target.
pub struct TargetType {
    name: String,
    parent: Option<Arc<TargetType>>,
    service_host: bool,
    operations: Vec<Operation>,
}

impl TargetType {
    /// Declares a plain type. It may back pages but not methods.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            service_host: false,
            operations: Vec::new(),
        }
    }

    /// Declares a type allowed to back service methods.
    pub fn service(name: impl Into<String>) -> Self {
        Self {
            service_host: true,
            ..Self::new(name)
        }
    }

    /// Sets the parent whose operations are inherited.
    #[must_use]
    pub fn extends(mut self, parent: Arc<Self>) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Adds an operation.
    #[must_use]
    pub fn operation(mut self, operation: Operation) -> Self {
        self.operations.push(operation);
        self
    }

    /// Type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` if the type may back service methods.
    #[must_use]
    pub const fn is_service_host(&self) -> bool {
        self.service_host
    }

    /// Operations declared directly on this type.
    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// This type followed by each ancestor, nearest first.
    pub fn lineage(&self) -> impl Iterator<Item = &Self> {
        std::iter::successors(Some(self), |ty| ty.parent.as_deref())
    }

    /// Returns `true` if this type or an ancestor declares an operation
    /// named `name`.
    #[must_use]
    pub fn has_operation(&self, name: &str) -> bool {
        self.lineage()
            .flat_map(|ty| ty.operations.iter())
            .any(|op| op.name == name)
    }
}

impl fmt::Debug for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetType")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.name.as_str()))
            .field("service_host", &self.service_host)
            .field("operations", &self.operations)
            .finish()
    }
}

/// Name-indexed set of target types available to the service registry.
#[derive(Debug, Default)]
pub struct TargetCatalog {
    types: HashMap<String, Arc<TargetType>>,
}

impl TargetCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a type under its name.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Config`] if a type with the same name is
    /// already present.
    pub fn register(&mut self, ty: Arc<TargetType>) -> Result<(), BusError> {
        if self.types.contains_key(&ty.name) {
            return Err(BusError::Config(format!(
                "target type `{}` registered twice",
                ty.name
            )));
        }
        self.types.insert(ty.name.clone(), ty);
        Ok(())
    }

    /// Looks up a type by exact name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<TargetType>> {
        self.types.get(name)
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns `true` if no type is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// One argument handed to an operation body.
#[derive(Debug)]
pub enum Argument<'a> {
    /// Caller context, if one was supplied.
    Context(Option<&'a dyn HostContext>),
    /// Caller callback, if one was supplied.
    Callback(Option<Arc<dyn CallCallback>>),
    /// Coerced payload value; `None` for a null nullable field.
    Value(Option<BoundValue>),
}

/// Ordered arguments for one operation invocation.
#[derive(Debug)]
pub struct Arguments<'a> {
    operation: &'a str,
    slots: Vec<Argument<'a>>,
}

impl<'a> Arguments<'a> {
    /// Number of argument slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if the operation takes no arguments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot(&self, index: usize) -> Result<&Argument<'a>, HandlerError> {
        self.slots.get(index).ok_or_else(|| {
            HandlerError::Signature(format!(
                "{} has no argument slot {index} ({} declared)",
                self.operation,
                self.slots.len()
            ))
        })
    }

    /// Reads the context slot at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::Signature`] if the slot is missing or is not
    /// a context slot.
    pub fn context(&self, index: usize) -> Result<Option<&'a dyn HostContext>, HandlerError> {
        match self.slot(index)? {
            Argument::Context(context) => Ok(*context),
            _ => Err(self.mismatch(index, "context")),
        }
    }

    /// Reads the callback slot at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::Signature`] if the slot is missing or is not
    /// a callback slot.
    pub fn callback(&self, index: usize) -> Result<Option<Arc<dyn CallCallback>>, HandlerError> {
        match self.slot(index)? {
            Argument::Callback(callback) => Ok(callback.as_ref().map(Arc::clone)),
            _ => Err(self.mismatch(index, "callback")),
        }
    }

    /// Reads and converts the value slot at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::Signature`] if the slot is missing, is not a
    /// value slot, or holds a value of another type.
    pub fn value<T: FromBound>(&self, index: usize) -> Result<T, HandlerError> {
        match self.slot(index)? {
            Argument::Value(value) => T::from_bound(value.as_ref()).map_err(|reason| {
                HandlerError::Signature(format!(
                    "{} argument {index}: {reason}",
                    self.operation
                ))
            }),
            _ => Err(self.mismatch(index, "value")),
        }
    }

    fn mismatch(&self, index: usize, wanted: &str) -> HandlerError {
        HandlerError::Signature(format!(
            "{} argument {index} is not a {wanted} slot",
            self.operation
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlannedSlot {
    Context,
    Callback,
    Data(usize),
}

/// A resolved operation plus the mapping from its slots to data fields.
pub struct CallPlan {
    owner: String,
    operation: String,
    slots: Vec<PlannedSlot>,
    body: OperationBody,
}

impl CallPlan {
    /// `Owner::operation`, for diagnostics.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}::{}", self.owner, self.operation)
    }

    /// Builds the argument list from call-site capabilities and values
    /// bound in data-field order.
    #[must_use]
    pub fn arguments<'a>(
        &'a self,
        context: Option<&'a dyn HostContext>,
        callback: Option<&Arc<dyn CallCallback>>,
        values: &[Option<BoundValue>],
    ) -> Arguments<'a> {
        let slots = self
            .slots
            .iter()
            .map(|slot| match slot {
                PlannedSlot::Context => Argument::Context(context),
                PlannedSlot::Callback => Argument::Callback(callback.map(Arc::clone)),
                PlannedSlot::Data(index) => Argument::Value(values.get(*index).cloned().flatten()),
            })
            .collect();
        Arguments {
            operation: &self.operation,
            slots,
        }
    }

    /// Runs the body, converting a panic into [`HandlerError::Panicked`].
    ///
    /// # Errors
    ///
    /// Returns whatever the body returns, or the caught panic.
    pub fn invoke(&self, arguments: &Arguments<'_>) -> Result<(), HandlerError> {
        crate::error::catch_handler(|| (self.body)(arguments))
    }
}

impl fmt::Debug for CallPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallPlan")
            .field("owner", &self.owner)
            .field("operation", &self.operation)
            .field("slots", &self.slots)
            .finish_non_exhaustive()
    }
}

/// Outcome of classifying one candidate operation.
enum Candidate {
    Exact(Vec<PlannedSlot>),
    Partial,
    Rejected,
}

fn classify(operation: &Operation, data: &[DataSpec]) -> Candidate {
    let mut planned = Vec::with_capacity(operation.slots.len());
    let mut covered = vec![false; data.len()];
    let mut bound_slots = 0_usize;
    let mut in_capabilities = true;

    for slot in &operation.slots {
        match slot {
            Slot::Context | Slot::Callback if !in_capabilities => return Candidate::Rejected,
            Slot::Context => planned.push(PlannedSlot::Context),
            Slot::Callback => planned.push(PlannedSlot::Callback),
            Slot::Bound(key) => {
                in_capabilities = false;
                let Some(index) = data.iter().position(|d| d.key.eq_ignore_ascii_case(key)) else {
                    return Candidate::Rejected;
                };
                if let Some(flag) = covered.get_mut(index) {
                    *flag = true;
                }
                bound_slots += 1;
                planned.push(PlannedSlot::Data(index));
            }
        }
    }

    if bound_slots == data.len() && covered.iter().all(|c| *c) {
        Candidate::Exact(planned)
    } else {
        Candidate::Partial
    }
}

/// Resolves `method_name` against `target` and its ancestors.
///
/// The first exact match in lineage order wins. If none exists, every
/// structurally valid but incomplete candidate is listed in the error.
pub(crate) fn plan_call(
    target: &TargetType,
    method_name: &str,
    data: &[DataSpec],
) -> Result<CallPlan, String> {
    let mut partial = Vec::new();

    for ty in target.lineage() {
        for operation in ty.operations.iter().filter(|op| op.name == method_name) {
            match classify(operation, data) {
                Candidate::Exact(slots) => {
                    return Ok(CallPlan {
                        owner: ty.name.clone(),
                        operation: operation.name.clone(),
                        slots,
                        body: Arc::clone(&operation.body),
                    });
                }
                Candidate::Partial => {
                    partial.push(format!("{}::{}{:?}", ty.name, operation.name, operation.slots));
                }
                Candidate::Rejected => {}
            }
        }
    }

    if partial.is_empty() {
        Err(format!(
            "no operation `{method_name}` on `{}` accepts the declared data {:?}",
            target.name,
            data.iter().map(|d| d.key.as_str()).collect::<Vec<_>>()
        ))
    } else {
        Err(format!(
            "declared data count {} does not match any `{method_name}` candidate on `{}`: {}",
            data.len(),
            target.name,
            partial.join(", ")
        ))
    }
}
