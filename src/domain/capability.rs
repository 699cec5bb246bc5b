//! Capabilities the bus hands to target operations besides payload values.
//!
//! A target operation may declare leading slots for a [`HostContext`] (the
//! caller's environment) and a [`CallCallback`] (the reply channel). Both
//! are supplied at the call site, never taken from the payload.

use std::any::Any;
use std::fmt;

use super::Payload;
use crate::error::BusError;

/// Caller environment passed to `call` and `open`.
///
/// The bus only needs to know whether the caller can receive a result from
/// a navigation; hosts downcast through [`HostContext::as_any`] for
/// anything richer.
pub trait HostContext: Send + Sync + fmt::Debug {
    /// Returns `true` if the caller supports result-returning navigation.
    fn supports_result(&self) -> bool {
        false
    }

    /// Upcast for host-side downcasting.
    fn as_any(&self) -> &dyn Any;
}

/// Reply channel for `call`.
///
/// Target operations report success themselves by calling
/// [`CallCallback::on_success`]. The bus calls [`CallCallback::on_failure`]
/// when resolution, binding or the target body fails.
pub trait CallCallback: Send + Sync + fmt::Debug {
    /// The target completed and produced `result`.
    fn on_success(&self, result: Payload);

    /// The call failed; `request` is the payload the call was made with.
    fn on_failure(&self, request: &Payload, error: &BusError);
}
