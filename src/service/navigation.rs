//! Navigation resolver: resolves a url to a declared page and hands a
//! typed bundle to the host's [`Navigator`].

use std::fmt;
use std::sync::Arc;

use crate::domain::{
    Bundle, HostContext, ParameterBinder, Payload, Route, ServiceRegistry, TargetType,
};
use crate::error::{BusError, HandlerError, catch_handler};

/// How the host should present the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationMode {
    /// Plain navigation.
    Plain,
    /// Navigation that returns a result tagged with `request_code`.
    ForResult {
        /// Code the host echoes back with the result.
        request_code: i32,
    },
}

/// Everything the host needs to perform one navigation.
#[derive(Debug, Clone)]
pub struct NavigationRequest {
    /// Destination type.
    pub target: Arc<TargetType>,
    /// Declared page id.
    pub page: String,
    /// Typed values keyed by binding key.
    pub bundle: Bundle,
    /// Plain or result-returning.
    pub mode: NavigationMode,
}

/// Host-side navigation action.
pub trait Navigator: Send + Sync + fmt::Debug {
    /// Presents `request.target` from `context`.
    ///
    /// # Errors
    ///
    /// Returns a [`HandlerError`] if the host cannot perform the
    /// navigation; the resolver logs it.
    fn navigate(
        &self,
        context: &dyn HostContext,
        request: NavigationRequest,
    ) -> Result<(), HandlerError>;
}

/// Resolve-bind-hand-off pipeline for `open`.
#[derive(Debug, Clone)]
pub struct NavigationResolver {
    registry: Arc<ServiceRegistry>,
    navigator: Option<Arc<dyn Navigator>>,
}

impl NavigationResolver {
    /// Creates a resolver; without a navigator every `open` is a contract
    /// violation.
    #[must_use]
    pub fn new(registry: Arc<ServiceRegistry>, navigator: Option<Arc<dyn Navigator>>) -> Self {
        Self {
            registry,
            navigator,
        }
    }

    /// Opens the page addressed by `url`.
    ///
    /// With no payload every bundle field must be nullable and the bundle
    /// is empty.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::ContractViolation`] if no [`Navigator`] was
    /// configured. Resolution, binding and navigator failures are logged
    /// and navigation is skipped.
    pub fn open(
        &self,
        context: &dyn HostContext,
        url: &str,
        payload: Option<&Payload>,
    ) -> Result<(), BusError> {
        match self.try_open(context, url, payload) {
            Ok(()) => Ok(()),
            Err(error) if error.is_fatal() => Err(error),
            Err(error) => {
                tracing::error!(url, code = error.error_code(), %error, "open failed");
                Ok(())
            }
        }
    }

    /// Builds the request `open` would hand to the navigator.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Resolution`] if the url does not name a declared
    /// page, or [`BusError::Binding`] if the payload does not satisfy the
    /// bundle fields.
    pub fn resolve(
        &self,
        context: &dyn HostContext,
        url: &str,
        payload: Option<&Payload>,
    ) -> Result<NavigationRequest, BusError> {
        let route = Route::parse(url)?;
        let (service, page) = self.registry.resolve_page(&route)?;

        let bundle = match payload {
            Some(payload) => ParameterBinder::bundle(&page.bundle, Some(payload))?,
            None => {
                if let Some(field) = ParameterBinder::first_required(&page.bundle) {
                    return Err(BusError::Binding(format!(
                        "page `{route}` requires field id `{}` (key `{}`) but no payload was given",
                        field.id, field.key
                    )));
                }
                Bundle::default()
            }
        };

        let mode = match page.result_request_code() {
            Some(request_code) if context.supports_result() => {
                NavigationMode::ForResult { request_code }
            }
            _ => NavigationMode::Plain,
        };

        Ok(NavigationRequest {
            target: Arc::clone(&service.target),
            page: page.id.clone(),
            bundle,
            mode,
        })
    }

    fn try_open(
        &self,
        context: &dyn HostContext,
        url: &str,
        payload: Option<&Payload>,
    ) -> Result<(), BusError> {
        let navigator = self.navigator.as_ref().ok_or_else(|| {
            BusError::ContractViolation(format!(
                "open(`{url}`) called on a bus without a navigator"
            ))
        })?;
        let request = self.resolve(context, url, payload)?;

        tracing::debug!(url, target = request.target.name(), mode = ?request.mode, "navigating");
        catch_handler(|| navigator.navigate(context, request)).map_err(BusError::HandlerInvocation)
    }
}
