//! Call invoker: resolves a url to a declared method and invokes it.

use std::sync::Arc;

use crate::domain::{
    CallCallback, HostContext, ParameterBinder, Payload, Route, ServiceRegistry,
};
use crate::error::{BusError, HandlerError, catch_handler};

/// Resolve-bind-invoke pipeline for `call`.
///
/// Every call follows the same steps: parse the url → resolve the service
/// and method → fetch the cached call plan → bind the payload → invoke.
/// Only fatal errors are returned; everything else goes to the callback's
/// failure channel, or to the log when there is no callback.
#[derive(Debug, Clone)]
pub struct CallInvoker {
    registry: Arc<ServiceRegistry>,
}

impl CallInvoker {
    /// Creates a new `CallInvoker` over a loaded registry.
    #[must_use]
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self { registry }
    }

    /// Returns a reference to the inner [`ServiceRegistry`].
    #[must_use]
    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// Calls the method addressed by `url`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::ContractViolation`] when the resolved operation
    /// reads its arguments with a signature other than the one it
    /// declared. Resolution, binding and handler failures are reported,
    /// not returned.
    pub fn call(
        &self,
        context: Option<&dyn HostContext>,
        url: &str,
        payload: &Payload,
        callback: Option<&Arc<dyn CallCallback>>,
    ) -> Result<(), BusError> {
        match self.try_call(context, url, payload, callback) {
            Ok(()) => Ok(()),
            Err(error) if error.is_fatal() => Err(error),
            Err(error) => {
                report_failure(url, payload, callback, &error);
                Ok(())
            }
        }
    }

    fn try_call(
        &self,
        context: Option<&dyn HostContext>,
        url: &str,
        payload: &Payload,
        callback: Option<&Arc<dyn CallCallback>>,
    ) -> Result<(), BusError> {
        let route = Route::parse(url)?;
        let (service, method) = self.registry.resolve_method(&route)?;
        let plan = method.plan(&service.target)?;
        let values = ParameterBinder::bind(&method.data, Some(payload))?;
        let arguments = plan.arguments(context, callback, &values);

        tracing::debug!(%route, operation = %plan.qualified_name(), "invoking call target");
        plan.invoke(&arguments).map_err(|error| match error {
            HandlerError::Signature(reason) => BusError::ContractViolation(format!(
                "{} read its arguments incorrectly: {reason}",
                plan.qualified_name()
            )),
            other => BusError::HandlerInvocation(other),
        })
    }
}

fn report_failure(
    url: &str,
    payload: &Payload,
    callback: Option<&Arc<dyn CallCallback>>,
    error: &BusError,
) {
    let Some(callback) = callback else {
        tracing::error!(url, code = error.error_code(), %error, "call failed");
        return;
    };
    tracing::debug!(url, code = error.error_code(), %error, "call failed, notifying callback");
    let delivered = catch_handler(|| {
        callback.on_failure(payload, error);
        Ok(())
    });
    if let Err(panic) = delivered {
        tracing::error!(url, %panic, "call failure callback panicked");
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{
        Arguments, FieldRecord, MethodRecord, Operation, ServiceRecord, Slot, TargetCatalog,
        TargetType,
    };
    use parking_lot::Mutex;

    #[derive(Debug, Default)]
    struct Recorder {
        successes: Mutex<Vec<Payload>>,
        failures: Mutex<Vec<u32>>,
    }

    impl CallCallback for Recorder {
        fn on_success(&self, result: Payload) {
            self.successes.lock().push(result);
        }

        fn on_failure(&self, _request: &Payload, error: &BusError) {
            self.failures.lock().push(error.error_code());
        }
    }

    fn invoker() -> CallInvoker {
        let echo = Operation::new(
            "echo",
            [Slot::Callback, Slot::bound("text")],
            |args: &Arguments<'_>| {
                let text: String = args.value(1)?;
                if let Some(callback) = args.callback(0)? {
                    callback.on_success(Payload::new().with("echo", text));
                }
                Ok(())
            },
        );
        let fail = Operation::new("fail", Vec::new(), |_: &Arguments<'_>| {
            Err(HandlerError::failed("refused"))
        });
        let misread = Operation::new(
            "misread",
            [Slot::bound("text")],
            |args: &Arguments<'_>| args.value::<i32>(0).map(|_| ()),
        );

        let mut catalog = TargetCatalog::new();
        let plug = TargetType::service("Plug")
            .operation(echo)
            .operation(fail)
            .operation(misread);
        let Ok(()) = catalog.register(Arc::new(plug)) else {
            panic!("fresh catalog");
        };
        let record = ServiceRecord::new("tools", "Plug")
            .method(
                MethodRecord::new("echo", "echo")
                    .data(FieldRecord::new("t", "text", "String", false)),
            )
            .method(MethodRecord::new("fail", "fail"))
            .method(
                MethodRecord::new("misread", "misread")
                    .data(FieldRecord::new("t", "text", "String", false)),
            );
        let Ok(registry) = ServiceRegistry::load([record], &catalog) else {
            panic!("records are valid");
        };
        CallInvoker::new(Arc::new(registry))
    }

    fn recorder() -> (Arc<Recorder>, Arc<dyn CallCallback>) {
        let recorder = Arc::new(Recorder::default());
        let callback: Arc<dyn CallCallback> = Arc::<Recorder>::clone(&recorder);
        (recorder, callback)
    }

    #[test]
    fn successful_call_reaches_the_callback() {
        let (recorder, callback) = recorder();
        let payload = Payload::new().with("t", "hi");
        let result = invoker().call(None, "tools/echo", &payload, Some(&callback));
        assert!(result.is_ok());
        let successes = recorder.successes.lock();
        assert_eq!(successes.len(), 1);
        assert_eq!(
            successes.first().and_then(|p| p.get("echo")).and_then(|v| v.as_str()),
            Some("hi")
        );
        assert!(recorder.failures.lock().is_empty());
    }

    #[test]
    fn unresolvable_url_is_reported_not_returned() {
        let (recorder, callback) = recorder();
        let invoker = invoker();
        for url in ["nowhere/echo", "tools/missing", "no-slash"] {
            assert!(invoker.call(None, url, &Payload::new(), Some(&callback)).is_ok());
        }
        assert_eq!(*recorder.failures.lock(), vec![2001, 2001, 2001]);
    }

    #[test]
    fn binding_failure_skips_the_target() {
        let (recorder, callback) = recorder();
        assert!(invoker().call(None, "tools/echo", &Payload::new(), Some(&callback)).is_ok());
        assert_eq!(*recorder.failures.lock(), vec![3001]);
        assert!(recorder.successes.lock().is_empty());
    }

    #[test]
    fn target_failure_is_a_handler_error() {
        let (recorder, callback) = recorder();
        assert!(invoker().call(None, "tools/fail", &Payload::new(), Some(&callback)).is_ok());
        assert_eq!(*recorder.failures.lock(), vec![4001]);
    }

    #[test]
    fn failure_without_callback_is_only_logged() {
        assert!(invoker().call(None, "tools/fail", &Payload::new(), None).is_ok());
    }

    #[test]
    fn misread_signature_is_a_contract_violation() {
        let (recorder, callback) = recorder();
        let payload = Payload::new().with("t", "text");
        let result = invoker().call(None, "tools/misread", &payload, Some(&callback));
        assert!(matches!(result, Err(BusError::ContractViolation(_))));
        assert!(recorder.failures.lock().is_empty());
    }
}
