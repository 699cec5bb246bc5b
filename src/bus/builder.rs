//! Step-by-step construction of an [`EventBus`].

use std::sync::Arc;

use tokio::runtime::Handle;

use super::EventBus;
use super::poster::{AsyncPoster, BackgroundPoster, UiQueue, UiThread};
use crate::config::BusConfig;
use crate::domain::{ServiceRecord, ServiceRegistry, TargetCatalog};
use crate::error::BusError;
use crate::service::{NavigationResolver, Navigator};

/// Builder for [`EventBus`].
///
/// Every part is optional:
/// - no [`UiThread`]: a [`UiQueue`] owned by the building thread is used
///   and exposed through [`EventBus::ui_queue`];
/// - no runtime handle: the current tokio runtime is used if there is one,
///   otherwise the bus owns a runtime sized from the [`BusConfig`];
/// - no navigator: `open` reports a contract violation.
#[derive(Debug, Default)]
pub struct EventBusBuilder {
    config: BusConfig,
    ui: Option<Arc<dyn UiThread>>,
    runtime: Option<Handle>,
    records: Vec<ServiceRecord>,
    catalog: TargetCatalog,
    navigator: Option<Arc<dyn Navigator>>,
}

impl EventBusBuilder {
    /// Replaces the configuration.
    #[must_use]
    pub fn config(mut self, config: BusConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets whether posts without subscribers are logged.
    #[must_use]
    pub const fn log_no_subscriber_messages(mut self, enabled: bool) -> Self {
        self.config.log_no_subscriber_messages = enabled;
        self
    }

    /// Uses the host's UI thread.
    #[must_use]
    pub fn ui_thread(mut self, ui: Arc<dyn UiThread>) -> Self {
        self.ui = Some(ui);
        self
    }

    /// Runs parallel deliveries on `handle`'s blocking pool.
    #[must_use]
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Adds one declared service.
    #[must_use]
    pub fn service(mut self, record: ServiceRecord) -> Self {
        self.records.push(record);
        self
    }

    /// Adds declared services.
    #[must_use]
    pub fn services(mut self, records: impl IntoIterator<Item = ServiceRecord>) -> Self {
        self.records.extend(records);
        self
    }

    /// Sets the target types the service declarations refer to.
    #[must_use]
    pub fn targets(mut self, catalog: TargetCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Sets the host navigation action used by `open`.
    #[must_use]
    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Validates the service declarations and starts the delivery threads.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Config`] if a service declaration is invalid or
    /// a delivery thread or runtime cannot be started.
    pub fn build(self) -> Result<EventBus, BusError> {
        let registry = Arc::new(ServiceRegistry::load(self.records, &self.catalog)?);

        let (ui, ui_queue) = match self.ui {
            Some(ui) => (ui, None),
            None => {
                let queue = Arc::new(UiQueue::for_current_thread());
                let ui: Arc<dyn UiThread> = Arc::<UiQueue>::clone(&queue);
                (ui, Some(queue))
            }
        };

        let background = BackgroundPoster::start(&self.config.background_thread_name)?;
        let pool = match self.runtime.or_else(|| Handle::try_current().ok()) {
            Some(handle) => AsyncPoster::borrowed(handle),
            None => AsyncPoster::owned(&self.config)?,
        };

        let navigation = NavigationResolver::new(Arc::clone(&registry), self.navigator);
        tracing::info!(
            services = registry.len(),
            background_thread = %self.config.background_thread_name,
            "event bus built"
        );
        Ok(EventBus::from_parts(
            self.config,
            ui,
            ui_queue,
            background,
            pool,
            registry,
            navigation,
        ))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{Arguments, MethodRecord, Operation, Payload, TargetType};

    #[test]
    fn invalid_services_fail_the_build() {
        let result = EventBus::builder()
            .service(ServiceRecord::new("login", "Unknown"))
            .build();
        assert!(matches!(result, Err(BusError::Config(_))));
    }

    #[test]
    fn services_are_loaded_against_the_catalog() {
        let mut catalog = TargetCatalog::new();
        let ping = Operation::new("ping", Vec::new(), |_: &Arguments<'_>| Ok(()));
        let Ok(()) = catalog.register(Arc::new(TargetType::service("Plug").operation(ping))) else {
            panic!("fresh catalog");
        };
        let Ok(bus) = EventBus::builder()
            .targets(catalog)
            .service(ServiceRecord::new("net", "Plug").method(MethodRecord::new("p", "ping")))
            .log_no_subscriber_messages(false)
            .build()
        else {
            panic!("valid declarations");
        };
        assert_eq!(bus.services().len(), 1);
        assert!(!bus.config().log_no_subscriber_messages);
        assert!(bus.call("net/p", &Payload::new()).is_ok());
    }

    #[tokio::test]
    async fn inside_a_runtime_the_current_handle_is_borrowed() {
        let Ok(bus) = EventBus::builder().build() else {
            panic!("default bus builds");
        };
        bus.shutdown();
    }
}
