//! switchyard demo entry point.
//!
//! Builds a bus from the environment, loads declared services from
//! `SWITCHYARD_SERVICE_CONFIG` if set, registers a logging subscriber and
//! posts a startup event.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use switchyard::bus::EventBus;
use switchyard::config::BusConfig;
use switchyard::domain::{
    Arguments, Event, HandlerSpec, Operation, Payload, ServiceRecord, Slot, Subscriber,
    TargetCatalog, TargetType, ThreadMode,
};
use switchyard::error::HandlerError;

/// Target types service declarations may refer to.
fn demo_targets() -> Result<TargetCatalog, switchyard::error::BusError> {
    let print = Operation::new("print", [Slot::bound("message")], |args: &Arguments<'_>| {
        let message: String = args.value(0)?;
        tracing::info!(%message, "console");
        Ok(())
    });
    let mut catalog = TargetCatalog::new();
    catalog.register(Arc::new(TargetType::service("Console").operation(print)))?;
    Ok(catalog)
}

#[derive(Debug)]
struct LifecycleLogger;

impl LifecycleLogger {
    fn on_started(&self, event: &Event<'_>) -> Result<(), HandlerError> {
        tracing::info!(
            event_type = event.event_type(),
            payload = %serde_json::Value::from(event.payload().clone()),
            "lifecycle event"
        );
        Ok(())
    }

    fn on_started_background(&self, event: &Event<'_>) -> Result<(), HandlerError> {
        tracing::info!(
            event_type = event.event_type(),
            thread = std::thread::current().name().unwrap_or("unnamed"),
            "lifecycle event (background)"
        );
        Ok(())
    }
}

impl Subscriber for LifecycleLogger {
    fn handlers(&self) -> Vec<HandlerSpec<Self>> {
        vec![
            HandlerSpec::new("app/started", Self::on_started).priority(10),
            HandlerSpec::new("app/started/background", Self::on_started_background)
                .thread_mode(ThreadMode::Background),
        ]
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = BusConfig::from_env();
    let records: Vec<ServiceRecord> = match &config.service_config_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading service declarations");
            serde_json::from_str(&std::fs::read_to_string(path)?)?
        }
        None => Vec::new(),
    };

    // Build the bus
    let bus = EventBus::builder()
        .config(config)
        .targets(demo_targets()?)
        .services(records)
        .build()?;
    tracing::info!(services = bus.services().len(), "starting switchyard");

    let logger = Arc::new(LifecycleLogger);
    bus.register(&logger)?;

    bus.post("app/started", Payload::new().with("pid", std::process::id()));
    bus.post("app/started/background", Payload::new());
    if let Some(queue) = bus.ui_queue() {
        queue.run_pending()?;
    }

    bus.unregister(&logger);
    bus.shutdown();
    Ok(())
}
