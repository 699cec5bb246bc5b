//! Bus error types with stable numeric codes.
//!
//! [`BusError`] is the central error type for the crate. Each variant maps
//! to a numeric code band and a disposition: configuration and contract
//! errors are fatal, everything else is reported and the operation aborted.
//!
//! [`HandlerError`] is what subscriber handlers and target operations
//! return from their bodies.

/// Crate-wide error enum.
///
/// # Error Code Ranges
///
/// | Range     | Category           | Disposition                         |
/// |-----------|--------------------|-------------------------------------|
/// | 1000–1999 | Configuration      | fatal, load aborts                  |
/// | 2000–2999 | Resolution         | reported, operation is a no-op      |
/// | 3000–3999 | Binding            | reported, operation aborted         |
/// | 4000–4999 | Handler invocation | logged, isolated per binding        |
/// | 5000–5999 | Contract violation | fatal, propagated to the caller     |
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// Declarative service configuration is invalid.
    #[error("config error: {0}")]
    Config(String),

    /// No service, method or page matches the requested url.
    #[error("resolution error: {0}")]
    Resolution(String),

    /// A payload value could not be bound to a declared slot, or the
    /// target signature does not match the declared data list.
    #[error("binding error: {0}")]
    Binding(String),

    /// The subscriber is already registered for the event type.
    #[error("subscriber {subscriber} already registered to event {event_type}")]
    DuplicateBinding {
        /// Type name of the subscriber.
        subscriber: String,
        /// Event type that was registered twice.
        event_type: String,
    },

    /// A subscriber handler or target operation body failed.
    #[error("handler invocation failed: {0}")]
    HandlerInvocation(#[from] HandlerError),

    /// Programmer error in handler registration or bus usage.
    #[error("contract violation: {0}")]
    ContractViolation(String),
}

impl BusError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Config(_) => 1001,
            Self::Resolution(_) => 2001,
            Self::Binding(_) => 3001,
            Self::DuplicateBinding { .. } => 3002,
            Self::HandlerInvocation(_) => 4001,
            Self::ContractViolation(_) => 5001,
        }
    }

    /// Returns `true` if the error must be propagated rather than reported.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::ContractViolation(_))
    }
}

/// Failure raised from inside a handler or target operation body.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The body reported a failure.
    #[error("{0}")]
    Failed(String),

    /// The body propagated an arbitrary error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),

    /// The body read an argument slot that does not match its declaration.
    #[error("signature mismatch: {0}")]
    Signature(String),

    /// The body panicked.
    #[error("panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    /// Creates a [`HandlerError::Failed`] from any displayable message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Builds a [`HandlerError::Panicked`] from a caught panic payload.
    pub(crate) fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::Panicked(message)
    }
}

/// Runs a handler body, turning a panic into [`HandlerError::Panicked`].
pub(crate) fn catch_handler<F>(body: F) -> Result<(), HandlerError>
where
    F: FnOnce() -> Result<(), HandlerError>,
{
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(body)) {
        Ok(result) => result,
        Err(payload) => Err(HandlerError::from_panic(payload.as_ref())),
    }
}
