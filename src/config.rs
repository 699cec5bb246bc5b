//! Bus configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Every key is optional.

use std::path::PathBuf;

/// Top-level bus configuration.
///
/// Loaded once at startup via [`BusConfig::from_env`], or built with
/// [`BusConfig::default`] in tests and embedded hosts.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Log a debug line when an event is posted with no subscribers.
    pub log_no_subscriber_messages: bool,

    /// Name of the dedicated thread serving background-mode deliveries.
    pub background_thread_name: String,

    /// Worker threads of the owned runtime (only used when the bus is
    /// built outside a tokio runtime).
    pub worker_threads: usize,

    /// Upper bound on blocking threads running parallel-mode deliveries
    /// in the owned runtime.
    ///
    /// Parallel deliveries never wait on each other, so the pool grows on
    /// demand up to this bound. Past it, deliveries queue inside the
    /// runtime until a thread frees up. A borrowed runtime keeps its own
    /// limit.
    pub max_blocking_threads: usize,

    /// Optional JSON file holding declarative service records.
    pub service_config_path: Option<PathBuf>,
}

impl BusConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to the [`Default`] values when a variable is not set or
    /// cannot be parsed. Calls `dotenvy::dotenv().ok()` to optionally load
    /// a `.env` file.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Self {
            log_no_subscriber_messages: parse_env_bool(
                "SWITCHYARD_LOG_NO_SUBSCRIBERS",
                defaults.log_no_subscriber_messages,
            ),
            background_thread_name: std::env::var("SWITCHYARD_BACKGROUND_THREAD_NAME")
                .unwrap_or(defaults.background_thread_name),
            worker_threads: parse_env("SWITCHYARD_WORKER_THREADS", defaults.worker_threads).max(1),
            max_blocking_threads: parse_env(
                "SWITCHYARD_MAX_BLOCKING_THREADS",
                defaults.max_blocking_threads,
            )
            .max(1),
            service_config_path: std::env::var_os("SWITCHYARD_SERVICE_CONFIG").map(PathBuf::from),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            log_no_subscriber_messages: true,
            background_thread_name: "switchyard-background".to_string(),
            worker_threads: 2,
            max_blocking_threads: 512,
            service_config_path: None,
        }
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).ok().map(|v| v.to_ascii_lowercase()).as_deref() {
        Some("true" | "1") => true,
        Some("false" | "0") => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = BusConfig::default();
        assert!(config.log_no_subscriber_messages);
        assert_eq!(config.background_thread_name, "switchyard-background");
        assert!(config.worker_threads >= 1);
        assert!(config.max_blocking_threads >= 1);
        assert!(config.service_config_path.is_none());
    }

    #[test]
    fn missing_variables_fall_back() {
        assert_eq!(parse_env("SWITCHYARD_TEST_UNSET_NUMBER", 7_usize), 7);
        assert!(parse_env_bool("SWITCHYARD_TEST_UNSET_BOOL", true));
        assert!(!parse_env_bool("SWITCHYARD_TEST_UNSET_BOOL", false));
    }
}
