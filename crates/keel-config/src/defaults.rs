//! Built-in values used when no layer sets a field.

use crate::logging::LogFormat;

/// Instance name used when none is configured.
pub const DEFAULT_INSTANCE_NAME: &str = "keel";

/// Interval between readiness checks in `wait_for_startup`.
pub const DEFAULT_STARTUP_POLL_INTERVAL_MS: u64 = 500;

/// Upper bound on a single console read before the loop re-checks state.
pub const DEFAULT_CONSOLE_READ_TIMEOUT_MS: u64 = 5_000;

/// Context component handed to the router when it is stopped.
pub const DEFAULT_ROUTER_HANDLE_COMPONENT: &str = "communicator";

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Serde default for `instance_name`.
pub fn default_instance_name() -> String {
    DEFAULT_INSTANCE_NAME.to_owned()
}

/// Serde default for `startup_poll_interval_ms`.
pub fn default_startup_poll_interval_ms() -> u64 {
    DEFAULT_STARTUP_POLL_INTERVAL_MS
}

/// Serde default for `console_read_timeout_ms`.
pub fn default_console_read_timeout_ms() -> u64 {
    DEFAULT_CONSOLE_READ_TIMEOUT_MS
}

/// Serde default for `router_handle_component`.
pub fn default_router_handle_component() -> String {
    DEFAULT_ROUTER_HANDLE_COMPONENT.to_owned()
}

/// Serde default for `log_filter`.
pub fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Serde default for `log_format`.
pub fn default_log_format() -> LogFormat {
    LogFormat::default()
}
