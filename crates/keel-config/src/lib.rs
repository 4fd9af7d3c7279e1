//! Layered configuration for the keel lifecycle controller.
//!
//! Values are resolved from built-in defaults, configuration files, `KEEL_*`
//! environment variables and command-line flags, in increasing order of
//! precedence. The resulting [`Config`] drives the controller's timing bounds,
//! the instance name it registers under, and the telemetry subscriber.

mod defaults;
mod logging;

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_CONSOLE_READ_TIMEOUT_MS, DEFAULT_INSTANCE_NAME, DEFAULT_LOG_FILTER,
    DEFAULT_ROUTER_HANDLE_COMPONENT, DEFAULT_STARTUP_POLL_INTERVAL_MS,
};
pub use logging::LogFormat;

/// Resolved controller configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "KEEL")]
pub struct Config {
    /// Name the controller registers under and passes to context initialisation.
    #[serde(default = "defaults::default_instance_name")]
    pub instance_name: String,
    /// Milliseconds between readiness checks while waiting for startup.
    #[serde(default = "defaults::default_startup_poll_interval_ms")]
    pub startup_poll_interval_ms: u64,
    /// Milliseconds a single console read may block before the loop re-checks state.
    #[serde(default = "defaults::default_console_read_timeout_ms")]
    pub console_read_timeout_ms: u64,
    /// Context component handed to the router during shutdown.
    #[serde(default = "defaults::default_router_handle_component")]
    pub router_handle_component: String,
    /// `tracing` filter expression.
    #[serde(default = "defaults::default_log_filter")]
    pub log_filter: String,
    /// Telemetry output format.
    #[serde(default = "defaults::default_log_format")]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            instance_name: defaults::default_instance_name(),
            startup_poll_interval_ms: defaults::default_startup_poll_interval_ms(),
            console_read_timeout_ms: defaults::default_console_read_timeout_ms(),
            router_handle_component: defaults::default_router_handle_component(),
            log_filter: defaults::default_log_filter(),
            log_format: defaults::default_log_format(),
        }
    }
}

impl Config {
    /// Name of the controller instance.
    #[must_use]
    pub fn instance_name(&self) -> &str {
        self.instance_name.as_str()
    }

    /// Polling bound used by `wait_for_startup`.
    #[must_use]
    pub fn startup_poll_interval(&self) -> Duration {
        Duration::from_millis(self.startup_poll_interval_ms)
    }

    /// Bound on a single console read.
    #[must_use]
    pub fn console_read_timeout(&self) -> Duration {
        Duration::from_millis(self.console_read_timeout_ms)
    }

    /// Component looked up in the service context when stopping the router.
    #[must_use]
    pub fn router_handle_component(&self) -> &str {
        self.router_handle_component.as_str()
    }

    /// Filter expression for the telemetry subscriber.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Output format for the telemetry subscriber.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Rejects values the controller cannot operate with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instance_name.trim().is_empty() {
            return Err(ConfigError::EmptyInstanceName);
        }
        if self.startup_poll_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "startup_poll_interval_ms",
            });
        }
        if self.console_read_timeout_ms == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "console_read_timeout_ms",
            });
        }
        Ok(())
    }
}

/// Semantic validation failures for an otherwise well-formed [`Config`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The instance name was blank.
    #[error("instance name must not be empty")]
    EmptyInstanceName,
    /// A timing field was zero.
    #[error("{field} must be greater than zero")]
    ZeroInterval {
        /// Offending field.
        field: &'static str,
    },
}
