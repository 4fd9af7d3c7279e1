//! Startup and shutdown orchestration for one named service instance.
//!
//! Every shutdown trigger (startup failure, termination signal, console quit,
//! exit hook or an embedder's call) converges on
//! [`ControllerHandle::shutdown`], which tears down at most once.

mod console;
mod controller;
mod errors;
mod handle;
mod shutdown;
mod signals;
mod startup;
mod state;

use std::time::Duration;

use keel_config::{
    Config, DEFAULT_CONSOLE_READ_TIMEOUT_MS, DEFAULT_ROUTER_HANDLE_COMPONENT,
    DEFAULT_STARTUP_POLL_INTERVAL_MS,
};

pub use console::ConsoleInput;
pub use controller::{ControllerDeps, LifecycleController, ProcessIo};
pub use errors::{ControllerError, StartupError};
pub use handle::ControllerHandle;
pub use signals::{
    InstalledSignals, ProcessExit, SignalError, SignalSource, SystemExit, SystemSignals,
    TerminationSignal,
};
pub use startup::StartupOutcome;
pub use state::Phase;

pub(crate) const LIFECYCLE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::lifecycle");

/// Timing bounds and lookups the controller reads at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleSettings {
    /// Upper bound on each readiness wait and signal poll.
    pub startup_poll_interval: Duration,
    /// Upper bound on a single console read.
    pub console_read_timeout: Duration,
    /// Context component passed to the router when it is stopped.
    pub router_handle_component: String,
}

impl LifecycleSettings {
    /// Extracts controller settings from the resolved configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            startup_poll_interval: config.startup_poll_interval(),
            console_read_timeout: config.console_read_timeout(),
            router_handle_component: config.router_handle_component().to_owned(),
        }
    }
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            startup_poll_interval: Duration::from_millis(DEFAULT_STARTUP_POLL_INTERVAL_MS),
            console_read_timeout: Duration::from_millis(DEFAULT_CONSOLE_READ_TIMEOUT_MS),
            router_handle_component: DEFAULT_ROUTER_HANDLE_COMPONENT.to_owned(),
        }
    }
}

#[cfg(test)]
pub(crate) use startup::StartupTask;
