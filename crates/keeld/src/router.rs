//! Lock-guarded lifecycle of the optional auxiliary router.
//!
//! Startup and shutdown share one [`RouterControl`]. Every start and stop goes
//! through its mutex, so the two are totally ordered and only the first stop
//! to observe an attached router ever reaches the router's own shutdown.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::error;

use crate::context::ComponentHandle;

const ROUTER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::router");

/// Auxiliary process whose lifecycle is chained to the controller's.
pub trait Router: Send + Sync {
    /// Starts the router. A failure aborts controller startup.
    fn start(&self) -> Result<(), RouterStartError>;

    /// Stops the router, returning whether it was active.
    fn shutdown(&self, handle: Option<ComponentHandle>) -> bool;
}

/// The router failed to start.
#[derive(Debug, Error)]
#[error("router failed to start: {message}")]
pub struct RouterStartError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl RouterStartError {
    /// Builds an error without an underlying source.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Builds an error that wraps an underlying source.
    #[must_use]
    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Human-readable failure description.
    #[must_use]
    pub fn message(&self) -> &str {
        self.message.as_str()
    }
}

/// Result of asking [`RouterControl`] to stop the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterStopOutcome {
    /// The router reported it was running and is now stopped.
    Stopped,
    /// The router reported it was not running.
    WasInactive,
    /// The router's shutdown panicked; the reference has still been released.
    Faulted,
    /// No router was held, either never attached or already taken by an
    /// earlier stop.
    Detached,
}

impl fmt::Display for RouterStopOutcome {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Stopped => "stopped",
            Self::WasInactive => "was_inactive",
            Self::Faulted => "faulted",
            Self::Detached => "detached",
        };
        formatter.write_str(label)
    }
}

/// Serialises all access to the optional router reference.
#[derive(Default)]
pub struct RouterControl {
    router: Mutex<Option<Arc<dyn Router>>>,
}

impl RouterControl {
    /// Builds a control with no router attached.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<dyn Router>>> {
        self.router.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the held router. Only meaningful before startup runs.
    pub fn attach(&self, router: Arc<dyn Router>) {
        *self.slot() = Some(router);
    }

    /// Returns `true` while a router is held.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.slot().is_some()
    }

    /// Starts the attached router, if any.
    ///
    /// Returns `Ok(true)` when a router was started and `Ok(false)` when none
    /// is attached.
    pub fn start_router(&self) -> Result<bool, RouterStartError> {
        let slot = self.slot();
        let Some(router) = slot.as_ref() else {
            return Ok(false);
        };
        router.start()?;
        Ok(true)
    }

    /// Takes the router out of the shared slot and stops it.
    ///
    /// The slot is cleared before the router's shutdown runs, so a racing
    /// caller observes [`RouterStopOutcome::Detached`]. Never panics: a panic
    /// raised by the router is caught and reported as
    /// [`RouterStopOutcome::Faulted`].
    pub fn stop_router(&self, handle: Option<ComponentHandle>) -> RouterStopOutcome {
        let mut slot = self.slot();
        let Some(router) = slot.take() else {
            return RouterStopOutcome::Detached;
        };
        match panic::catch_unwind(AssertUnwindSafe(|| router.shutdown(handle))) {
            Ok(true) => RouterStopOutcome::Stopped,
            Ok(false) => RouterStopOutcome::WasInactive,
            Err(_) => {
                error!(target: ROUTER_TARGET, "router shutdown panicked");
                RouterStopOutcome::Faulted
            }
        }
    }
}

impl fmt::Debug for RouterControl {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RouterControl")
            .field("attached", &self.is_attached())
            .finish()
    }
}
