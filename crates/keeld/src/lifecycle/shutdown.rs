//! The shutdown hook: resolves a controller by name and stops it.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::{ControllerHandle, LIFECYCLE_TARGET};
use crate::health::HealthReporter;
use crate::registry::ProcessRegistry;

/// Teardown entry point used by exit hooks and the startup failure path.
///
/// Finds the controller by name rather than holding it, so a controller that
/// has already shut down (and deregistered) is simply not found.
#[derive(Clone)]
pub(crate) struct ShutdownTask {
    name: String,
    registry: Arc<ProcessRegistry>,
    reporter: Arc<dyn HealthReporter>,
}

impl ShutdownTask {
    pub(crate) fn for_handle(handle: &ControllerHandle) -> Self {
        Self {
            name: handle.name().to_owned(),
            registry: Arc::clone(handle.registry()),
            reporter: Arc::clone(handle.reporter()),
        }
    }

    pub(crate) fn run(&self) {
        self.reporter.shutdown_hook_running(&self.name);
        match self.registry.lookup(&self.name) {
            Some(handle) => handle.shutdown(),
            None => debug!(
                target: LIFECYCLE_TARGET,
                instance = %self.name,
                "instance no longer registered; already shut down"
            ),
        }
        debug!(target: LIFECYCLE_TARGET, instance = %self.name, "shutdown hook finished");
    }
}

impl fmt::Debug for ShutdownTask {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ShutdownTask")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
