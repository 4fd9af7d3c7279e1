//! Shareable view of one controller and its idempotent shutdown path.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error, info};

use super::state::{LifecycleState, Phase};
use super::{LIFECYCLE_TARGET, LifecycleSettings};
use crate::context::ServiceContext;
use crate::health::HealthReporter;
use crate::registry::ProcessRegistry;
use crate::router::RouterControl;

struct ControllerCore {
    name: String,
    state: LifecycleState,
    router: RouterControl,
    registry: Arc<ProcessRegistry>,
    reporter: Arc<dyn HealthReporter>,
    settings: LifecycleSettings,
}

/// Cloneable handle to a controller.
///
/// The registry stores handles, and embedders use them to observe or stop a
/// controller from other threads while `run` blocks.
#[derive(Clone)]
pub struct ControllerHandle {
    core: Arc<ControllerCore>,
}

impl ControllerHandle {
    pub(crate) fn new(
        name: String,
        registry: Arc<ProcessRegistry>,
        reporter: Arc<dyn HealthReporter>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            core: Arc::new(ControllerCore {
                name,
                state: LifecycleState::default(),
                router: RouterControl::new(),
                registry,
                reporter,
                settings,
            }),
        }
    }

    /// Instance name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.core.name.as_str()
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.core.state.phase()
    }

    /// Returns `true` once startup completed successfully.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.core.state.is_started()
    }

    /// Returns `true` once any shutdown trigger has fired. Never resets.
    #[must_use]
    pub fn is_stopping(&self) -> bool {
        self.core.state.is_stopping()
    }

    /// Blocks until startup completes or a stop is requested.
    ///
    /// Each wait is bounded by the configured startup poll interval. Returns
    /// `true` when the controller is usable.
    pub fn wait_for_startup(&self) -> bool {
        self.core
            .state
            .wait_for_startup(self.core.settings.startup_poll_interval)
    }

    /// Blocks until teardown has finished.
    pub fn wait_until_stopped(&self) {
        self.core.state.wait_until_stopped();
    }

    /// Marks the controller as stopping without tearing anything down.
    ///
    /// Startup stops short of readiness and the console loop ends; `run` then
    /// performs the teardown itself. Has no effect once stopping.
    pub fn request_stop(&self) {
        self.core.state.request_stop();
    }

    /// Stops the controller. Safe to call repeatedly and concurrently.
    ///
    /// Removes the registry entry, then, if a service context was obtained,
    /// stops the router and closes the context. The context is closed even if
    /// stopping the router panics. Later calls return without side effects.
    pub fn shutdown(&self) {
        let core = &self.core;
        core.registry.deregister(&core.name, self);
        let Some(context) = core.state.claim_teardown() else {
            debug!(
                target: LIFECYCLE_TARGET,
                instance = %core.name,
                "shutdown already claimed; nothing to do"
            );
            return;
        };
        info!(target: LIFECYCLE_TARGET, instance = %core.name, "shutting down");

        let Some(context) = context else {
            core.state.mark_stopped();
            core.reporter.shutdown_completed(&core.name);
            return;
        };
        let closer = ContextCloser {
            handle: self,
            context,
        };
        let component = closer
            .context
            .lookup(&core.settings.router_handle_component);
        let outcome = core.router.stop_router(component);
        core.reporter.router_stopped(&core.name, outcome);
        drop(closer);
    }

    pub(crate) fn state(&self) -> &LifecycleState {
        &self.core.state
    }

    pub(crate) fn router(&self) -> &RouterControl {
        &self.core.router
    }

    pub(crate) fn reporter(&self) -> &Arc<dyn HealthReporter> {
        &self.core.reporter
    }

    pub(crate) fn registry(&self) -> &Arc<ProcessRegistry> {
        &self.core.registry
    }

    pub(crate) fn settings(&self) -> &LifecycleSettings {
        &self.core.settings
    }

    pub(crate) fn same_instance(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }
}

impl fmt::Debug for ControllerHandle {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ControllerHandle")
            .field("name", &self.core.name)
            .field("phase", &self.phase())
            .field("router", &self.core.router)
            .finish_non_exhaustive()
    }
}

/// Closes the context and completes teardown when dropped, including while
/// unwinding.
struct ContextCloser<'a> {
    handle: &'a ControllerHandle,
    context: Arc<dyn ServiceContext>,
}

impl Drop for ContextCloser<'_> {
    fn drop(&mut self) {
        let core = &self.handle.core;
        if panic::catch_unwind(AssertUnwindSafe(|| self.context.close())).is_err() {
            error!(target: LIFECYCLE_TARGET, instance = %core.name, "service context close panicked");
        } else {
            info!(target: LIFECYCLE_TARGET, instance = %core.name, "service context closed");
        }
        core.state.mark_stopped();
        core.reporter.shutdown_completed(&core.name);
    }
}
