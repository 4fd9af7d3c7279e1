//! Structured health reporting for controller lifecycle events.

use std::sync::Arc;

use crate::lifecycle::{StartupError, TerminationSignal};
use crate::router::RouterStopOutcome;

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked when the startup task begins initialising the context.
    fn startup_starting(&self, instance: &str);

    /// Invoked once the instance is ready to accept connections.
    fn startup_succeeded(&self, instance: &str);

    /// Invoked when initialisation or router start fails.
    fn startup_failed(&self, instance: &str, error: &StartupError);

    /// Invoked when shutdown overtook a startup that was still in flight.
    fn startup_abandoned(&self, instance: &str);

    /// Invoked after the attached router starts.
    fn router_started(&self, instance: &str);

    /// Invoked after shutdown asked the router to stop.
    fn router_stopped(&self, instance: &str, outcome: RouterStopOutcome);

    /// Invoked when a termination signal is delivered.
    fn signal_received(&self, instance: &str, signal: TerminationSignal);

    /// Invoked when the shutdown hook begins.
    fn shutdown_hook_running(&self, instance: &str);

    /// Invoked when teardown has released every owned resource.
    fn shutdown_completed(&self, instance: &str);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn startup_starting(&self, instance: &str) {
        (**self).startup_starting(instance);
    }

    fn startup_succeeded(&self, instance: &str) {
        (**self).startup_succeeded(instance);
    }

    fn startup_failed(&self, instance: &str, error: &StartupError) {
        (**self).startup_failed(instance, error);
    }

    fn startup_abandoned(&self, instance: &str) {
        (**self).startup_abandoned(instance);
    }

    fn router_started(&self, instance: &str) {
        (**self).router_started(instance);
    }

    fn router_stopped(&self, instance: &str, outcome: RouterStopOutcome) {
        (**self).router_stopped(instance, outcome);
    }

    fn signal_received(&self, instance: &str, signal: TerminationSignal) {
        (**self).signal_received(instance, signal);
    }

    fn shutdown_hook_running(&self, instance: &str) {
        (**self).shutdown_hook_running(instance);
    }

    fn shutdown_completed(&self, instance: &str) {
        (**self).shutdown_completed(instance);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn startup_starting(&self, instance: &str) {
        tracing::info!(
            target: "keeld::health",
            event = "startup_starting",
            instance,
            "creating service context; please wait"
        );
    }

    fn startup_succeeded(&self, instance: &str) {
        tracing::info!(
            target: "keeld::health",
            event = "startup_succeeded",
            instance,
            "instance now accepting connections"
        );
    }

    fn startup_failed(&self, instance: &str, error: &StartupError) {
        tracing::error!(
            target: "keeld::health",
            event = "startup_failed",
            instance,
            error = %error,
            details = ?error,
            "error during startup; stopping"
        );
    }

    fn startup_abandoned(&self, instance: &str) {
        tracing::warn!(
            target: "keeld::health",
            event = "startup_abandoned",
            instance,
            "shutdown requested before startup completed"
        );
    }

    fn router_started(&self, instance: &str) {
        tracing::info!(
            target: "keeld::health",
            event = "router_started",
            instance,
            "router started"
        );
    }

    fn router_stopped(&self, instance: &str, outcome: RouterStopOutcome) {
        tracing::info!(
            target: "keeld::health",
            event = "router_stopped",
            instance,
            outcome = %outcome,
            "router stop requested"
        );
    }

    fn signal_received(&self, instance: &str, signal: TerminationSignal) {
        tracing::info!(
            target: "keeld::health",
            event = "signal_received",
            instance,
            signal = signal.name(),
            code = signal.code(),
            "shutdown requested by signal"
        );
    }

    fn shutdown_hook_running(&self, instance: &str) {
        tracing::info!(
            target: "keeld::health",
            event = "shutdown_hook_running",
            instance,
            "running shutdown hook"
        );
    }

    fn shutdown_completed(&self, instance: &str) {
        tracing::info!(
            target: "keeld::health",
            event = "shutdown_completed",
            instance,
            "finished shutdown"
        );
    }
}
