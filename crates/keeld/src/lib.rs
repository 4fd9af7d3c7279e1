//! Lifecycle controller for a long-running service process.
//!
//! A [`LifecycleController`] brings a named service context online in the
//! background, optionally starts an auxiliary [`Router`] alongside it, and
//! keeps an operator console open until something asks it to stop. Startup
//! failure, `SIGINT`/`SIGTERM`, a console `quit`, a process [`ExitHooks`]
//! callback and direct calls to [`ControllerHandle::shutdown`] all converge on
//! one teardown that runs at most once per controller.
//!
//! Running controllers are recorded in a [`ProcessRegistry`] so exit-time
//! hooks can find them by name. Lifecycle events are reported through a
//! [`HealthReporter`]; the default implementation emits structured `tracing`
//! events.

mod context;
mod exit_hooks;
mod health;
mod launch;
mod lifecycle;
mod registry;
mod router;
mod standalone;
mod telemetry;

pub use context::{ComponentHandle, ContextProvider, InitializationError, ServiceContext};
pub use exit_hooks::{ExitHookGuard, ExitHooks};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use launch::{LaunchError, run_service, run_service_with};
pub use lifecycle::{
    ConsoleInput, ControllerDeps, ControllerError, ControllerHandle, InstalledSignals, LifecycleController,
    LifecycleSettings, Phase, ProcessExit, ProcessIo, SignalError, SignalSource, StartupError,
    StartupOutcome, SystemExit, SystemSignals, TerminationSignal,
};
pub use registry::ProcessRegistry;
pub use router::{Router, RouterControl, RouterStartError, RouterStopOutcome};
pub use standalone::StandaloneContextProvider;
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
