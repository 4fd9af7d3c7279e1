//! The controller that owns one instance's run: signals, startup, console
//! and the final wait for teardown.

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use super::console::{ConsoleInput, run_console};
use super::errors::ControllerError;
use super::signals::{ProcessExit, SignalSource, SystemExit, SystemSignals, TerminationSignal};
use super::startup::StartupTask;
use super::state::Phase;
use super::{ControllerHandle, LIFECYCLE_TARGET, LifecycleSettings};
use crate::context::ContextProvider;
use crate::exit_hooks::ExitHooks;
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::registry::ProcessRegistry;
use crate::router::Router;

/// Service collaborators a controller is built from.
pub struct ControllerDeps {
    /// Builds the service context during startup.
    pub provider: Arc<dyn ContextProvider>,
    /// Table the controller registers itself in.
    pub registry: Arc<ProcessRegistry>,
    /// Receives lifecycle events.
    pub reporter: Arc<dyn HealthReporter>,
    /// Queue the shutdown hook is registered with after startup.
    pub exit_hooks: Arc<ExitHooks>,
    /// Timing bounds and router handle lookup.
    pub settings: LifecycleSettings,
}

impl ControllerDeps {
    /// Uses the process-wide registry and exit hooks with default settings.
    #[must_use]
    pub fn new(provider: Arc<dyn ContextProvider>) -> Self {
        Self {
            provider,
            registry: ProcessRegistry::global(),
            reporter: Arc::new(StructuredHealthReporter::new()),
            exit_hooks: ExitHooks::global(),
            settings: LifecycleSettings::default(),
        }
    }
}

/// Process-level collaborators used by [`LifecycleController::run`].
pub struct ProcessIo {
    /// Delivers termination signals.
    pub signals: Box<dyn SignalSource>,
    /// Ends the process after a signal-triggered shutdown.
    pub exit: Arc<dyn ProcessExit>,
    /// Operator console input, shared with later controllers in the process.
    pub console_input: ConsoleInput,
    /// Operator console output.
    pub console_output: Box<dyn Write + Send>,
}

impl ProcessIo {
    /// Standard input and output, OS signals and [`std::process::exit`].
    #[must_use]
    pub fn system() -> Self {
        Self {
            signals: Box::new(SystemSignals),
            exit: Arc::new(SystemExit),
            console_input: ConsoleInput::stdin(),
            console_output: Box::new(io::stdout()),
        }
    }
}

impl fmt::Debug for ProcessIo {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("ProcessIo").finish_non_exhaustive()
    }
}

/// Lifecycle orchestrator for one named service instance.
///
/// Construction registers the controller in its [`ProcessRegistry`]. A router
/// may be attached before [`run`](Self::run), which consumes the controller:
/// an instance can only ever be run once.
pub struct LifecycleController {
    handle: ControllerHandle,
    provider: Arc<dyn ContextProvider>,
    exit_hooks: Arc<ExitHooks>,
    io: ProcessIo,
}

impl LifecycleController {
    /// Builds and registers a controller named `name`.
    pub fn new(name: impl Into<String>, deps: ControllerDeps) -> Self {
        let ControllerDeps {
            provider,
            registry,
            reporter,
            exit_hooks,
            settings,
        } = deps;
        let handle = ControllerHandle::new(name.into(), registry, reporter, settings);
        handle.registry().register(handle.clone());
        Self {
            handle,
            provider,
            exit_hooks,
            io: ProcessIo::system(),
        }
    }

    /// Replaces the process-level collaborators.
    #[must_use]
    pub fn with_process_io(mut self, io: ProcessIo) -> Self {
        self.io = io;
        self
    }

    /// Attaches the router started after the service context comes up.
    pub fn attach_router(&self, router: Arc<dyn Router>) {
        if self.handle.phase() != Phase::Created {
            warn!(
                target: LIFECYCLE_TARGET,
                instance = %self.handle.name(),
                "router attached after run; it may never be started"
            );
        }
        self.handle.router().attach(router);
    }

    /// Returns a handle usable from other threads.
    #[must_use]
    pub fn handle(&self) -> ControllerHandle {
        self.handle.clone()
    }

    /// Instance name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    /// See [`ControllerHandle::wait_for_startup`].
    pub fn wait_for_startup(&self) -> bool {
        self.handle.wait_for_startup()
    }

    /// See [`ControllerHandle::shutdown`].
    pub fn shutdown(&self) {
        self.handle.shutdown();
    }

    /// See [`ControllerHandle::request_stop`].
    pub fn request_stop(&self) {
        self.handle.request_stop();
    }

    /// Runs the controller until shutdown completes.
    ///
    /// Installs signal handling, starts the service context in the
    /// background and blocks in the console loop. Startup failures are not
    /// returned: they stop the controller and `run` returns `Ok` once
    /// teardown finishes. Errors are only returned when the controller could
    /// not operate at all, after shutdown has run.
    pub fn run(self) -> Result<(), ControllerError> {
        let Self {
            handle,
            provider,
            exit_hooks,
            io,
        } = self;
        let ProcessIo {
            mut signals,
            exit,
            console_input,
            mut console_output,
        } = io;

        handle.state().mark_running();
        info!(target: LIFECYCLE_TARGET, instance = %handle.name(), "controller running");

        let installed = match signals.install() {
            Ok(installed) => installed,
            Err(error) => {
                handle.shutdown();
                return Err(error.into());
            }
        };
        let (receiver, closer) = installed.into_parts();
        let watcher = match spawn_signal_watcher(handle.clone(), receiver, exit) {
            Ok(watcher) => watcher,
            Err(source) => {
                closer.close();
                handle.shutdown();
                return Err(ControllerError::Spawn {
                    task: "signal watcher",
                    source,
                });
            }
        };

        // Startup runs detached; its failures surface through the stop flag.
        let startup = StartupTask::new(handle.clone(), provider, exit_hooks);
        let outcome = startup
            .spawn()
            .map_err(|source| ControllerError::Spawn {
                task: "startup",
                source,
            })
            .and_then(|_detached| {
                run_console(&handle, &console_input, console_output.as_mut()).map_err(|source| {
                    ControllerError::Spawn {
                        task: "console reader",
                        source,
                    }
                })
            });
        // The console only returns once stopping; finish any stop that was
        // requested without teardown.
        handle.shutdown();
        handle.wait_until_stopped();
        closer.close();
        finish_watcher(&handle, watcher);
        info!(target: LIFECYCLE_TARGET, instance = %handle.name(), "controller stopped");
        outcome
    }
}

impl fmt::Debug for LifecycleController {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("LifecycleController")
            .field("handle", &self.handle)
            .field("exit_hooks", &self.exit_hooks)
            .finish_non_exhaustive()
    }
}

fn spawn_signal_watcher(
    handle: ControllerHandle,
    receiver: Receiver<TerminationSignal>,
    exit: Arc<dyn ProcessExit>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("{}-signals", handle.name()))
        .spawn(move || watch_signals(&handle, &receiver, exit.as_ref()))
}

/// Routes signals into the shared shutdown path until teardown completes.
///
/// The first signal shuts the controller down, waits for `Stopped` and then
/// exits with that signal's code, even when another trigger already began the
/// teardown. A second signal while teardown is still running exits at once.
fn watch_signals(
    handle: &ControllerHandle,
    receiver: &Receiver<TerminationSignal>,
    exit: &dyn ProcessExit,
) {
    let poll = handle.settings().startup_poll_interval;
    let mut pending: Option<TerminationSignal> = None;
    loop {
        if handle.phase() == Phase::Stopped {
            let late = receiver.try_recv().ok();
            if let Some(signal) = late {
                handle.reporter().signal_received(handle.name(), signal);
            }
            if let Some(signal) = pending.or(late) {
                exit.exit(signal.code());
            }
            return;
        }
        match receiver.recv_timeout(poll) {
            Ok(signal) if pending.is_some() => {
                warn!(
                    target: LIFECYCLE_TARGET,
                    instance = %handle.name(),
                    signal = signal.name(),
                    "signal repeated during teardown; exiting now"
                );
                exit.exit(signal.code());
                return;
            }
            Ok(signal) => {
                handle.reporter().signal_received(handle.name(), signal);
                pending = Some(signal);
                handle.shutdown();
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                debug!(target: LIFECYCLE_TARGET, instance = %handle.name(), "signal source closed");
                if let Some(signal) = pending {
                    handle.wait_until_stopped();
                    exit.exit(signal.code());
                }
                return;
            }
        }
    }
}

fn finish_watcher(handle: &ControllerHandle, watcher: JoinHandle<()>) {
    if watcher.join().is_err() {
        warn!(target: LIFECYCLE_TARGET, instance = %handle.name(), "signal watcher panicked");
    }
}
