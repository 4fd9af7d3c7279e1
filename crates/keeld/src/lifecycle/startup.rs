//! Background task that brings the service context online.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::debug;

use super::errors::StartupError;
use super::shutdown::ShutdownTask;
use super::{ControllerHandle, LIFECYCLE_TARGET};
use crate::context::ContextProvider;
use crate::exit_hooks::ExitHooks;

/// How a startup task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupOutcome {
    /// The instance is accepting connections.
    Started,
    /// Initialisation or router start failed; shutdown has run.
    Failed,
    /// Shutdown was requested before startup could finish.
    Abandoned,
}

pub(crate) struct StartupTask {
    handle: ControllerHandle,
    provider: Arc<dyn ContextProvider>,
    shutdown: ShutdownTask,
    exit_hooks: Arc<ExitHooks>,
}

impl StartupTask {
    pub(crate) fn new(
        handle: ControllerHandle,
        provider: Arc<dyn ContextProvider>,
        exit_hooks: Arc<ExitHooks>,
    ) -> Self {
        let shutdown = ShutdownTask::for_handle(&handle);
        Self {
            handle,
            provider,
            shutdown,
            exit_hooks,
        }
    }

    /// Runs the task on a thread named after the instance.
    pub(crate) fn spawn(self) -> io::Result<JoinHandle<StartupOutcome>> {
        thread::Builder::new()
            .name(self.handle.name().to_owned())
            .spawn(move || self.run())
    }

    pub(crate) fn run(self) -> StartupOutcome {
        let name = self.handle.name();
        self.handle.reporter().startup_starting(name);
        match self.bring_up() {
            Ok(outcome) => outcome,
            Err(error) => {
                self.fail(&error);
                StartupOutcome::Failed
            }
        }
    }

    fn bring_up(&self) -> Result<StartupOutcome, StartupError> {
        let name = self.handle.name();
        let context = self.provider.initialize(name)?;
        if let Err(context) = self.handle.state().install_context(context) {
            context.close();
            return Ok(self.abandon());
        }

        if self.handle.router().start_router()? {
            self.handle.reporter().router_started(name);
        }

        let hook = self.shutdown.clone();
        self.exit_hooks
            .register(format!("{name} shutdown"), move || hook.run());
        debug!(target: LIFECYCLE_TARGET, instance = %name, "shutdown hook registered");

        if !self.handle.state().mark_started() {
            return Ok(self.abandon());
        }
        self.handle.reporter().startup_succeeded(name);
        Ok(StartupOutcome::Started)
    }

    fn abandon(&self) -> StartupOutcome {
        self.handle.reporter().startup_abandoned(self.handle.name());
        StartupOutcome::Abandoned
    }

    fn fail(&self, startup_error: &StartupError) {
        let name = self.handle.name();
        self.handle.reporter().startup_failed(name, startup_error);
        self.handle.state().request_stop();
        self.shutdown.run();
        // The registry entry may belong to a newer controller with this name.
        self.handle.shutdown();
    }
}
