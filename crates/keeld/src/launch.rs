//! Wires configuration, telemetry and the controller for the binary.

use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;
use tracing::info;

use keel_config::{Config, ConfigError};

use crate::context::ContextProvider;
use crate::exit_hooks::ExitHooks;
use crate::health::StructuredHealthReporter;
use crate::lifecycle::{
    ControllerDeps, ControllerError, LifecycleController, LifecycleSettings, ProcessIo,
};
use crate::registry::ProcessRegistry;
use crate::standalone::StandaloneContextProvider;
use crate::telemetry::{self, TelemetryError};

const LAUNCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::launch");

/// Errors surfaced while launching the controller.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Config {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Configuration loaded but holds unusable values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
    /// Telemetry could not be initialised.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    /// The controller could not operate.
    #[error(transparent)]
    Controller(#[from] ControllerError),
}

impl From<Arc<OrthoError>> for LaunchError {
    fn from(source: Arc<OrthoError>) -> Self {
        Self::Config { source }
    }
}

/// Runs the controller with production collaborators and the standalone
/// service context.
pub fn run_service() -> Result<(), LaunchError> {
    let config = Config::load()?;
    run_service_with(
        config,
        Arc::new(StandaloneContextProvider),
        ProcessIo::system(),
    )
}

/// Runs the controller described by `config` until it shuts down.
///
/// Exit hooks registered during the run are drained before returning.
pub fn run_service_with(
    config: Config,
    provider: Arc<dyn ContextProvider>,
    io: ProcessIo,
) -> Result<(), LaunchError> {
    config.validate()?;
    let telemetry = telemetry::initialise(&config)?;

    let exit_hooks = ExitHooks::global();
    let _hooks = exit_hooks.guard();
    info!(
        target: LAUNCH_TARGET,
        instance = %config.instance_name(),
        format = %telemetry.format(),
        "starting controller"
    );
    let deps = ControllerDeps {
        provider,
        registry: ProcessRegistry::global(),
        reporter: Arc::new(StructuredHealthReporter::new()),
        exit_hooks: Arc::clone(&exit_hooks),
        settings: LifecycleSettings::from_config(&config),
    };
    let controller = LifecycleController::new(config.instance_name(), deps).with_process_io(io);
    controller.run()?;
    Ok(())
}
