//! Errors surfaced by controller startup and `run`.

use std::io;

use thiserror::Error;

use super::signals::SignalError;
use crate::context::InitializationError;
use crate::router::RouterStartError;

/// Failures that abort the startup task.
#[derive(Debug, Error)]
pub enum StartupError {
    /// The service context could not be built.
    #[error(transparent)]
    Initialization(#[from] InitializationError),
    /// The attached router failed to start.
    #[error(transparent)]
    Router(#[from] RouterStartError),
}

/// Failures that prevent the controller from operating at all.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Signal handlers could not be installed.
    #[error(transparent)]
    Signals(#[from] SignalError),
    /// A background thread could not be spawned.
    #[error("failed to spawn {task} thread: {source}")]
    Spawn {
        /// Which task failed to start.
        task: &'static str,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}
