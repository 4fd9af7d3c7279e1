//! OS termination signals and process exit.

use std::io;
use std::sync::mpsc::{self, Receiver};
use std::thread;

use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use thiserror::Error;
use tracing::debug;

use super::LIFECYCLE_TARGET;

/// Signals that request controller shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationSignal {
    /// `SIGINT`, usually Ctrl-C on the console.
    Interrupt,
    /// `SIGTERM`, sent by service managers.
    Terminate,
}

impl TerminationSignal {
    /// Conventional signal name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
        }
    }

    /// Numeric signal value, also used as the process exit status.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Interrupt => SIGINT,
            Self::Terminate => SIGTERM,
        }
    }

    /// Maps a raw signal number onto a termination signal.
    #[must_use]
    pub const fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            SIGINT => Some(Self::Interrupt),
            SIGTERM => Some(Self::Terminate),
            _ => None,
        }
    }
}

/// Errors raised while wiring signal delivery.
#[derive(Debug, Error)]
pub enum SignalError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Source of termination signal deliveries.
pub trait SignalSource: Send {
    /// Installs handlers and returns the delivery channel.
    fn install(&mut self) -> Result<InstalledSignals, SignalError>;
}

/// Delivery channel returned by [`SignalSource::install`].
#[derive(Debug)]
pub struct InstalledSignals {
    receiver: Receiver<TerminationSignal>,
    closer: Option<Handle>,
}

impl InstalledSignals {
    /// Wraps a receiver that needs no explicit teardown.
    #[must_use]
    pub fn from_receiver(receiver: Receiver<TerminationSignal>) -> Self {
        Self {
            receiver,
            closer: None,
        }
    }

    pub(crate) fn into_parts(self) -> (Receiver<TerminationSignal>, SignalCloser) {
        (self.receiver, SignalCloser(self.closer))
    }
}

/// Unregisters OS handlers when the controller is done with them.
#[derive(Debug)]
pub(crate) struct SignalCloser(Option<Handle>);

impl SignalCloser {
    pub(crate) fn close(self) {
        if let Some(handle) = self.0 {
            handle.close();
        }
    }
}

/// Registers `SIGINT` and `SIGTERM` through `signal-hook`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSignals;

impl SignalSource for SystemSignals {
    fn install(&mut self) -> Result<InstalledSignals, SignalError> {
        let mut signals =
            Signals::new([SIGINT, SIGTERM]).map_err(|source| SignalError::Install { source })?;
        let closer = signals.handle();
        let (sender, receiver) = mpsc::channel();
        thread::Builder::new()
            .name("keeld-signals".to_owned())
            .spawn(move || {
                for raw in signals.forever() {
                    let Some(signal) = TerminationSignal::from_raw(raw) else {
                        continue;
                    };
                    if sender.send(signal).is_err() {
                        break;
                    }
                }
                debug!(target: LIFECYCLE_TARGET, "signal forwarding stopped");
            })
            .map_err(|source| SignalError::Install { source })?;
        Ok(InstalledSignals {
            receiver,
            closer: Some(closer),
        })
    }
}

/// Terminates the process with a status code.
pub trait ProcessExit: Send + Sync {
    /// Ends the process. Production implementations never return.
    fn exit(&self, code: i32);
}

/// Exits through [`std::process::exit`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExit;

impl ProcessExit for SystemExit {
    fn exit(&self, code: i32) {
        std::process::exit(code);
    }
}
