//! Tracing setup for `keeld`.
//!
//! One stderr layer is installed per process, filtered by `log_filter` and
//! rendered as `log_format`. Thread names are always recorded because every
//! controller names its startup, console and signal threads after its
//! instance.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::Subscriber;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::fmt::{self, MakeWriter, time::UtcTime};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use keel_config::{Config, LogFormat};

const TELEMETRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::telemetry");

static INSTALLED: OnceCell<LogFormat> = OnceCell::new();

/// Describes the subscriber serving this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryHandle {
    format: LogFormat,
}

impl TelemetryHandle {
    /// Format chosen by whichever configuration installed the subscriber.
    #[must_use]
    pub fn format(&self) -> LogFormat {
        self.format
    }
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// `log_filter` is not a valid filter directive.
    #[error("invalid log filter '{filter}': {message}")]
    Filter {
        /// Rejected expression.
        filter: String,
        /// Parser diagnostic.
        message: String,
    },
    /// Another global subscriber was already installed.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),
}

/// Installs the process-wide subscriber the first time it is called.
///
/// Later calls keep the installed subscriber and report its format, so an
/// embedder that set up telemetry first is never overridden.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    let format = *INSTALLED.get_or_try_init(|| {
        let ansi = !config.log_format().is_structured() && io::stderr().is_terminal();
        let subscriber = build_subscriber(config, io::stderr, ansi)?;
        tracing::subscriber::set_global_default(subscriber)?;
        Ok::<_, TelemetryError>(config.log_format())
    })?;
    if format != config.log_format() {
        tracing::debug!(
            target: TELEMETRY_TARGET,
            installed = %format,
            requested = %config.log_format(),
            "telemetry already installed; keeping existing format"
        );
    }
    Ok(TelemetryHandle { format })
}

/// Builds the filtered subscriber without installing it.
pub(crate) fn build_subscriber<W>(
    config: &Config,
    writer: W,
    ansi: bool,
) -> Result<Box<dyn Subscriber + Send + Sync>, TelemetryError>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_new(config.log_filter()).map_err(|error| TelemetryError::Filter {
        filter: config.log_filter().to_owned(),
        message: error.to_string(),
    })?;
    let subscriber = Registry::default()
        .with(filter)
        .with(output_layer(config.log_format(), writer, ansi));
    Ok(Box::new(subscriber))
}

fn output_layer<S, W>(format: LogFormat, writer: W, ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_thread_names(true)
        .with_timer(UtcTime::rfc_3339());
    match format {
        LogFormat::Json => layer.json().flatten_event(true).boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    }
}
