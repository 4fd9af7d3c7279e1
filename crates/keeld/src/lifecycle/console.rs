//! Operator console: waits for a quit command while the service runs.

use std::fmt;
use std::io::{self, BufRead, BufReader, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use once_cell::sync::Lazy;
use tracing::{debug, info, warn};

use super::{ControllerHandle, LIFECYCLE_TARGET};

const BANNER_RULE: &str =
    "****************************************************************************";

static STDIN: Lazy<ConsoleInput> =
    Lazy::new(|| ConsoleInput::new("stdin", BufReader::new(io::stdin())));

/// Result of one bounded read from the console.
#[derive(Debug)]
pub(crate) enum ReadOutcome {
    Line(String),
    TimedOut,
    Failed(io::Error),
    Closed,
}

enum Source {
    Idle(Box<dyn BufRead + Send>),
    Reading(Receiver<io::Result<String>>),
    Exhausted,
}

struct Shared {
    label: String,
    source: Source,
}

/// Line source for console loops, shared by every clone.
///
/// A single reader thread is spawned on first use and outlives any one
/// console loop. A line nobody consumed stays queued for the next loop
/// reading from the same input, so a finished controller never swallows
/// input meant for a later one.
#[derive(Clone)]
pub struct ConsoleInput {
    shared: Arc<Mutex<Shared>>,
}

impl ConsoleInput {
    /// Wraps `input`; `label` names the reader thread.
    pub fn new(label: impl Into<String>, input: impl BufRead + Send + 'static) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                label: label.into(),
                source: Source::Idle(Box::new(input)),
            })),
        }
    }

    /// The process-wide standard input reader.
    #[must_use]
    pub fn stdin() -> Self {
        STDIN.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts the reader thread if nothing has read from this input yet.
    pub(crate) fn ensure_reading(&self) -> io::Result<()> {
        let mut shared = self.lock();
        let source = std::mem::replace(&mut shared.source, Source::Exhausted);
        let source = match source {
            Source::Idle(input) => Source::Reading(spawn_reader(input, &shared.label)?),
            running => running,
        };
        shared.source = source;
        Ok(())
    }

    /// Waits up to `timeout` for the next line.
    pub(crate) fn next_line(&self, timeout: Duration) -> ReadOutcome {
        let mut shared = self.lock();
        let Source::Reading(lines) = &shared.source else {
            return ReadOutcome::Closed;
        };
        match lines.recv_timeout(timeout) {
            Ok(Ok(line)) => ReadOutcome::Line(line),
            Ok(Err(error)) => ReadOutcome::Failed(error),
            Err(RecvTimeoutError::Timeout) => ReadOutcome::TimedOut,
            Err(RecvTimeoutError::Disconnected) => {
                shared.source = Source::Exhausted;
                ReadOutcome::Closed
            }
        }
    }
}

impl fmt::Debug for ConsoleInput {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.lock();
        let state = match shared.source {
            Source::Idle(_) => "idle",
            Source::Reading(_) => "reading",
            Source::Exhausted => "exhausted",
        };
        formatter
            .debug_struct("ConsoleInput")
            .field("label", &shared.label)
            .field("state", &state)
            .finish()
    }
}

fn spawn_reader(
    mut input: Box<dyn BufRead + Send>,
    label: &str,
) -> io::Result<Receiver<io::Result<String>>> {
    let (sender, lines) = mpsc::sync_channel(1);
    thread::Builder::new()
        .name(format!("{label}-console"))
        .spawn(move || {
            loop {
                let mut line = String::new();
                match input.read_line(&mut line) {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = line.trim_end_matches(['\r', '\n']).to_owned();
                        if sender.send(Ok(line)).is_err() {
                            break;
                        }
                    }
                    Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                    Err(error) => {
                        let _ = sender.send(Err(error));
                        break;
                    }
                }
            }
        })?;
    Ok(lines)
}

fn is_quit(line: &str) -> bool {
    line.starts_with(['q', 'Q'])
}

fn write_banner(output: &mut dyn Write, name: &str) -> io::Result<()> {
    writeln!(output, "{BANNER_RULE}")?;
    writeln!(output, " {name} console")?;
    writeln!(output, " Waiting for operator input; log output may follow.")?;
    writeln!(output, " Enter q[uit] to stop the service or press Ctrl-C")?;
    writeln!(output, "{BANNER_RULE}")?;
    output.flush()
}

/// Runs the console loop until the controller starts stopping.
///
/// Only a failure to spawn the reader thread is returned; read errors and
/// timeouts just re-check the stop condition.
pub(crate) fn run_console(
    handle: &ControllerHandle,
    input: &ConsoleInput,
    output: &mut dyn Write,
) -> io::Result<()> {
    let name = handle.name();
    let timeout = handle.settings().console_read_timeout;
    if let Err(error) = write_banner(output, name) {
        warn!(target: LIFECYCLE_TARGET, instance = %name, %error, "could not write console banner");
    }

    input.ensure_reading()?;
    while !handle.is_stopping() {
        match input.next_line(timeout) {
            ReadOutcome::Line(line) if is_quit(&line) => {
                info!(target: LIFECYCLE_TARGET, instance = %name, "quit requested on console");
                handle.shutdown();
            }
            ReadOutcome::Line(line) => {
                debug!(target: LIFECYCLE_TARGET, instance = %name, line = %line, "ignoring console input");
            }
            ReadOutcome::TimedOut => {}
            ReadOutcome::Failed(error) => {
                warn!(target: LIFECYCLE_TARGET, instance = %name, %error, "console read failed");
            }
            ReadOutcome::Closed => {
                handle.state().wait_for_stop(timeout);
            }
        }
    }
    debug!(target: LIFECYCLE_TARGET, instance = %name, "console loop finished");
    Ok(())
}
