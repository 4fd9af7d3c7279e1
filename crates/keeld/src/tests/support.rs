//! Test doubles and the scenario harness shared by controller tests.

use std::io::{self, BufReader, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use keel_config::{Config, LogFormat};

use crate::context::{ComponentHandle, ContextProvider, InitializationError, ServiceContext};
use crate::exit_hooks::ExitHooks;
use crate::health::HealthReporter;
use crate::lifecycle::{
    ConsoleInput, ControllerDeps, ControllerError, ControllerHandle, InstalledSignals, LifecycleController,
    LifecycleSettings, ProcessExit, ProcessIo, SignalError, SignalSource, StartupError,
    TerminationSignal,
};
use crate::registry::ProcessRegistry;
use crate::router::{Router, RouterStartError, RouterStopOutcome};
use crate::telemetry::build_subscriber;

static NEXT_INSTANCE: AtomicUsize = AtomicUsize::new(0);

/// Returns an instance name no other test uses.
pub fn unique_name(prefix: &str) -> String {
    let index = NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{index}")
}

/// Tight timing bounds so scenarios finish quickly.
pub fn fast_settings() -> LifecycleSettings {
    LifecycleSettings {
        startup_poll_interval: Duration::from_millis(10),
        console_read_timeout: Duration::from_millis(50),
        ..LifecycleSettings::default()
    }
}

/// Polls `condition` until it holds or five seconds pass.
pub fn eventually(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Runs `emit` on this thread under a compact debug-level subscriber and
/// returns what it logged.
pub fn capture_logs(emit: impl FnOnce()) -> String {
    let config = Config {
        log_filter: "debug".to_owned(),
        log_format: LogFormat::Compact,
        ..Config::default()
    };
    let buffer = SharedBuffer::default();
    let sink = buffer.clone();
    let subscriber =
        build_subscriber(&config, move || sink.clone(), false).expect("valid capture config");
    tracing::subscriber::with_default(subscriber, emit);
    buffer.contents()
}

/// Lifecycle events captured by [`RecordingHealthReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    StartupStarting,
    StartupSucceeded,
    StartupFailed(String),
    StartupAbandoned,
    RouterStarted,
    RouterStopped(RouterStopOutcome),
    SignalReceived(TerminationSignal),
    ShutdownHookRunning,
    ShutdownCompleted,
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    /// Number of recorded events equal to `event`.
    #[must_use]
    pub fn count(&self, event: &HealthEvent) -> usize {
        self.events().iter().filter(|seen| *seen == event).count()
    }

    /// Position of the first event equal to `event`.
    #[must_use]
    pub fn position(&self, event: &HealthEvent) -> Option<usize> {
        self.events().iter().position(|seen| seen == event)
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn startup_starting(&self, _instance: &str) {
        self.record(HealthEvent::StartupStarting);
    }

    fn startup_succeeded(&self, _instance: &str) {
        self.record(HealthEvent::StartupSucceeded);
    }

    fn startup_failed(&self, _instance: &str, error: &StartupError) {
        self.record(HealthEvent::StartupFailed(error.to_string()));
    }

    fn startup_abandoned(&self, _instance: &str) {
        self.record(HealthEvent::StartupAbandoned);
    }

    fn router_started(&self, _instance: &str) {
        self.record(HealthEvent::RouterStarted);
    }

    fn router_stopped(&self, _instance: &str, outcome: RouterStopOutcome) {
        self.record(HealthEvent::RouterStopped(outcome));
    }

    fn signal_received(&self, _instance: &str, signal: TerminationSignal) {
        self.record(HealthEvent::SignalReceived(signal));
    }

    fn shutdown_hook_running(&self, _instance: &str) {
        self.record(HealthEvent::ShutdownHookRunning);
    }

    fn shutdown_completed(&self, _instance: &str) {
        self.record(HealthEvent::ShutdownCompleted);
    }
}

/// Counters shared by a [`FakeContextProvider`] and the contexts it builds.
#[derive(Debug, Default)]
pub struct ContextLog {
    initialised: AtomicUsize,
    closed: AtomicUsize,
}

impl ContextLog {
    pub fn initialised(&self) -> usize {
        self.initialised.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Provider whose contexts count their closes.
pub struct FakeContextProvider {
    log: Arc<ContextLog>,
    failure: Option<String>,
    component: Option<(String, ComponentHandle)>,
    gate: Mutex<Option<Receiver<()>>>,
    close_gate: Arc<Mutex<Option<Receiver<()>>>>,
}

impl FakeContextProvider {
    pub fn succeeding(log: Arc<ContextLog>) -> Self {
        Self {
            log,
            failure: None,
            component: None,
            gate: Mutex::new(None),
            close_gate: Arc::new(Mutex::new(None)),
        }
    }

    pub fn failing(log: Arc<ContextLog>, message: &str) -> Self {
        Self {
            failure: Some(message.to_owned()),
            ..Self::succeeding(log)
        }
    }

    /// Blocks `initialize` until the returned sender fires or is dropped.
    pub fn gated(log: Arc<ContextLog>) -> (Self, Sender<()>) {
        let (release, gate) = mpsc::channel();
        let provider = Self {
            gate: Mutex::new(Some(gate)),
            ..Self::succeeding(log)
        };
        (provider, release)
    }

    /// Exposes `handle` under `component` from every context.
    pub fn with_component(mut self, component: &str, handle: ComponentHandle) -> Self {
        self.component = Some((component.to_owned(), handle));
        self
    }

    /// Blocks the first context close until `gate` fires or its sender drops.
    pub fn with_close_gate(self, gate: Receiver<()>) -> Self {
        *self.close_gate.lock().expect("close gate mutex poisoned") = Some(gate);
        self
    }
}

impl ContextProvider for FakeContextProvider {
    fn initialize(&self, name: &str) -> Result<Arc<dyn ServiceContext>, InitializationError> {
        let gate = self.gate.lock().expect("gate mutex poisoned").take();
        if let Some(gate) = gate {
            let _ = gate.recv();
        }
        if let Some(message) = &self.failure {
            return Err(InitializationError::new(name, message.clone()));
        }
        self.log.initialised.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeContext {
            log: Arc::clone(&self.log),
            component: self.component.clone(),
            close_gate: Arc::clone(&self.close_gate),
        }))
    }
}

struct FakeContext {
    log: Arc<ContextLog>,
    component: Option<(String, ComponentHandle)>,
    close_gate: Arc<Mutex<Option<Receiver<()>>>>,
}

impl ServiceContext for FakeContext {
    fn lookup(&self, component: &str) -> Option<ComponentHandle> {
        self.component
            .as_ref()
            .filter(|(name, _)| name == component)
            .map(|(_, handle)| Arc::clone(handle))
    }

    fn close(&self) {
        let gate = self.close_gate.lock().expect("close gate mutex poisoned").take();
        if let Some(gate) = gate {
            let _ = gate.recv();
        }
        self.log.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Router double that counts start and shutdown calls.
#[derive(Debug, Default)]
pub struct RecordingRouter {
    starts: AtomicUsize,
    shutdowns: AtomicUsize,
    fail_start: bool,
}

impl RecordingRouter {
    pub fn failing() -> Self {
        Self {
            fail_start: true,
            ..Self::default()
        }
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

impl Router for RecordingRouter {
    fn start(&self) -> Result<(), RouterStartError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            return Err(RouterStartError::new("address already in use"));
        }
        Ok(())
    }

    fn shutdown(&self, _handle: Option<ComponentHandle>) -> bool {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        !self.fail_start
    }
}

/// Signal source fed from a test-owned channel.
pub struct ChannelSignals {
    receiver: Option<Receiver<TerminationSignal>>,
}

impl ChannelSignals {
    pub fn new() -> (Self, Sender<TerminationSignal>) {
        let (sender, receiver) = mpsc::channel();
        (
            Self {
                receiver: Some(receiver),
            },
            sender,
        )
    }
}

impl SignalSource for ChannelSignals {
    fn install(&mut self) -> Result<InstalledSignals, SignalError> {
        self.receiver
            .take()
            .map(InstalledSignals::from_receiver)
            .ok_or_else(|| SignalError::Install {
                source: io::Error::other("signals already installed"),
            })
    }
}

/// Records exit codes instead of ending the test process.
#[derive(Debug, Default)]
pub struct RecordingExit {
    codes: Mutex<Vec<i32>>,
}

impl RecordingExit {
    pub fn codes(&self) -> Vec<i32> {
        self.codes.lock().expect("exit mutex poisoned").clone()
    }
}

impl ProcessExit for RecordingExit {
    fn exit(&self, code: i32) {
        self.codes.lock().expect("exit mutex poisoned").push(code);
    }
}

/// Console output sink readable from the test.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("buffer mutex poisoned")).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .expect("buffer mutex poisoned")
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Console input that yields lines sent by the test; EOF once the sender drops.
pub struct ChannelInput {
    lines: Receiver<String>,
    pending: Vec<u8>,
}

impl ChannelInput {
    pub fn new() -> (BufReader<Self>, Sender<String>) {
        let (sender, lines) = mpsc::channel();
        let input = Self {
            lines,
            pending: Vec::new(),
        };
        (BufReader::new(input), sender)
    }
}

impl Read for ChannelInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.lines.recv() {
                Ok(line) => {
                    self.pending = line.into_bytes();
                    self.pending.push(b'\n');
                }
                Err(_) => return Ok(0),
            }
        }
        let count = buf.len().min(self.pending.len());
        buf[..count].copy_from_slice(&self.pending[..count]);
        self.pending.drain(..count);
        Ok(count)
    }
}

/// Builds and drives one controller with recording collaborators.
pub struct ControllerWorld {
    pub name: String,
    pub registry: Arc<ProcessRegistry>,
    pub reporter: Arc<RecordingHealthReporter>,
    pub exit_hooks: Arc<ExitHooks>,
    pub contexts: Arc<ContextLog>,
    pub router: Option<Arc<RecordingRouter>>,
    pub exit: Arc<RecordingExit>,
    pub console: SharedBuffer,
    pub close_release: Option<Sender<()>>,
    fail_initialization: bool,
    close_gate: Option<Receiver<()>>,
    console_input: ConsoleInput,
    handle: Option<ControllerHandle>,
    signals: Option<Sender<TerminationSignal>>,
    input: Option<Sender<String>>,
    runner: Option<JoinHandle<Result<(), ControllerError>>>,
    outcome: Option<Result<(), ControllerError>>,
}

impl ControllerWorld {
    pub fn new() -> Self {
        let name = unique_name("world");
        let (input, input_sender) = ChannelInput::new();
        Self {
            console_input: ConsoleInput::new(name.clone(), input),
            name,
            registry: Arc::new(ProcessRegistry::new()),
            reporter: Arc::new(RecordingHealthReporter::default()),
            exit_hooks: Arc::new(ExitHooks::new()),
            contexts: Arc::new(ContextLog::default()),
            router: None,
            exit: Arc::new(RecordingExit::default()),
            console: SharedBuffer::default(),
            close_release: None,
            fail_initialization: false,
            close_gate: None,
            handle: None,
            signals: None,
            input: Some(input_sender),
            runner: None,
            outcome: None,
        }
    }

    pub fn use_router(&mut self) {
        self.router = Some(Arc::new(RecordingRouter::default()));
    }

    pub fn fail_initialization(&mut self) {
        self.fail_initialization = true;
    }

    /// Holds the service context's close until the returned sender fires.
    pub fn block_context_close(&mut self) -> Sender<()> {
        let (release, gate) = mpsc::channel();
        self.close_gate = Some(gate);
        release
    }

    /// Reads console lines from the same input as `other`.
    pub fn share_console_with(&mut self, other: &ControllerWorld) {
        self.console_input = other.console_input.clone();
        self.input = other.input.clone();
    }

    /// Builds the controller and runs it on a background thread.
    pub fn run(&mut self) {
        let provider = if self.fail_initialization {
            FakeContextProvider::failing(Arc::clone(&self.contexts), "database unreachable")
        } else {
            FakeContextProvider::succeeding(Arc::clone(&self.contexts))
        };
        let provider = match self.close_gate.take() {
            Some(gate) => provider.with_close_gate(gate),
            None => provider,
        };
        let deps = ControllerDeps {
            provider: Arc::new(provider),
            registry: Arc::clone(&self.registry),
            reporter: Arc::clone(&self.reporter) as Arc<dyn HealthReporter>,
            exit_hooks: Arc::clone(&self.exit_hooks),
            settings: fast_settings(),
        };
        let (signals, signal_sender) = ChannelSignals::new();
        let io = ProcessIo {
            signals: Box::new(signals),
            exit: Arc::clone(&self.exit) as Arc<dyn ProcessExit>,
            console_input: self.console_input.clone(),
            console_output: Box::new(self.console.clone()),
        };
        let controller = LifecycleController::new(self.name.clone(), deps).with_process_io(io);
        if let Some(router) = &self.router {
            controller.attach_router(Arc::clone(router) as Arc<dyn Router>);
        }
        self.handle = Some(controller.handle());
        self.signals = Some(signal_sender);
        self.runner = Some(thread::spawn(move || controller.run()));
    }

    pub fn handle(&self) -> ControllerHandle {
        self.handle.clone().expect("controller has not been run")
    }

    pub fn signal_sender(&self) -> Sender<TerminationSignal> {
        self.signals.clone().expect("controller has not been run")
    }

    pub fn input_sender(&self) -> Sender<String> {
        self.input.clone().expect("console input already closed")
    }

    pub fn send_signal(&self, signal: TerminationSignal) {
        self.signal_sender()
            .send(signal)
            .expect("signal watcher stopped listening");
    }

    pub fn type_line(&self, line: &str) {
        self.input_sender()
            .send(line.to_owned())
            .expect("console reader stopped listening");
    }

    /// Waits for `run` to return and keeps its result.
    pub fn finish(&mut self) -> &Result<(), ControllerError> {
        if let Some(runner) = self.runner.take() {
            self.input = None;
            let outcome = runner.join().expect("controller thread panicked");
            self.outcome = Some(outcome);
        }
        self.outcome.as_ref().expect("controller has not been run")
    }

    pub fn router(&self) -> &RecordingRouter {
        self.router.as_deref().expect("no router attached")
    }
}

impl Drop for ControllerWorld {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.shutdown();
        }
        self.close_release = None;
        self.input = None;
        self.signals = None;
    }
}
