//! Deferred teardown callbacks run once at process end.
//!
//! The binary holds an [`ExitHookGuard`] for the lifetime of `main`; dropping
//! it (normal return or unwinding) drains the queue. Hooks registered after
//! the queue has drained run immediately, so a late registration is never
//! silently lost.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use once_cell::sync::Lazy;
use tracing::{debug, error};

const HOOKS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::exit_hooks");

static GLOBAL: Lazy<Arc<ExitHooks>> = Lazy::new(|| Arc::new(ExitHooks::new()));

type Hook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Queue {
    hooks: Vec<(String, Hook)>,
    drained: bool,
}

/// Ordered queue of callbacks to run when the process finishes.
#[derive(Default)]
pub struct ExitHooks {
    queue: Mutex<Queue>,
}

impl ExitHooks {
    /// Builds an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared queue for the current process.
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL)
    }

    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues `hook` to run at process end.
    pub fn register<F>(&self, label: impl Into<String>, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let label = label.into();
        let mut queue = self.lock();
        if queue.drained {
            drop(queue);
            debug!(target: HOOKS_TARGET, hook = %label, "exit hooks already ran; running now");
            run_hook(&label, Box::new(hook));
            return;
        }
        debug!(target: HOOKS_TARGET, hook = %label, "exit hook registered");
        queue.hooks.push((label, Box::new(hook)));
    }

    /// Runs every queued hook once, in registration order.
    pub fn run_all(&self) {
        let hooks = {
            let mut queue = self.lock();
            queue.drained = true;
            std::mem::take(&mut queue.hooks)
        };
        for (label, hook) in hooks {
            run_hook(&label, hook);
        }
    }

    /// Number of hooks still waiting to run.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lock().hooks.len()
    }

    /// Returns a guard that drains the queue when dropped.
    #[must_use]
    pub fn guard(self: &Arc<Self>) -> ExitHookGuard {
        ExitHookGuard {
            hooks: Arc::clone(self),
        }
    }
}

impl fmt::Debug for ExitHooks {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queue = self.lock();
        formatter
            .debug_struct("ExitHooks")
            .field("pending", &queue.hooks.len())
            .field("drained", &queue.drained)
            .finish()
    }
}

fn run_hook(label: &str, hook: Hook) {
    debug!(target: HOOKS_TARGET, hook = %label, "running exit hook");
    if panic::catch_unwind(AssertUnwindSafe(hook)).is_err() {
        error!(target: HOOKS_TARGET, hook = %label, "exit hook panicked");
    }
}

/// Drains an [`ExitHooks`] queue on drop.
#[derive(Debug)]
#[must_use = "dropping the guard runs the exit hooks immediately"]
pub struct ExitHookGuard {
    hooks: Arc<ExitHooks>,
}

impl Drop for ExitHookGuard {
    fn drop(&mut self) {
        self.hooks.run_all();
    }
}
