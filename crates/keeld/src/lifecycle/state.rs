//! Shared controller state guarded by one mutex and condition variable.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::context::ServiceContext;

/// Controller lifecycle phase. Transitions only move forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// Constructed; `run` has not been called.
    #[default]
    Created,
    /// `run` is active and no stop has been requested.
    Running,
    /// A shutdown trigger fired; teardown may still be in progress.
    Stopping,
    /// Teardown finished.
    Stopped,
}

#[derive(Default)]
struct Flags {
    phase: Phase,
    started: bool,
    teardown_claimed: bool,
    context: Option<Arc<dyn ServiceContext>>,
}

impl Flags {
    fn stopping(&self) -> bool {
        self.phase >= Phase::Stopping
    }

    fn advance(&mut self, phase: Phase) {
        if phase > self.phase {
            self.phase = phase;
        }
    }
}

#[derive(Default)]
pub(crate) struct LifecycleState {
    flags: Mutex<Flags>,
    changed: Condvar,
}

impl LifecycleState {
    fn lock(&self) -> MutexGuard<'_, Flags> {
        self.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update<R>(&self, apply: impl FnOnce(&mut Flags) -> R) -> R {
        let result = {
            let mut flags = self.lock();
            apply(&mut *flags)
        };
        self.changed.notify_all();
        result
    }

    pub(crate) fn phase(&self) -> Phase {
        self.lock().phase
    }

    pub(crate) fn is_started(&self) -> bool {
        self.lock().started
    }

    pub(crate) fn is_stopping(&self) -> bool {
        self.lock().stopping()
    }

    pub(crate) fn mark_running(&self) {
        self.update(|flags| flags.advance(Phase::Running));
    }

    /// Stores the freshly initialised context unless a stop already won.
    pub(crate) fn install_context(
        &self,
        context: Arc<dyn ServiceContext>,
    ) -> Result<(), Arc<dyn ServiceContext>> {
        self.update(|flags| {
            if flags.stopping() {
                return Err(context);
            }
            flags.context = Some(context);
            Ok(())
        })
    }

    /// Sets `started` unless a stop already won.
    pub(crate) fn mark_started(&self) -> bool {
        self.update(|flags| {
            if flags.stopping() {
                return false;
            }
            flags.started = true;
            true
        })
    }

    pub(crate) fn request_stop(&self) {
        self.update(|flags| flags.advance(Phase::Stopping));
    }

    /// Moves to `Stopping` and hands the context to the first caller only.
    ///
    /// Returns `None` when an earlier caller already claimed teardown.
    pub(crate) fn claim_teardown(&self) -> Option<Option<Arc<dyn ServiceContext>>> {
        self.update(|flags| {
            flags.advance(Phase::Stopping);
            if flags.teardown_claimed {
                return None;
            }
            flags.teardown_claimed = true;
            Some(flags.context.take())
        })
    }

    pub(crate) fn mark_stopped(&self) {
        self.update(|flags| flags.advance(Phase::Stopped));
    }

    /// Blocks until `started` or stopping, waking at least every `interval`.
    ///
    /// Returns `true` when the controller is usable.
    pub(crate) fn wait_for_startup(&self, interval: Duration) -> bool {
        let mut flags = self.lock();
        while !flags.started && !flags.stopping() {
            flags = self
                .changed
                .wait_timeout(flags, interval)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        !flags.stopping()
    }

    /// Waits up to `timeout` for a stop request. Returns whether stopping.
    pub(crate) fn wait_for_stop(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut flags = self.lock();
        while !flags.stopping() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            flags = self
                .changed
                .wait_timeout(flags, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        flags.stopping()
    }

    pub(crate) fn wait_until_stopped(&self) {
        let mut flags = self.lock();
        while flags.phase != Phase::Stopped {
            flags = self
                .changed
                .wait(flags)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}
