//! Process-wide table of live controllers keyed by instance name.
//!
//! A controller registers itself on construction and removes itself at the
//! start of shutdown. Exit hooks and signal paths use the table to find "their"
//! controller without holding a reference to it.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;
use tracing::{debug, warn};

use crate::lifecycle::ControllerHandle;

const REGISTRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registry");

static GLOBAL: Lazy<Arc<ProcessRegistry>> = Lazy::new(|| Arc::new(ProcessRegistry::new()));

/// Concurrent map from instance name to controller.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    entries: RwLock<HashMap<String, ControllerHandle>>,
}

impl ProcessRegistry {
    /// Builds an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared registry for the current process.
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL)
    }

    /// Records `handle` under its name, returning any entry it displaced.
    ///
    /// Registering a second live controller under the same name replaces the
    /// first; the displaced controller can then only be shut down through its
    /// own handle.
    pub fn register(&self, handle: ControllerHandle) -> Option<ControllerHandle> {
        let name = handle.name().to_owned();
        let previous = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), handle);
        if previous.is_some() {
            warn!(
                target: REGISTRY_TARGET,
                instance = %name,
                "instance name already registered; replacing previous controller"
            );
        } else {
            debug!(target: REGISTRY_TARGET, instance = %name, "controller registered");
        }
        previous
    }

    /// Returns the controller registered under `name`.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<ControllerHandle> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Removes the entry for `name` if it still refers to `handle`.
    ///
    /// Returns `true` when an entry was removed.
    pub fn deregister(&self, name: &str, handle: &ControllerHandle) -> bool {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let owned = entries
            .get(name)
            .is_some_and(|current| current.same_instance(handle));
        if owned {
            entries.remove(name);
            debug!(target: REGISTRY_TARGET, instance = %name, "controller deregistered");
        }
        owned
    }

    /// Returns `true` when a controller is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Number of registered controllers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` when no controller is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
