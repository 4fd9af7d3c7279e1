//! Context provider used by the `keeld` binary when no real service is
//! linked in.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::context::{ComponentHandle, ContextProvider, InitializationError, ServiceContext};

const STANDALONE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::context::standalone");

/// Provider whose contexts hold no resources and expose no components.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandaloneContextProvider;

impl ContextProvider for StandaloneContextProvider {
    fn initialize(&self, name: &str) -> Result<Arc<dyn ServiceContext>, InitializationError> {
        tracing::warn!(
            target: STANDALONE_TARGET,
            instance = name,
            "no service linked in; running an empty context"
        );
        Ok(Arc::new(StandaloneContext {
            name: name.to_owned(),
            closed: AtomicBool::new(false),
        }))
    }
}

#[derive(Debug)]
struct StandaloneContext {
    name: String,
    closed: AtomicBool,
}

impl ServiceContext for StandaloneContext {
    fn lookup(&self, _component: &str) -> Option<ComponentHandle> {
        None
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!(target: STANDALONE_TARGET, instance = %self.name, "context closed");
        }
    }
}
