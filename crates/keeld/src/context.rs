//! Contracts for the service context that startup brings online.
//!
//! The controller never inspects the context beyond these operations: it is
//! created by [`ContextProvider::initialize`], queried once for the component
//! the router needs at shutdown, and finally closed.

use std::any::Any;
use std::sync::Arc;

use thiserror::Error;

/// Opaque component exposed by a service context.
pub type ComponentHandle = Arc<dyn Any + Send + Sync>;

/// Heavyweight runtime environment owned by one controller instance.
pub trait ServiceContext: Send + Sync {
    /// Returns the named component, if the context provides it.
    fn lookup(&self, component: &str) -> Option<ComponentHandle>;

    /// Releases every resource held by the context. Must be idempotent.
    fn close(&self);
}

/// Factory for service contexts.
pub trait ContextProvider: Send + Sync {
    /// Builds the context for `name`. May block for as long as the backing
    /// stores and listeners take to come up.
    fn initialize(&self, name: &str) -> Result<Arc<dyn ServiceContext>, InitializationError>;
}

/// The service context could not be constructed.
#[derive(Debug, Error)]
#[error("failed to initialise service context '{name}': {message}")]
pub struct InitializationError {
    name: String,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl InitializationError {
    /// Builds an error without an underlying source.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Builds an error that wraps an underlying source.
    #[must_use]
    pub fn with_source(
        name: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Name of the context that failed.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Human-readable failure description.
    #[must_use]
    pub fn message(&self) -> &str {
        self.message.as_str()
    }
}
