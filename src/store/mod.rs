//! App and route storage.
//!
//! The dispatcher only reads through the [`Datastore`] trait, so any backend
//! (a database, etcd, a remote API) can be plugged in. [`MemoryStore`] keeps
//! everything in process and resolves routes through a [`RouteMatcher`] per
//! app.
//!
//! [`RouteMatcher`]: crate::routing::RouteMatcher

mod memory;
mod models;

pub use memory::MemoryStore;
pub use models::{App, Route, RouteType};

use async_trait::async_trait;

/// Read access to apps and routes.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Look up an app by name. `Ok(None)` means it does not exist.
    async fn get_app(&self, name: &str) -> Result<Option<App>, StoreError>;

    /// Resolve `path` to a route of `app`. `Ok(None)` means no route matches.
    async fn get_route(&self, app: &str, path: &str) -> Result<Option<Route>, StoreError>;

    /// Fetch the route registered under exactly `pattern`, without matching.
    async fn get_route_by_pattern(
        &self,
        app: &str,
        pattern: &str,
    ) -> Result<Option<Route>, StoreError>;
}

/// Error type for store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    /// Error message.
    pub message: String,
}

impl StoreError {
    /// Create a new store error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StoreError: {}", self.message)
    }
}

impl std::error::Error for StoreError {}

impl From<crate::routing::RouteError> for StoreError {
    fn from(err: crate::routing::RouteError) -> Self {
        StoreError::new(err.to_string())
    }
}
