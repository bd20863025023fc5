//! # fngate - function gateway
//!
//! fngate maps HTTP requests onto functions. A request names an app (in the
//! path as `/r/{app}/...` or through its Host header), the app's route table
//! picks the function, and the function runs through an execution backend
//! with the request described in its environment. Whatever the function
//! writes to stdout becomes the response body.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     GatewayServer (hyper)                        │
//! └──────────────────────────────────────────────────────────────────┘
//!                                  │
//!                                  ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           Dispatcher                             │
//! │  resolve app → resolve route → build env → execute → respond     │
//! │       │              │                          │                │
//! │       ▼              ▼                          ▼                │
//! │  ┌──────────┐  ┌─────────────┐          ┌──────────────────┐     │
//! │  │Datastore │  │RouteMatcher │          │ExecutionBackend  │     │
//! │  └──────────┘  └─────────────┘          └──────────────────┘     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use fngate::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let store = MemoryStore::new();
//!     store.put_app(App::new("demo")).await;
//!     store
//!         .add_route("demo", Route::new("/hello", "echo hello"))
//!         .await?;
//!
//!     let server = GatewayServer::new(
//!         GatewayConfig::new().port(8080),
//!         Arc::new(store),
//!         Arc::new(CommandBackend::new()),
//!     );
//!     server.run().await
//! }
//! ```
//!
//! ## Function contract
//!
//! A function receives `METHOD`, `ROUTE`, `PAYLOAD` and `REQUEST_URL`, plus
//! `CONFIG_*` (app config overridden by route config), `PARAM_*` for route
//! parameters and `HEADER_*` for request headers. Exit status zero with
//! output within the configured bound answers 200; anything else answers
//! 500.

pub mod dispatch;
pub mod http;
pub mod routing;
pub mod runner;
pub mod runtime;
pub mod store;

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::dispatch::{
        DispatchError, Dispatcher, DispatcherConfig, InMemoryMetrics, MetricsSink,
    };
    pub use crate::http::{GatewayRequest, GatewayResponse, Method, StatusCode};
    pub use crate::routing::{Params, RouteMatcher};
    pub use crate::runner::{
        CommandBackend, ExecutionBackend, ExecutionError, ExecutionRequest, ExecutionResult,
        LoggerFactory,
    };
    pub use crate::runtime::{GatewayConfig, GatewayServer};
    pub use crate::store::{App, Datastore, MemoryStore, Route, StoreError};
    pub use async_trait::async_trait;
}

// Re-export for convenience
pub use dispatch::{Dispatcher, DispatcherConfig};
pub use http::{GatewayRequest, GatewayResponse};
pub use runtime::{GatewayConfig, GatewayServer};
