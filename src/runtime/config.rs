//! Gateway configuration.

use crate::store::{App, MemoryStore, Route, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// An app together with the routes registered under it at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppDefinition {
    #[serde(flatten)]
    pub app: App,
    #[serde(default)]
    pub routes: Vec<Route>,
}

/// Configuration for the gateway server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Function timeout in seconds.
    pub request_timeout: u64,
    /// Maximum request body size in bytes.
    pub max_body_size: usize,
    /// Maximum captured function output in bytes.
    pub max_output_size: usize,
    /// Whether to enable health check endpoint.
    pub enable_health: bool,
    /// Whether to enable metrics endpoint.
    pub enable_metrics: bool,
    /// Host header value → app name, for requests outside `/r/{app}`.
    pub app_hosts: HashMap<String, String>,
    /// Apps and routes loaded into the in-memory store on startup.
    pub apps: Vec<AppDefinition>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout: 30,
            max_body_size: 10 * 1024 * 1024, // 10MB
            max_output_size: 1024 * 1024,
            enable_health: true,
            enable_metrics: true,
            app_hosts: HashMap::new(),
            apps: Vec::new(),
        }
    }
}

/// Failure to load a [`GatewayConfig`].
#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
}

impl ConfigError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid configuration: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

impl GatewayConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::new(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|e| ConfigError::new(e.to_string()))
    }

    /// Set the host address.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the function timeout in seconds.
    pub fn request_timeout(mut self, secs: u64) -> Self {
        self.request_timeout = secs;
        self
    }

    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }

    pub fn max_output_size(mut self, bytes: usize) -> Self {
        self.max_output_size = bytes;
        self
    }

    /// Serve requests for `host` as app `app`.
    pub fn app_host(mut self, host: impl Into<String>, app: impl Into<String>) -> Self {
        self.app_hosts.insert(host.into(), app.into());
        self
    }

    /// Add an app with its routes to the startup set.
    pub fn app(mut self, app: App, routes: Vec<Route>) -> Self {
        self.apps.push(AppDefinition { app, routes });
        self
    }

    /// Get the bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Load the configured apps and routes into `store`.
    pub async fn seed(&self, store: &MemoryStore) -> Result<(), StoreError> {
        for definition in &self.apps {
            store.put_app(definition.app.clone()).await;
            for route in &definition.routes {
                store.add_route(&definition.app.name, route.clone()).await?;
            }
        }
        Ok(())
    }
}
