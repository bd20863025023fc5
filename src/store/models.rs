//! App and route definitions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A named collection of functions sharing configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct App {
    /// Unique app name.
    pub name: String,
    /// Configuration exposed to every function of the app.
    #[serde(default)]
    pub config: HashMap<String, String>,
}

impl App {
    /// Create a new app with empty configuration.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: HashMap::new(),
        }
    }

    /// Add a configuration entry.
    pub fn config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }
}

/// How a route is meant to be invoked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteType {
    #[default]
    Sync,
    Async,
}

/// One function deployment inside an app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Path pattern, e.g. `/hello` or `/users/:id`.
    pub path: String,
    /// Image reference handed to the execution backend.
    pub image: String,
    /// Memory limit in MiB.
    #[serde(default = "default_memory")]
    pub memory: u64,
    #[serde(rename = "type", default)]
    pub route_type: RouteType,
    #[serde(default)]
    pub config: HashMap<String, String>,
    /// Headers copied onto every successful response.
    #[serde(default)]
    pub headers: HashMap<String, Vec<String>>,
}

fn default_memory() -> u64 {
    128
}

impl Route {
    /// Create a new sync route with default limits.
    pub fn new(path: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            image: image.into(),
            memory: default_memory(),
            route_type: RouteType::Sync,
            config: HashMap::new(),
            headers: HashMap::new(),
        }
    }

    /// Set the memory limit in MiB.
    pub fn memory(mut self, memory: u64) -> Self {
        self.memory = memory;
        self
    }

    /// Set the route type.
    pub fn route_type(mut self, route_type: RouteType) -> Self {
        self.route_type = route_type;
        self
    }

    /// Add a configuration entry.
    pub fn config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Append a response header value.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.entry(name.into()).or_default().push(value.into());
        self
    }
}
