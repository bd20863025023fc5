//! HTTP front end: configuration and the server that feeds the dispatcher.

mod config;
mod server;

pub use config::{AppDefinition, ConfigError, GatewayConfig};
pub use server::GatewayServer;
