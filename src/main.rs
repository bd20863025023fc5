//! fngate server binary.
//!
//! Usage: `fngate [config.json]`. Apps and routes listed in the config are
//! loaded into an in-memory store; functions run as local processes.

use fngate::prelude::*;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            tracing::info!("Loading configuration from {}", path);
            GatewayConfig::from_file(path)?
        }
        None => GatewayConfig::new(),
    };

    let store = MemoryStore::new();
    config.seed(&store).await?;
    for app in store.list_apps().await {
        let routes = store.list_routes(&app.name).await?;
        tracing::info!(app = %app.name, routes = routes.len(), "Loaded app");
    }

    let server = GatewayServer::new(config, Arc::new(store), Arc::new(CommandBackend::new()));

    tracing::info!("Try: curl http://localhost:{}/r/{{app}}/{{route}}", server.config().port);
    tracing::info!("Health check: curl http://localhost:{}/_health", server.config().port);

    server.run().await
}
