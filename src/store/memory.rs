//! In-memory implementation of [`Datastore`].

use super::{App, Datastore, Route, StoreError};
use crate::routing::RouteMatcher;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

struct AppEntry {
    app: App,
    routes: Arc<RouteMatcher<Route>>,
}

/// In-memory store of apps and routes.
///
/// This is useful for development and testing, or for single-node
/// deployments where routes are loaded from configuration at startup.
#[derive(Default)]
pub struct MemoryStore {
    apps: RwLock<HashMap<String, Arc<AppEntry>>>,
}

impl MemoryStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    async fn entry(&self, app: &str) -> Result<Arc<AppEntry>, StoreError> {
        let apps = self.apps.read().await;
        apps.get(app)
            .cloned()
            .ok_or_else(|| StoreError::new(format!("App '{}' not found", app)))
    }

    /// Create an app, or replace its configuration if it already exists.
    /// Routes of an existing app are kept.
    pub async fn put_app(&self, app: App) {
        let mut apps = self.apps.write().await;
        let routes = apps
            .get(&app.name)
            .map(|entry| entry.routes.clone())
            .unwrap_or_default();
        info!(app = %app.name, "Stored app");
        apps.insert(app.name.clone(), Arc::new(AppEntry { app, routes }));
    }

    /// Remove an app and all of its routes.
    pub async fn remove_app(&self, name: &str) -> Result<(), StoreError> {
        let mut apps = self.apps.write().await;
        apps.remove(name)
            .ok_or_else(|| StoreError::new(format!("App '{}' not found", name)))?;
        info!(app = %name, "Removed app");
        Ok(())
    }

    /// List all apps.
    pub async fn list_apps(&self) -> Vec<App> {
        let apps = self.apps.read().await;
        let mut list: Vec<App> = apps.values().map(|entry| entry.app.clone()).collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    /// Register a route for an existing app.
    ///
    /// Fails when the app is unknown or the route's pattern conflicts with
    /// one already registered.
    pub async fn add_route(&self, app: &str, route: Route) -> Result<(), StoreError> {
        let entry = self.entry(app).await?;
        let path = route.path.clone();
        entry.routes.insert(path.clone(), route)?;
        info!(app = %app, route = %path, "Registered route");
        Ok(())
    }

    /// Unregister the route with exactly this pattern.
    pub async fn remove_route(&self, app: &str, path: &str) -> Result<Route, StoreError> {
        let entry = self.entry(app).await?;
        let route = entry.routes.remove(path).ok_or_else(|| {
            StoreError::new(format!("Route '{}' not found in app '{}'", path, app))
        })?;
        info!(app = %app, route = %path, "Removed route");
        Ok(route)
    }

    /// List the routes of an app, sorted by pattern.
    pub async fn list_routes(&self, app: &str) -> Result<Vec<Route>, StoreError> {
        let entry = self.entry(app).await?;
        Ok(entry.routes.routes().into_iter().map(|(_, route)| route).collect())
    }
}

#[async_trait]
impl Datastore for MemoryStore {
    async fn get_app(&self, name: &str) -> Result<Option<App>, StoreError> {
        let apps = self.apps.read().await;
        Ok(apps.get(name).map(|entry| entry.app.clone()))
    }

    async fn get_route(&self, app: &str, path: &str) -> Result<Option<Route>, StoreError> {
        let routes = {
            let apps = self.apps.read().await;
            match apps.get(app) {
                Some(entry) => entry.routes.clone(),
                None => return Ok(None),
            }
        };
        Ok(routes.lookup(path).map(|m| m.value))
    }

    async fn get_route_by_pattern(
        &self,
        app: &str,
        pattern: &str,
    ) -> Result<Option<Route>, StoreError> {
        let apps = self.apps.read().await;
        Ok(apps.get(app).and_then(|entry| entry.routes.get(pattern)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn demo_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.put_app(App::new("demo").config("region", "eu")).await;
        store
            .add_route("demo", Route::new("/hello", "iron/hello"))
            .await
            .unwrap();
        store
            .add_route("demo", Route::new("/:name", "iron/named"))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_get_app() {
        let store = demo_store().await;

        let app = store.get_app("demo").await.unwrap().unwrap();
        assert_eq!(app.config["region"], "eu");
        assert!(store.get_app("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_route_through_trie() {
        let store = demo_store().await;

        let route = store.get_route("demo", "/hello").await.unwrap().unwrap();
        assert_eq!(route.image, "iron/hello");

        let route = store.get_route("demo", "/other").await.unwrap().unwrap();
        assert_eq!(route.path, "/:name");

        assert!(store.get_route("demo", "/a/b").await.unwrap().is_none());
        assert!(store.get_route("missing", "/hello").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_route_by_pattern() {
        let store = demo_store().await;

        let route = store.get_route_by_pattern("demo", "/:name").await.unwrap().unwrap();
        assert_eq!(route.path, "/:name");
        assert!(store.get_route_by_pattern("demo", "/other").await.unwrap().is_none());
        assert!(store.get_route_by_pattern("missing", "/hello").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_route_to_unknown_app() {
        let store = MemoryStore::new();
        let result = store.add_route("nope", Route::new("/a", "img")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_conflicting_route_rejected() {
        let store = demo_store().await;

        let result = store.add_route("demo", Route::new("/:other", "img")).await;
        assert!(result.unwrap_err().message.contains("conflicts"));
        let result = store.add_route("demo", Route::new("/hello", "img2")).await;
        assert!(result.is_err());

        let route = store.get_route("demo", "/hello").await.unwrap().unwrap();
        assert_eq!(route.image, "iron/hello");
    }

    #[tokio::test]
    async fn test_put_app_keeps_routes() {
        let store = demo_store().await;
        store.put_app(App::new("demo").config("region", "us")).await;

        let app = store.get_app("demo").await.unwrap().unwrap();
        assert_eq!(app.config["region"], "us");
        assert_eq!(store.list_routes("demo").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_remove_route_and_app() {
        let store = demo_store().await;

        let removed = store.remove_route("demo", "/:name").await.unwrap();
        assert_eq!(removed.image, "iron/named");
        assert!(store.get_route("demo", "/other").await.unwrap().is_none());
        assert!(store.remove_route("demo", "/:name").await.is_err());

        let routes = store.list_routes("demo").await.unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].path, "/hello");

        store.remove_app("demo").await.unwrap();
        assert!(store.get_app("demo").await.unwrap().is_none());
        assert!(store.list_apps().await.is_empty());
        assert!(store.remove_app("demo").await.is_err());
    }
}
