//! Route matching for function deployments.
//!
//! [`RouteTree`] is the plain compressed prefix tree. [`RouteMatcher`] wraps
//! it in an atomically swapped snapshot: registration clones the current
//! tree, inserts into the copy and publishes it, while lookups read whatever
//! snapshot is current without taking a lock.

mod tree;

pub use tree::{Match, Param, Params, RouteError, RouteTree};

use arc_swap::ArcSwap;
use std::sync::{Arc, Mutex, PoisonError};

/// Owned result of a [`RouteMatcher`] lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matched<T> {
    pub value: T,
    pub pattern: String,
    pub params: Params,
}

/// Copy-on-write route tree shared between request handlers.
pub struct RouteMatcher<T> {
    current: ArcSwap<RouteTree<T>>,
    /// Serializes writers so concurrent registrations don't lose updates.
    writer: Mutex<()>,
}

impl<T> RouteMatcher<T> {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(RouteTree::new()),
            writer: Mutex::new(()),
        }
    }

    /// The tree as of now. Later registrations do not affect the snapshot.
    pub fn snapshot(&self) -> Arc<RouteTree<T>> {
        self.current.load_full()
    }

    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> RouteMatcher<T> {
    /// Register `pattern`. Fails without publishing anything on conflict.
    pub fn insert(&self, pattern: impl Into<String>, value: T) -> Result<(), RouteError> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next: RouteTree<T> = (**self.current.load()).clone();
        next.insert(pattern, value)?;
        self.current.store(Arc::new(next));
        Ok(())
    }

    /// Unregister `pattern`, returning its value if it was present.
    pub fn remove(&self, pattern: &str) -> Option<T> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next: RouteTree<T> = (**self.current.load()).clone();
        let removed = next.remove(pattern)?;
        self.current.store(Arc::new(next));
        Some(removed)
    }

    /// Resolve `path` against the current snapshot.
    pub fn lookup(&self, path: &str) -> Option<Matched<T>> {
        let tree = self.current.load();
        tree.at(path).map(|m| Matched {
            value: m.value.clone(),
            pattern: m.pattern.to_string(),
            params: m.params,
        })
    }

    /// All registered routes, sorted by pattern.
    /// Value registered under exactly `pattern`.
    pub fn get(&self, pattern: &str) -> Option<T> {
        self.current.load().get(pattern).cloned()
    }

    pub fn routes(&self) -> Vec<(String, T)> {
        let tree = self.current.load();
        let mut routes: Vec<(String, T)> = tree
            .routes()
            .map(|(pattern, value)| (pattern.to_string(), value.clone()))
            .collect();
        routes.sort_by(|a, b| a.0.cmp(&b.0));
        routes
    }
}

impl<T> Default for RouteMatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Bind the parameters of `pattern` against `path`.
///
/// Returns `None` when the pattern is invalid or does not match the path.
pub fn bind_params(pattern: &str, path: &str) -> Option<Params> {
    let mut tree = RouteTree::new();
    tree.insert(pattern, ()).ok()?;
    tree.at(path).map(|m| m.params)
}

/// Lexically normalize a route path: collapse repeated slashes, resolve
/// `.` and `..` segments and drop any trailing slash. Always rooted.
pub fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            segment => segments.push(segment),
        }
    }
    format!("/{}", segments.join("/"))
}
