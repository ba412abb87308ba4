//! Book-keeping of watched node paths.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use crate::store::{is_descendant, parent_path};

#[derive(Debug)]
struct Entry {
    generation: u64,
    token: CancellationToken,
}

/// A freshly registered path.
#[derive(Debug, Clone)]
pub struct Registration {
    pub generation: u64,
    pub token: CancellationToken,
}

/// Maps each watched node path to the token that stops its watches.
///
/// Every registration gets a new generation number, so messages from a
/// watcher that has since been replaced can be told apart from current ones.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    entries: HashMap<String, Entry>,
    next_generation: u64,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `path` under `parent`. Returns `None` when the path is
    /// already watched.
    pub fn register(&mut self, path: &str, parent: &CancellationToken) -> Option<Registration> {
        if self.entries.contains_key(path) {
            return None;
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        let token = parent.child_token();
        self.entries.insert(
            path.to_string(),
            Entry {
                generation,
                token: token.clone(),
            },
        );
        Some(Registration { generation, token })
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn is_current(&self, path: &str, generation: u64) -> bool {
        self.entries
            .get(path)
            .map(|e| e.generation == generation)
            .unwrap_or(false)
    }

    pub fn token(&self, path: &str) -> Option<CancellationToken> {
        self.entries.get(path).map(|e| e.token.clone())
    }

    /// Registered paths whose parent is `parent`.
    pub fn direct_children(&self, parent: &str) -> Vec<String> {
        self.entries
            .keys()
            .filter(|p| parent_path(p) == Some(parent))
            .cloned()
            .collect()
    }

    /// Cancels and removes `path` together with everything below it.
    /// Returns the removed paths, sorted.
    pub fn remove_subtree(&mut self, path: &str) -> Vec<String> {
        let mut removed: Vec<String> = self
            .entries
            .keys()
            .filter(|p| p.as_str() == path || is_descendant(p, path))
            .cloned()
            .collect();
        removed.sort();

        for p in &removed {
            if let Some(entry) = self.entries.remove(p) {
                entry.token.cancel();
            }
        }
        removed
    }

    /// Cancels and removes everything.
    pub fn clear(&mut self) -> Vec<String> {
        let mut removed: Vec<String> = self.entries.keys().cloned().collect();
        removed.sort();
        for (_, entry) in self.entries.drain() {
            entry.token.cancel();
        }
        removed
    }

    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.entries.keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_deduplicated() {
        let root = CancellationToken::new();
        let mut registry = WatchRegistry::new();

        let first = registry.register("/config-manage/app1/port", &root);
        assert!(first.is_some());
        assert!(registry.register("/config-manage/app1/port", &root).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_generations_are_unique() {
        let root = CancellationToken::new();
        let mut registry = WatchRegistry::new();

        let first = registry.register("/a", &root).unwrap();
        registry.remove_subtree("/a");
        let second = registry.register("/a", &root).unwrap();

        assert_ne!(first.generation, second.generation);
        assert!(registry.is_current("/a", second.generation));
        assert!(!registry.is_current("/a", first.generation));
    }

    #[test]
    fn test_remove_subtree_cancels_descendants_only() {
        let root = CancellationToken::new();
        let mut registry = WatchRegistry::new();

        let app = registry.register("/app", &root).unwrap();
        let db = registry.register("/app/db", &app.token).unwrap();
        let user = registry.register("/app/db/user", &db.token).unwrap();
        let port = registry.register("/app/port", &app.token).unwrap();
        let dbx = registry.register("/app/dbx", &app.token).unwrap();

        let removed = registry.remove_subtree("/app/db");

        assert_eq!(removed, vec!["/app/db", "/app/db/user"]);
        assert!(db.token.is_cancelled());
        assert!(user.token.is_cancelled());
        assert!(!port.token.is_cancelled());
        assert!(!dbx.token.is_cancelled());
        assert_eq!(registry.paths(), vec!["/app", "/app/dbx", "/app/port"]);
    }

    #[test]
    fn test_parent_cancellation_reaches_children() {
        let root = CancellationToken::new();
        let mut registry = WatchRegistry::new();

        let app = registry.register("/app", &root).unwrap();
        let port = registry.register("/app/port", &app.token).unwrap();

        root.cancel();
        assert!(port.token.is_cancelled());
    }

    #[test]
    fn test_direct_children() {
        let root = CancellationToken::new();
        let mut registry = WatchRegistry::new();
        registry.register("/app", &root);
        registry.register("/app/port", &root);
        registry.register("/app/db", &root);
        registry.register("/app/db/user", &root);

        let mut children = registry.direct_children("/app");
        children.sort();
        assert_eq!(children, vec!["/app/db", "/app/port"]);
    }
}
