//! Coordination store seam.
//!
//! The mirror only needs four operations from the store: an existence check,
//! node creation for bootstrap, and the two one-shot watched reads. Every
//! watched read returns the current snapshot together with a future that
//! resolves once the store fires the watch.

pub mod memory;
#[cfg(feature = "zookeeper")]
pub mod zookeeper;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::error::StoreError;

pub use memory::MemoryStore;
#[cfg(feature = "zookeeper")]
pub use self::zookeeper::ZooKeeperStore;

/// What made a watch fire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEventKind {
    NodeCreated,
    NodeDeleted,
    DataChanged,
    ChildrenChanged,
    /// The session changed state; the watch carries no data change and the
    /// path can no longer be observed through it.
    Session(String),
}

/// A fired watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
    pub path: String,
    pub kind: StoreEventKind,
}

impl StoreEvent {
    pub fn new(path: impl Into<String>, kind: StoreEventKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// Returns the session state when this event reports a broken watch.
    pub fn session_error(&self) -> Option<&str> {
        match &self.kind {
            StoreEventKind::Session(state) => Some(state),
            _ => None,
        }
    }
}

/// A snapshot read that armed a one-shot watch.
pub struct Watched<T> {
    pub snapshot: T,
    pub fired: BoxFuture<'static, StoreEvent>,
}

impl<T: std::fmt::Debug> std::fmt::Debug for Watched<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watched")
            .field("snapshot", &self.snapshot)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait CoordinationStore: Send + Sync + 'static {
    async fn exists(&self, path: &str) -> Result<bool, StoreError>;

    /// Creates a persistent node. Fails with [`StoreError::NodeExists`] when
    /// the node is already present.
    async fn create(&self, path: &str, data: &[u8]) -> Result<(), StoreError>;

    async fn children_watch(&self, path: &str) -> Result<Watched<Vec<String>>, StoreError>;

    async fn value_watch(&self, path: &str) -> Result<Watched<Vec<u8>>, StoreError>;
}

/// Creates `path` unless it already exists. Returns whether a node was created.
pub async fn ensure_node<S>(store: &S, path: &str, data: &[u8]) -> Result<bool, StoreError>
where
    S: CoordinationStore + ?Sized,
{
    let exists = store.exists(path).await.map_err(|e| StoreError::NodeCreate {
        path: path.to_string(),
        message: e.to_string(),
    })?;
    if exists {
        log::debug!("Node {} already exists", path);
        return Ok(false);
    }

    match store.create(path, data).await {
        Ok(()) => {
            log::info!("Created node {}", path);
            Ok(true)
        }
        // Lost a race with another creator; the node is there either way.
        Err(StoreError::NodeExists { .. }) => Ok(false),
        Err(StoreError::NodeCreate { path, message }) => {
            Err(StoreError::NodeCreate { path, message })
        }
        Err(e) => Err(StoreError::NodeCreate {
            path: path.to_string(),
            message: e.to_string(),
        }),
    }
}

/// Final segment of a slash-delimited node path.
pub fn node_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Joins a parent path and a child name.
pub fn child_path(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{}{}", parent, name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Returns the parent of `path`, or `None` for the root.
pub fn parent_path(path: &str) -> Option<&str> {
    if path == "/" || path.is_empty() {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// True when `path` lies strictly below `ancestor`.
pub fn is_descendant(path: &str, ancestor: &str) -> bool {
    if ancestor == "/" {
        return path.len() > 1 && path.starts_with('/');
    }
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'/'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_name() {
        assert_eq!(node_name("/config-manage/app1/port"), "port");
        assert_eq!(node_name("/config-manage"), "config-manage");
        assert_eq!(node_name("plain"), "plain");
    }

    #[test]
    fn test_child_path() {
        assert_eq!(child_path("/config-manage/app1", "port"), "/config-manage/app1/port");
        assert_eq!(child_path("/", "config-manage"), "/config-manage");
    }

    #[test]
    fn test_parent_path() {
        assert_eq!(parent_path("/config-manage/app1"), Some("/config-manage"));
        assert_eq!(parent_path("/config-manage"), Some("/"));
        assert_eq!(parent_path("/"), None);
    }

    #[test]
    fn test_is_descendant() {
        assert!(is_descendant("/a/b", "/a"));
        assert!(is_descendant("/a/b/c", "/a"));
        assert!(!is_descendant("/a", "/a"));
        assert!(!is_descendant("/ab", "/a"));
        assert!(is_descendant("/a", "/"));
    }

    #[tokio::test]
    async fn test_ensure_node_is_idempotent() {
        let store = MemoryStore::new();

        assert!(ensure_node(&store, "/config-manage", b"this is root").await.unwrap());
        assert!(!ensure_node(&store, "/config-manage", b"this is root").await.unwrap());
        assert!(store.exists("/config-manage").await.unwrap());
    }

    #[tokio::test]
    async fn test_ensure_node_without_parent_fails() {
        let store = MemoryStore::new();

        let err = ensure_node(&store, "/config-manage/app1", b"")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NodeCreate { .. }));
    }
}
