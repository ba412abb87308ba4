//! In-process coordination store.
//!
//! Keeps a flat map of absolute node paths and reproduces the one-shot watch
//! behavior of ZooKeeper: a watch fires once and must be re-armed by another
//! read.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt};
use tokio::sync::oneshot;

use super::{child_path, parent_path, CoordinationStore, StoreEvent, StoreEventKind, Watched};
use crate::error::StoreError;

type WatchList = HashMap<String, Vec<oneshot::Sender<StoreEvent>>>;

struct Inner {
    nodes: BTreeMap<String, Vec<u8>>,
    child_watches: WatchList,
    value_watches: WatchList,
}

/// Coordination store held entirely in memory.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates a store containing only the root node `/`.
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Vec::new());
        Self {
            inner: Mutex::new(Inner {
                nodes,
                child_watches: HashMap::new(),
                value_watches: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the value of an existing node and fires its value watches.
    pub fn set(&self, path: &str, data: &[u8]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        match inner.nodes.get_mut(path) {
            Some(value) => *value = data.to_vec(),
            None => {
                return Err(StoreError::NoNode {
                    path: path.to_string(),
                })
            }
        }
        fire(&mut inner.value_watches, path, StoreEventKind::DataChanged);
        Ok(())
    }

    /// Deletes a leaf node, firing its own watches and its parent's child watches.
    pub fn delete(&self, path: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if !inner.nodes.contains_key(path) || path == "/" {
            return Err(StoreError::NoNode {
                path: path.to_string(),
            });
        }
        if !children_of(&inner.nodes, path).is_empty() {
            return Err(StoreError::NotEmpty {
                path: path.to_string(),
            });
        }

        inner.nodes.remove(path);
        fire(&mut inner.value_watches, path, StoreEventKind::NodeDeleted);
        fire(&mut inner.child_watches, path, StoreEventKind::NodeDeleted);
        if let Some(parent) = parent_path(path) {
            fire(&mut inner.child_watches, parent, StoreEventKind::ChildrenChanged);
        }
        Ok(())
    }

    /// Fires every armed watch with a session event, as an expired session would.
    pub fn expire_session(&self) {
        let mut inner = self.lock();
        let inner = &mut *inner;
        for watches in [&mut inner.child_watches, &mut inner.value_watches] {
            for (path, senders) in watches.drain() {
                for tx in senders {
                    let _ = tx.send(StoreEvent::new(
                        path.clone(),
                        StoreEventKind::Session("expired".to_string()),
                    ));
                }
            }
        }
    }

    /// Number of watches currently armed and not yet fired.
    pub fn armed_watches(&self) -> usize {
        let inner = self.lock();
        inner
            .child_watches
            .values()
            .chain(inner.value_watches.values())
            .map(|senders| senders.iter().filter(|tx| !tx.is_closed()).count())
            .sum()
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn exists(&self, path: &str) -> Result<bool, StoreError> {
        Ok(self.lock().nodes.contains_key(path))
    }

    async fn create(&self, path: &str, data: &[u8]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.nodes.contains_key(path) {
            return Err(StoreError::NodeExists {
                path: path.to_string(),
            });
        }
        let parent = parent_path(path).ok_or_else(|| StoreError::NodeCreate {
            path: path.to_string(),
            message: "invalid node path".to_string(),
        })?;
        if !inner.nodes.contains_key(parent) {
            return Err(StoreError::NodeCreate {
                path: path.to_string(),
                message: format!("parent node '{}' does not exist", parent),
            });
        }

        inner.nodes.insert(path.to_string(), data.to_vec());
        fire(&mut inner.child_watches, parent, StoreEventKind::ChildrenChanged);
        Ok(())
    }

    async fn children_watch(&self, path: &str) -> Result<Watched<Vec<String>>, StoreError> {
        let mut inner = self.lock();
        if !inner.nodes.contains_key(path) {
            return Err(StoreError::watch_read(path, "node does not exist"));
        }
        let snapshot = children_of(&inner.nodes, path);
        let fired = arm(&mut inner.child_watches, path);
        Ok(Watched { snapshot, fired })
    }

    async fn value_watch(&self, path: &str) -> Result<Watched<Vec<u8>>, StoreError> {
        let mut inner = self.lock();
        let snapshot = match inner.nodes.get(path) {
            Some(value) => value.clone(),
            None => return Err(StoreError::watch_read(path, "node does not exist")),
        };
        let fired = arm(&mut inner.value_watches, path);
        Ok(Watched { snapshot, fired })
    }
}

fn children_of(nodes: &BTreeMap<String, Vec<u8>>, path: &str) -> Vec<String> {
    let prefix = child_path(path, "");
    nodes
        .range(prefix.clone()..)
        .take_while(|(key, _)| key.starts_with(&prefix))
        .filter_map(|(key, _)| {
            let rest = &key[prefix.len()..];
            (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_string())
        })
        .collect()
}

fn arm(watches: &mut WatchList, path: &str) -> BoxFuture<'static, StoreEvent> {
    let (tx, rx) = oneshot::channel();
    watches.entry(path.to_string()).or_default().push(tx);

    let path = path.to_string();
    async move {
        rx.await.unwrap_or_else(|_| {
            StoreEvent::new(path, StoreEventKind::Session("closed".to_string()))
        })
    }
    .boxed()
}

fn fire(watches: &mut WatchList, path: &str, kind: StoreEventKind) {
    if let Some(senders) = watches.remove(path) {
        for tx in senders {
            let _ = tx.send(StoreEvent::new(path, kind.clone()));
        }
    }
}
