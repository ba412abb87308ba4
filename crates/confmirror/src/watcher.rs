//! Live watches on a single node.
//!
//! Each stream yields the current snapshot first, then one snapshot per fired
//! watch. The watch is re-armed by the read that produces the next item, which
//! only happens when the consumer polls for it, so a path never has more than
//! one outstanding watch of each kind.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::stream::{self, Stream};

use crate::error::StoreError;
use crate::store::{CoordinationStore, StoreEvent, Watched};

enum Phase {
    Read,
    Armed(BoxFuture<'static, StoreEvent>),
    Done,
}

/// Watches one node path.
pub struct TreeWatcher<S> {
    store: Arc<S>,
    path: String,
}

impl<S> Clone for TreeWatcher<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            path: self.path.clone(),
        }
    }
}

impl<S: CoordinationStore> TreeWatcher<S> {
    pub fn new(store: Arc<S>, path: impl Into<String>) -> Self {
        Self {
            store,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Full child-name list of the node, once now and again after every change.
    ///
    /// Ends after yielding a single error.
    pub fn children(&self) -> impl Stream<Item = Result<Vec<String>, StoreError>> + Send + 'static {
        watch(
            Arc::clone(&self.store),
            self.path.clone(),
            |store: Arc<S>, path: String| async move { store.children_watch(&path).await },
        )
    }

    /// Full value of the node, once now and again after every change.
    ///
    /// Ends after yielding a single error.
    pub fn values(&self) -> impl Stream<Item = Result<Vec<u8>, StoreError>> + Send + 'static {
        watch(
            Arc::clone(&self.store),
            self.path.clone(),
            |store: Arc<S>, path: String| async move { store.value_watch(&path).await },
        )
    }
}

fn watch<S, T, R, Fut>(
    store: Arc<S>,
    path: String,
    read: R,
) -> impl Stream<Item = Result<T, StoreError>> + Send + 'static
where
    S: CoordinationStore,
    T: Send + 'static,
    R: Fn(Arc<S>, String) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Watched<T>, StoreError>> + Send + 'static,
{
    stream::unfold(
        (store, path, read, Phase::Read),
        |(store, path, read, phase)| async move {
            match phase {
                Phase::Done => return None,
                Phase::Read => {}
                Phase::Armed(fired) => {
                    let event = fired.await;
                    if let Some(state) = event.session_error() {
                        let err = StoreError::watch_read(&path, format!("session {}", state));
                        return Some((Err(err), (store, path, read, Phase::Done)));
                    }
                    log::trace!("Watch on {} fired: {:?}", path, event.kind);
                }
            }

            match read(Arc::clone(&store), path.clone()).await {
                Ok(watched) => {
                    let next = Phase::Armed(watched.fired);
                    Some((Ok(watched.snapshot), (store, path, read, next)))
                }
                Err(e) => Some((Err(e), (store, path, read, Phase::Done))),
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use futures_util::StreamExt;
    use std::time::Duration;

    async fn seeded() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.create("/config-manage", b"this is root").await.unwrap();
        store.create("/config-manage/app1", b"").await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_children_stream_emits_full_lists() {
        let store = seeded().await;
        let watcher = TreeWatcher::new(Arc::clone(&store), "/config-manage/app1");
        let stream = watcher.children();
        futures_util::pin_mut!(stream);

        assert_eq!(stream.next().await.unwrap().unwrap(), Vec::<String>::new());

        store.create("/config-manage/app1/port", b"8080").await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), vec!["port"]);

        store.create("/config-manage/app1/host", b"localhost").await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), vec!["host", "port"]);
    }

    #[tokio::test]
    async fn test_value_stream_rearms_after_each_change() {
        let store = seeded().await;
        store.create("/config-manage/app1/port", b"8080").await.unwrap();

        let watcher = TreeWatcher::new(Arc::clone(&store), "/config-manage/app1/port");
        let stream = watcher.values();
        futures_util::pin_mut!(stream);

        assert_eq!(stream.next().await.unwrap().unwrap(), b"8080");
        assert_eq!(store.armed_watches(), 1);

        for value in ["9090", "9191", "9292"] {
            store.set("/config-manage/app1/port", value.as_bytes()).unwrap();
            assert_eq!(stream.next().await.unwrap().unwrap(), value.as_bytes());
            assert_eq!(store.armed_watches(), 1);
        }
    }

    #[tokio::test]
    async fn test_rearm_waits_for_consumer() {
        let store = seeded().await;
        store.create("/config-manage/app1/port", b"8080").await.unwrap();

        let watcher = TreeWatcher::new(Arc::clone(&store), "/config-manage/app1/port");
        let stream = watcher.values();
        futures_util::pin_mut!(stream);

        assert_eq!(store.armed_watches(), 0);
        stream.next().await.unwrap().unwrap();
        assert_eq!(store.armed_watches(), 1);
    }

    #[tokio::test]
    async fn test_deleted_node_ends_stream_with_error() {
        let store = seeded().await;
        store.create("/config-manage/app1/port", b"8080").await.unwrap();

        let watcher = TreeWatcher::new(Arc::clone(&store), "/config-manage/app1/port");
        let stream = watcher.values();
        futures_util::pin_mut!(stream);
        stream.next().await.unwrap().unwrap();

        store.delete("/config-manage/app1/port").unwrap();

        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, StoreError::WatchRead { ref path, .. } if path == "/config-manage/app1/port"));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_missing_node_fails_immediately() {
        let store = seeded().await;
        let watcher = TreeWatcher::new(Arc::clone(&store), "/config-manage/app2");
        let stream = watcher.children();
        futures_util::pin_mut!(stream);

        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_session_expiry_ends_stream() {
        let store = seeded().await;
        let watcher = TreeWatcher::new(Arc::clone(&store), "/config-manage/app1");
        let stream = watcher.children();
        futures_util::pin_mut!(stream);
        stream.next().await.unwrap().unwrap();

        store.expire_session();

        let item = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert!(item.unwrap_err().to_string().contains("session expired"));
    }
}
