//! ZooKeeper-backed coordination store.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::FutureExt;
use zookeeper_client as zk;

use super::{CoordinationStore, StoreEvent, StoreEventKind, Watched};
use crate::error::StoreError;

pub struct ZooKeeperStore {
    client: zk::Client,
}

impl ZooKeeperStore {
    /// Connects to a comma-separated `host:port` list.
    pub async fn connect(servers: &str, session_timeout: Duration) -> Result<Self, StoreError> {
        log::info!("Connecting to ZooKeeper at {}", servers);

        let mut connector = zk::Client::connector();
        connector.session_timeout(session_timeout);
        let client = connector
            .connect(servers)
            .await
            .map_err(|e| StoreError::Connection {
                servers: servers.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self { client })
    }
}

fn map_event(event: zk::WatchedEvent) -> StoreEvent {
    let kind = match event.event_type {
        zk::EventType::NodeCreated => StoreEventKind::NodeCreated,
        zk::EventType::NodeDeleted => StoreEventKind::NodeDeleted,
        zk::EventType::NodeDataChanged => StoreEventKind::DataChanged,
        zk::EventType::NodeChildrenChanged => StoreEventKind::ChildrenChanged,
        _ => StoreEventKind::Session(format!("{:?}", event.session_state)),
    };
    StoreEvent::new(event.path, kind)
}

#[async_trait]
impl CoordinationStore for ZooKeeperStore {
    async fn exists(&self, path: &str) -> Result<bool, StoreError> {
        let stat = self
            .client
            .check_stat(path)
            .await
            .map_err(|e| StoreError::watch_read(path, e.to_string()))?;
        Ok(stat.is_some())
    }

    async fn create(&self, path: &str, data: &[u8]) -> Result<(), StoreError> {
        let options = zk::CreateMode::Persistent.with_acls(zk::Acls::anyone_all());
        match self.client.create(path, data, &options).await {
            Ok(_) => Ok(()),
            Err(zk::Error::NodeExists) => Err(StoreError::NodeExists {
                path: path.to_string(),
            }),
            Err(e) => Err(StoreError::NodeCreate {
                path: path.to_string(),
                message: e.to_string(),
            }),
        }
    }

    async fn children_watch(&self, path: &str) -> Result<Watched<Vec<String>>, StoreError> {
        let (children, _stat, watcher) = self
            .client
            .get_and_watch_children(path)
            .await
            .map_err(|e| StoreError::watch_read(path, e.to_string()))?;
        Ok(Watched {
            snapshot: children,
            fired: watcher.changed().map(map_event).boxed(),
        })
    }

    async fn value_watch(&self, path: &str) -> Result<Watched<Vec<u8>>, StoreError> {
        let (data, _stat, watcher) = self
            .client
            .get_and_watch_data(path)
            .await
            .map_err(|e| StoreError::watch_read(path, e.to_string()))?;
        Ok(Watched {
            snapshot: data,
            fired: watcher.changed().map(map_event).boxed(),
        })
    }
}
