//! Recursive mirroring of a node subtree.
//!
//! Every watched node runs two small tasks, one forwarding child-list
//! snapshots and one forwarding value snapshots. They report into a single
//! loop that spawns watches for new children, hands values to the template
//! rewriter and decides what happens when a watch fails.

pub mod events;
pub mod registry;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::stream::{Stream, StreamExt};
use log::{debug, error, info, warn};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::{MirrorConfig, RetryPolicy};
use crate::error::StoreError;
use crate::store::{child_path, node_name, CoordinationStore};
use crate::template::{RewriteOutcome, TemplateRewriter};
use crate::watcher::TreeWatcher;

pub use events::MirrorEvent;
pub use registry::{Registration, WatchRegistry};

use events::{ChildrenChanged, Resubscribe, ValueChanged, WatchFailed};

#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    pub retry: RetryPolicy,
    pub channel_capacity: usize,
    pub event_capacity: usize,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            channel_capacity: 64,
            event_capacity: 256,
        }
    }
}

impl From<&MirrorConfig> for CoordinatorOptions {
    fn from(config: &MirrorConfig) -> Self {
        Self {
            retry: config.retry.clone(),
            channel_capacity: config.channel_capacity,
            ..Self::default()
        }
    }
}

/// Cloneable view of a running coordinator.
#[derive(Clone)]
pub struct MirrorHandle {
    registry: Arc<Mutex<WatchRegistry>>,
    events: broadcast::Sender<MirrorEvent>,
    shutdown: CancellationToken,
}

impl MirrorHandle {
    fn registry(&self) -> MutexGuard<'_, WatchRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MirrorEvent> {
        self.events.subscribe()
    }

    /// Currently watched node paths, sorted.
    pub fn watched_paths(&self) -> Vec<String> {
        self.registry().paths()
    }

    pub fn is_watching(&self, path: &str) -> bool {
        self.registry().contains(path)
    }

    /// Stops the coordinator and every node watch.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    fn emit(&self, event: MirrorEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Identity of one node's pair of watch tasks.
#[derive(Clone)]
struct NodeTask {
    path: String,
    generation: u64,
    attempt: u32,
    cancel: CancellationToken,
    failures: mpsc::Sender<WatchFailed>,
}

impl NodeTask {
    /// Pushes every snapshot of `stream` into `tx` until cancelled or the
    /// stream fails.
    async fn forward<T, M, St>(self, stream: St, tx: mpsc::Sender<M>, wrap: fn(&NodeTask, T) -> M)
    where
        St: Stream<Item = Result<T, StoreError>> + Send,
        T: Send,
        M: Send,
    {
        futures_util::pin_mut!(stream);
        let mut delivered = false;

        loop {
            let item = tokio::select! {
                _ = self.cancel.cancelled() => return,
                item = stream.next() => item,
            };

            match item {
                Some(Ok(snapshot)) => {
                    delivered = true;
                    let message = wrap(&self, snapshot);
                    tokio::select! {
                        _ = self.cancel.cancelled() => return,
                        sent = tx.send(message) => if sent.is_err() { return },
                    }
                }
                Some(Err(error)) => {
                    let failure = WatchFailed {
                        path: self.path.clone(),
                        generation: self.generation,
                        attempt: self.attempt,
                        delivered,
                        error,
                    };
                    tokio::select! {
                        _ = self.cancel.cancelled() => {},
                        _ = self.failures.send(failure) => {},
                    }
                    return;
                }
                None => return,
            }
        }
    }
}

pub struct MirrorCoordinator<S: CoordinationStore> {
    store: Arc<S>,
    rewriter: Arc<TemplateRewriter>,
    root: String,
    retry: RetryPolicy,
    handle: MirrorHandle,
    children_tx: mpsc::Sender<ChildrenChanged>,
    children_rx: mpsc::Receiver<ChildrenChanged>,
    value_tx: mpsc::Sender<ValueChanged>,
    value_rx: mpsc::Receiver<ValueChanged>,
    failure_tx: mpsc::Sender<WatchFailed>,
    failure_rx: mpsc::Receiver<WatchFailed>,
    retry_tx: mpsc::Sender<Resubscribe>,
    retry_rx: mpsc::Receiver<Resubscribe>,
}

impl<S: CoordinationStore> MirrorCoordinator<S> {
    pub fn new(
        store: Arc<S>,
        rewriter: Arc<TemplateRewriter>,
        root: impl Into<String>,
        options: CoordinatorOptions,
    ) -> Self {
        let capacity = options.channel_capacity.max(1);
        let (children_tx, children_rx) = mpsc::channel(capacity);
        let (value_tx, value_rx) = mpsc::channel(capacity);
        let (failure_tx, failure_rx) = mpsc::channel(capacity);
        let (retry_tx, retry_rx) = mpsc::channel(capacity);
        let (events, _) = broadcast::channel(options.event_capacity.max(1));

        Self {
            store,
            rewriter,
            root: root.into(),
            retry: options.retry,
            handle: MirrorHandle {
                registry: Arc::new(Mutex::new(WatchRegistry::new())),
                events,
                shutdown: CancellationToken::new(),
            },
            children_tx,
            children_rx,
            value_tx,
            value_rx,
            failure_tx,
            failure_rx,
            retry_tx,
            retry_rx,
        }
    }

    pub fn handle(&self) -> MirrorHandle {
        self.handle.clone()
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Mirrors the subtree under the root until [`MirrorHandle::shutdown`].
    pub async fn run(mut self) {
        info!("Mirroring {}", self.root);
        let root = self.root.clone();
        self.spawn_node(&root, 0);

        let shutdown = self.handle.shutdown.clone();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(event) = self.children_rx.recv() => self.on_children(event),
                Some(event) = self.value_rx.recv() => self.on_value(event).await,
                Some(failure) = self.failure_rx.recv() => self.on_failure(failure),
                Some(request) = self.retry_rx.recv() => self.on_resubscribe(request),
            }
        }

        let stopped = self.handle.registry().clear();
        for path in stopped {
            self.handle.emit(MirrorEvent::WatchStopped {
                path,
                reason: "shutdown".to_string(),
            });
        }
        info!("Stopped mirroring {}", self.root);
    }

    /// Starts watching `path` unless it is already watched. Returns the
    /// generation of the new registration.
    fn spawn_node(&mut self, path: &str, attempt: u32) -> Option<u64> {
        let registration = {
            let mut registry = self.handle.registry();
            let parent = if path == self.root {
                Some(self.handle.shutdown.clone())
            } else {
                crate::store::parent_path(path).and_then(|p| registry.token(p))
            };
            let Some(parent) = parent else {
                debug!("Not watching {}: parent is no longer watched", path);
                return None;
            };
            registry.register(path, &parent)?
        };

        let task = NodeTask {
            path: path.to_string(),
            generation: registration.generation,
            attempt,
            cancel: registration.token,
            failures: self.failure_tx.clone(),
        };
        let watcher = TreeWatcher::new(Arc::clone(&self.store), path);
        let span = tracing::info_span!("watch.node", path = %path);

        tokio::spawn(
            task.clone()
                .forward(
                    watcher.children(),
                    self.children_tx.clone(),
                    |task: &NodeTask, children: Vec<String>| {
                        ChildrenChanged {
                            path: task.path.clone(),
                            generation: task.generation,
                            children,
                        }
                    },
                )
                .instrument(span.clone()),
        );
        tokio::spawn(
            task.forward(
                watcher.values(),
                self.value_tx.clone(),
                |task: &NodeTask, value: Vec<u8>| ValueChanged {
                    path: task.path.clone(),
                    generation: task.generation,
                    value,
                },
            )
            .instrument(span),
        );

        debug!("Watching {} (attempt {})", path, attempt);
        self.handle.emit(MirrorEvent::WatchStarted {
            path: path.to_string(),
        });
        Some(registration.generation)
    }

    fn stop_subtree(&mut self, path: &str, reason: &str) {
        let removed = self.handle.registry().remove_subtree(path);
        for path in removed {
            self.handle.emit(MirrorEvent::WatchStopped {
                path,
                reason: reason.to_string(),
            });
        }
    }

    fn on_children(&mut self, event: ChildrenChanged) {
        let known = {
            let registry = self.handle.registry();
            if !registry.is_current(&event.path, event.generation) {
                return;
            }
            registry.direct_children(&event.path)
        };

        let listed: HashSet<String> = event
            .children
            .iter()
            .map(|name| child_path(&event.path, name))
            .collect();

        for path in known.iter().filter(|p| !listed.contains(*p)) {
            debug!("{} left {}", path, event.path);
            self.stop_subtree(path, "removed");
        }

        for name in &event.children {
            let path = child_path(&event.path, name);
            self.spawn_node(&path, 0);
        }
    }

    async fn on_value(&mut self, event: ValueChanged) {
        if !self.handle.registry().is_current(&event.path, event.generation) {
            return;
        }

        let name = node_name(&event.path).to_string();
        let value = String::from_utf8_lossy(&event.value).into_owned();
        let rewriter = Arc::clone(&self.rewriter);
        let result = tokio::task::spawn_blocking(move || rewriter.apply_change(&name, &value)).await;

        let path = event.path;
        match result {
            Ok(Ok(RewriteOutcome::Applied {
                template, generated, ..
            })) => {
                self.handle.emit(MirrorEvent::TemplateRewritten {
                    path,
                    template,
                    generated,
                });
            }
            Ok(Ok(RewriteOutcome::NoMatch)) => {
                self.handle.emit(MirrorEvent::RewriteSkipped { path });
            }
            Ok(Err(e)) => {
                warn!("Failed to apply {}: {}", path, e);
                self.handle.emit(MirrorEvent::RewriteFailed {
                    path,
                    message: e.to_string(),
                });
            }
            Err(e) => {
                error!("Rewrite task for {} panicked: {}", path, e);
                self.handle.emit(MirrorEvent::RewriteFailed {
                    path,
                    message: e.to_string(),
                });
            }
        }
    }

    fn on_failure(&mut self, failure: WatchFailed) {
        if !self
            .handle
            .registry()
            .is_current(&failure.path, failure.generation)
        {
            return;
        }

        warn!("{}", failure.error);
        self.stop_subtree(&failure.path, &failure.error.to_string());

        let attempt = if failure.delivered {
            1
        } else {
            failure.attempt + 1
        };
        if !self.retry.allows(attempt) {
            info!("Stopped watching {}", failure.path);
            return;
        }

        let delay = self.retry.backoff(attempt);
        info!(
            "Re-subscribing {} in {}ms (attempt {})",
            failure.path,
            delay.as_millis(),
            attempt
        );

        let retry_tx = self.retry_tx.clone();
        let shutdown = self.handle.shutdown.clone();
        let path = failure.path;
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {},
                _ = tokio::time::sleep(delay) => {
                    let _ = retry_tx.send(Resubscribe { path, attempt }).await;
                }
            }
        });
    }

    fn on_resubscribe(&mut self, request: Resubscribe) {
        if self.spawn_node(&request.path, request.attempt).is_none() {
            debug!("Skipped re-subscribing {}", request.path);
        }
    }
}
