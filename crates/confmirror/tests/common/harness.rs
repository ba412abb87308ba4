//! Test harness for isolated mirror runs.
//!
//! Each harness owns a temporary template directory and an in-memory store
//! seeded with `/config-manage/app1`.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use confmirror::{
    AmbiguityPolicy, CoordinationStore, CoordinatorOptions, MemoryStore, MirrorCoordinator,
    MirrorEvent, MirrorHandle, RetryPolicy, TemplateIndex, TemplateNaming, TemplateRewriter,
};

pub const APP_NODE: &str = "/config-manage/app1";
const WAIT: Duration = Duration::from_secs(5);

pub struct MirrorHarness {
    temp_dir: TempDir,
    /// Directory scanned for templates.
    pub template_dir: PathBuf,
    pub store: Arc<MemoryStore>,
}

impl MirrorHarness {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let template_dir = temp_dir.path().join("app");
        fs::create_dir_all(&template_dir).expect("Failed to create template directory");

        let store = Arc::new(MemoryStore::new());
        store.create("/config-manage", b"this is root").await.unwrap();
        store.create(APP_NODE, b"").await.unwrap();

        Self {
            temp_dir,
            template_dir,
            store,
        }
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.template_dir.join(relative)
    }

    /// Writes `<relative>.example` and a generated file with the same content.
    pub fn write_template(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.write_template_only(relative, content);
        fs::write(self.path(relative), content).unwrap();
        path
    }

    /// Writes only `<relative>.example`.
    pub fn write_template_only(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.path(&format!("{}.example", relative));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.path(relative)).unwrap_or_default()
    }

    /// Creates `APP_NODE/<relative>` with `value`.
    pub async fn create_node(&self, relative: &str, value: &str) {
        self.store
            .create(&format!("{}/{}", APP_NODE, relative), value.as_bytes())
            .await
            .unwrap();
    }

    pub fn set_node(&self, relative: &str, value: &str) {
        self.store
            .set(&format!("{}/{}", APP_NODE, relative), value.as_bytes())
            .unwrap();
    }

    pub fn delete_node(&self, relative: &str) {
        self.store
            .delete(&format!("{}/{}", APP_NODE, relative))
            .unwrap();
    }

    pub fn start(&self) -> RunningMirror {
        self.start_with(RetryPolicy::default(), AmbiguityPolicy::FirstMatch)
    }

    /// Scans the template directory and runs a coordinator on `APP_NODE`.
    pub fn start_with(&self, retry: RetryPolicy, ambiguity: AmbiguityPolicy) -> RunningMirror {
        let index = TemplateIndex::scan(&self.template_dir, &TemplateNaming::default())
            .expect("Failed to scan templates");
        let rewriter = Arc::new(TemplateRewriter::with_policy(index, ambiguity));

        let options = CoordinatorOptions {
            retry,
            ..CoordinatorOptions::default()
        };
        let coordinator = MirrorCoordinator::new(Arc::clone(&self.store), rewriter, APP_NODE, options);
        let handle = coordinator.handle();
        let events = handle.subscribe();
        let task = tokio::spawn(coordinator.run());

        RunningMirror {
            handle,
            events,
            task,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }
}

pub struct RunningMirror {
    pub handle: MirrorHandle,
    pub events: broadcast::Receiver<MirrorEvent>,
    task: JoinHandle<()>,
}

impl RunningMirror {
    /// Waits for the first event matching `predicate`.
    pub async fn wait_for<F>(&mut self, predicate: F) -> MirrorEvent
    where
        F: Fn(&MirrorEvent) -> bool,
    {
        let events = &mut self.events;
        tokio::time::timeout(WAIT, async move {
            loop {
                match events.recv().await {
                    Ok(event) if predicate(&event) => return event,
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
                }
            }
        })
        .await
        .expect("Timed out waiting for mirror event")
    }

    /// Returns every event received so far without waiting.
    pub fn drain(&mut self) -> Vec<MirrorEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    pub async fn stop(self) {
        self.handle.shutdown();
        tokio::time::timeout(WAIT, self.task)
            .await
            .expect("Coordinator did not stop")
            .expect("Coordinator panicked");
    }
}

/// Polls `condition` until it holds or the wait times out.
pub async fn wait_until<F>(what: &str, condition: F)
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("Timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
