use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Observable progress of a running mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MirrorEvent {
    /// Watches were attached to a node.
    WatchStarted { path: String },
    /// Watches on a node were dropped.
    WatchStopped { path: String, reason: String },
    /// A node value was written into a generated file.
    TemplateRewritten {
        path: String,
        template: PathBuf,
        generated: PathBuf,
    },
    /// A node value is not referenced by any template.
    RewriteSkipped { path: String },
    RewriteFailed { path: String, message: String },
}

impl MirrorEvent {
    pub fn path(&self) -> &str {
        match self {
            Self::WatchStarted { path }
            | Self::WatchStopped { path, .. }
            | Self::TemplateRewritten { path, .. }
            | Self::RewriteSkipped { path }
            | Self::RewriteFailed { path, .. } => path,
        }
    }
}

// Messages from node tasks to the coordinating loop.

#[derive(Debug)]
pub(crate) struct ChildrenChanged {
    pub path: String,
    pub generation: u64,
    pub children: Vec<String>,
}

#[derive(Debug)]
pub(crate) struct ValueChanged {
    pub path: String,
    pub generation: u64,
    pub value: Vec<u8>,
}

#[derive(Debug)]
pub(crate) struct WatchFailed {
    pub path: String,
    pub generation: u64,
    pub attempt: u32,
    /// Whether the failing watch delivered at least one snapshot.
    pub delivered: bool,
    pub error: crate::error::StoreError,
}

#[derive(Debug)]
pub(crate) struct Resubscribe {
    pub path: String,
    pub attempt: u32,
}
