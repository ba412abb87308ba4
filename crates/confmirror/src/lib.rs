pub mod config;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod store;
pub mod template;
pub mod watcher;

pub use config::{load_config, validate_config, MirrorConfig, RetryPolicy};
pub use coordinator::{CoordinatorOptions, MirrorCoordinator, MirrorEvent, MirrorHandle};
pub use error::{ConfigError, MirrorError, Result, StoreError, TemplateError};
pub use store::{ensure_node, CoordinationStore, MemoryStore};
pub use template::{
    placeholder_token, AmbiguityPolicy, RewriteOutcome, TemplateIndex, TemplateNaming,
    TemplateRecord, TemplateRewriter,
};
pub use watcher::TreeWatcher;
