use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::template::AmbiguityPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_root_node")]
    pub root_node: String,
    #[serde(default)]
    pub template_dir: Option<PathBuf>,
    #[serde(default = "default_servers")]
    pub servers: String,
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default)]
    pub templates: TemplateSettings,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_app_name() -> String {
    "app1".to_string()
}

fn default_root_node() -> String {
    "/config-manage".to_string()
}

fn default_servers() -> String {
    "127.0.0.1:2181".to_string()
}

fn default_session_timeout_ms() -> u64 {
    1000
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            root_node: default_root_node(),
            template_dir: None,
            servers: default_servers(),
            session_timeout_ms: default_session_timeout_ms(),
            channel_capacity: default_channel_capacity(),
            templates: TemplateSettings::default(),
            retry: RetryPolicy::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl MirrorConfig {
    /// Path of the node mirrored for this application.
    pub fn app_node(&self) -> String {
        format!("{}/{}", self.root_node.trim_end_matches('/'), self.app_name)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSettings {
    #[serde(default = "default_marker")]
    pub marker: String,
    #[serde(default = "default_suffix")]
    pub suffix: String,
    #[serde(default)]
    pub ambiguity: AmbiguityPolicy,
}

fn default_marker() -> String {
    "example".to_string()
}

fn default_suffix() -> String {
    ".example".to_string()
}

impl Default for TemplateSettings {
    fn default() -> Self {
        Self {
            marker: default_marker(),
            suffix: default_suffix(),
            ambiguity: AmbiguityPolicy::default(),
        }
    }
}

/// Re-subscription policy for watches that fail.
///
/// `max_retries = 0` gives up on a path at its first failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetryPolicy {
    pub fn allows(&self, attempt: u32) -> bool {
        attempt >= 1 && attempt <= self.max_retries
    }

    /// Delay before retry number `attempt` (1-based), capped at the maximum.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay = self.initial_backoff_ms as f64 * self.multiplier.powi(exponent);
        let clamped = delay.min(self.max_backoff_ms as f64).max(0.0);
        Duration::from_millis(clamped as u64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}
