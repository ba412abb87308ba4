use std::path::PathBuf;

use clap::Parser;

use confmirror::{AmbiguityPolicy, MirrorConfig};

/// Keep generated config files in sync with a ZooKeeper subtree
#[derive(Parser, Debug)]
#[command(
    name = "confmirror",
    version = env!("CARGO_PKG_VERSION"),
    about = "Keep generated config files in sync with a ZooKeeper subtree",
    long_about = "Watches <root>/<app> recursively and rewrites every file generated \
                  from a `*.example` template whenever a referenced node value changes."
)]
pub struct Cli {
    /// YAML config file; flags override its values
    #[arg(short, long, env = "CONFMIRROR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Application name, mirrored from <root>/<app> [default: app1]
    #[arg(short, long, env = "CONFMIRROR_APP")]
    pub app: Option<String>,

    /// Directory scanned for templates
    #[arg(short, long, env = "CONFMIRROR_PATH")]
    pub path: Option<PathBuf>,

    /// Comma-separated host:port list [default: 127.0.0.1:2181]
    #[arg(short, long, env = "CONFMIRROR_SERVERS")]
    pub servers: Option<String>,

    /// Session timeout in milliseconds [default: 1000]
    #[arg(long, env = "CONFMIRROR_SESSION_TIMEOUT_MS")]
    pub session_timeout_ms: Option<u64>,

    /// Root node holding one child per application [default: /config-manage]
    #[arg(long, env = "CONFMIRROR_ROOT")]
    pub root: Option<String>,

    /// Re-subscribe a failed watch up to this many times
    #[arg(long, env = "CONFMIRROR_MAX_RETRIES")]
    pub max_retries: Option<u32>,

    /// Refuse to rewrite a token found in several templates
    #[arg(long)]
    pub reject_ambiguous: bool,

    /// Log filter used when RUST_LOG is unset [default: info]
    #[arg(long, env = "CONFMIRROR_LOG_LEVEL")]
    pub log_level: Option<String>,
}

impl Cli {
    /// Applies every flag that was given on top of `config`.
    pub fn apply(&self, config: &mut MirrorConfig) {
        if let Some(app) = &self.app {
            config.app_name = app.clone();
        }
        if let Some(path) = &self.path {
            config.template_dir = Some(path.clone());
        }
        if let Some(servers) = &self.servers {
            config.servers = servers.clone();
        }
        if let Some(timeout) = self.session_timeout_ms {
            config.session_timeout_ms = timeout;
        }
        if let Some(root) = &self.root {
            config.root_node = root.clone();
        }
        if let Some(max_retries) = self.max_retries {
            config.retry.max_retries = max_retries;
        }
        if self.reject_ambiguous {
            config.templates.ambiguity = AmbiguityPolicy::Reject;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }
}
