use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

/// Failures talking to the coordination store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Failed to connect to '{servers}': {message}")]
    Connection { servers: String, message: String },

    #[error("Failed to create node '{path}': {message}")]
    NodeCreate { path: String, message: String },

    #[error("Node already exists: {path}")]
    NodeExists { path: String },

    #[error("Node does not exist: {path}")]
    NoNode { path: String },

    #[error("Node has children: {path}")]
    NotEmpty { path: String },

    #[error("Watch on '{path}' failed: {message}")]
    WatchRead { path: String, message: String },
}

impl StoreError {
    pub fn watch_read(path: &str, message: impl Into<String>) -> Self {
        Self::WatchRead {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Failed to read template '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write generated file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Generated file does not exist: {0}")]
    MissingTargetFile(PathBuf),

    #[error("Template '{template}' contains '{token}' but no 'key={token}' line")]
    MalformedTemplate { template: PathBuf, token: String },

    #[error("Token '{token}' appears in {} templates", templates.len())]
    AmbiguousToken {
        token: String,
        templates: Vec<PathBuf>,
    },

    #[error("Template scan failed for '{path}': {source}")]
    ScanFailed {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

pub type Result<T> = std::result::Result<T, MirrorError>;
