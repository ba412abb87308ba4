use std::path::Path;

use crate::config::schema::MirrorConfig;
use crate::error::ConfigError;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<MirrorConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

/// Parses a YAML config. Validation is left to [`validate_config`] because
/// command-line flags may still fill in required fields.
pub fn load_config_from_str(content: &str) -> Result<MirrorConfig, ConfigError> {
    if content.trim().is_empty() {
        return Ok(MirrorConfig::default());
    }
    Ok(serde_yaml::from_str(content)?)
}

pub fn validate_config(config: &MirrorConfig) -> Result<(), ConfigError> {
    if config.template_dir.is_none() {
        return Err(validation("template directory is required"));
    }

    if config.app_name.is_empty() || config.app_name.contains('/') {
        return Err(validation(format!(
            "invalid application name '{}'",
            config.app_name
        )));
    }

    if !config.root_node.starts_with('/') {
        return Err(validation(format!(
            "root node '{}' must be an absolute path",
            config.root_node
        )));
    }

    if config.servers.trim().is_empty() {
        return Err(validation("at least one server is required"));
    }

    if config.templates.marker.is_empty() || config.templates.suffix.is_empty() {
        return Err(validation("template marker and suffix must not be empty"));
    }

    if config.channel_capacity == 0 {
        return Err(validation("channel capacity must be > 0"));
    }

    let retry = &config.retry;
    if retry.multiplier < 1.0 || retry.initial_backoff_ms > retry.max_backoff_ms {
        return Err(validation(
            "retry backoff must grow (multiplier >= 1, initial <= max)",
        ));
    }

    Ok(())
}

fn validation(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}
