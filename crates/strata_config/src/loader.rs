//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::StrataConfig;
use std::path::Path;

/// Name of the configuration file looked up in a project directory.
pub const CONFIG_FILE: &str = "strata.toml";

/// Loads and validates a `strata.toml` configuration from a directory.
pub fn load_config(dir: &Path) -> Result<StrataConfig, ConfigError> {
    let config_path = dir.join(CONFIG_FILE);
    let content = std::fs::read_to_string(&config_path)?;
    load_config_from_str(&content)
}

/// Parses and validates a `strata.toml` configuration from a string.
pub fn load_config_from_str(content: &str) -> Result<StrataConfig, ConfigError> {
    let config: StrataConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates that sizes are usable and override names are well-formed.
fn validate_config(config: &StrataConfig) -> Result<(), ConfigError> {
    if config.store.capacity == 0 {
        return Err(ConfigError::ValidationError(
            "store.capacity must be positive".to_string(),
        ));
    }
    if config.store.directory.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "store.directory must not be empty".to_string(),
        ));
    }
    if config.caching.output_buffer_size == 0 {
        return Err(ConfigError::ValidationError(
            "caching.output_buffer_size must be positive".to_string(),
        ));
    }
    for (name, section) in &config.pipelines {
        if name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "pipeline override names must not be blank".to_string(),
            ));
        }
        if section.output_buffer_size == Some(0) {
            return Err(ConfigError::ValidationError(format!(
                "pipelines.{name}.output_buffer_size must be positive"
            )));
        }
    }
    Ok(())
}
