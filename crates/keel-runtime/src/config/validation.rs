//! Configuration validation utilities.

use serde_json::Value;

use super::error::{ConfigError, ConfigResult};
use super::schema::{KeelConfig, LogLevel, LogOutput};
use keel_framework::plugin::REQUIRE_FROM_PATH_KEY;

/// Validates the entire configuration.
pub fn validate_config(config: &KeelConfig) -> ConfigResult<()> {
    validate_keel_settings(config)?;
    validate_plugins(config)?;
    validate_logging(config)?;
    Ok(())
}

fn validate_keel_settings(config: &KeelConfig) -> ConfigResult<()> {
    config
        .keel
        .log_level
        .parse::<LogLevel>()
        .map_err(ConfigError::validation)?;
    Ok(())
}

/// Base paths must be strings wherever they appear. `null` counts as unset.
fn validate_plugins(config: &KeelConfig) -> ConfigResult<()> {
    let not_string =
        |value: &Option<Value>| matches!(value, Some(v) if !v.is_string() && !v.is_null());

    if not_string(&config.plugins.require_from_path) {
        return Err(ConfigError::validation(format!(
            "plugins.{REQUIRE_FROM_PATH_KEY} must be a string"
        )));
    }
    for (key, entry) in &config.plugins.entries {
        if not_string(&entry.require_from_path) {
            return Err(ConfigError::validation(format!(
                "plugins.{key}.{REQUIRE_FROM_PATH_KEY} must be a string"
            )));
        }
    }
    Ok(())
}

fn validate_logging(config: &KeelConfig) -> ConfigResult<()> {
    if config.logging.output == LogOutput::File && config.logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.file_path is required when logging.output is \"file\"",
        ));
    }
    Ok(())
}
