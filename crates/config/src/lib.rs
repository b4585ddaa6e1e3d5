//! Configuration for the batch tracker and the binaries embedding it.

mod config;
mod errors;
mod overrides;

use std::{fs, path::Path};

use toml::Value;

pub use config::{Config, LoggingConfig, TrackerConfig, DEFAULT_INVALID_RETENTION_SECS};
pub use errors::ConfigError;
pub use overrides::{apply_override, parse_override};

/// Loads the config toml at `path`, applies `overrides` on top and validates
/// the result.
pub fn load_config(path: &Path, overrides: &[String]) -> Result<Config, ConfigError> {
    let config_str = fs::read_to_string(path)?;
    load_config_from_str(&config_str, overrides)
}

/// Like [`load_config`], but from an in-memory toml document.
pub fn load_config_from_str(config_str: &str, overrides: &[String]) -> Result<Config, ConfigError> {
    let mut config_toml: Value = toml::from_str(config_str)?;

    let overrides = overrides
        .iter()
        .map(|o| parse_override(o))
        .collect::<Result<Vec<_>, ConfigError>>()?;

    let table = config_toml
        .as_table_mut()
        .ok_or(ConfigError::TraverseNonTableAt {
            key: "<root>".to_string(),
            path: "".to_string(),
        })?;

    for (path, val) in overrides {
        apply_override(&path, val, table)?;
    }

    let config = config_toml.try_into::<Config>()?;
    validate_config(config)
}

fn validate_config(config: Config) -> Result<Config, ConfigError> {
    if config.tracker.invalid_retention_secs == 0 {
        return Err(ConfigError::InvalidValue {
            key: "tracker.invalid_retention_secs",
            reason: "must be greater than zero".to_owned(),
        });
    }
    Ok(config)
}
