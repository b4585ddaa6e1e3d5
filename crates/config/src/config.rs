//! Configuration structs for the tracker and the logging setup.

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

/// Default value for `invalid_retention_secs` in [`TrackerConfig`]: invalid
/// batch info is kept for one hour.
pub const DEFAULT_INVALID_RETENTION_SECS: u64 = 3600;

fn default_invalid_retention_secs() -> u64 {
    DEFAULT_INVALID_RETENTION_SECS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// How long the reason a batch was rejected stays queryable, in seconds.
    #[serde(default = "default_invalid_retention_secs")]
    pub invalid_retention_secs: u64,
}

impl TrackerConfig {
    pub fn invalid_retention(&self) -> Duration {
        Duration::from_secs(self.invalid_retention_secs)
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            invalid_retention_secs: DEFAULT_INVALID_RETENTION_SECS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Label appended to the service name, like `prod` or `dev`.
    pub service_label: Option<String>,

    /// Directory for file logs. File logging is disabled when unset.
    pub log_dir: Option<PathBuf>,

    /// Prefix for log file names.
    pub log_file_prefix: Option<String>,

    /// Use JSON instead of the compact format.
    pub json_format: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tracker: TrackerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}
