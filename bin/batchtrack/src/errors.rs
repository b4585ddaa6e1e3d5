//! Error types for initialization and script replay.

use std::io;

use batchtrack_config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum DriverError {
    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("config: {0}")]
    MalformedConfig(#[from] ConfigError),

    #[error("script line {line}: {source}")]
    MalformedScript {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("script line {line}: bad extended data: {source}")]
    MalformedHex {
        line: usize,
        #[source]
        source: hex::FromHexError,
    },
}
