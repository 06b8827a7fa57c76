//! Custom error types for the backup engine.

use crate::executor::RunState;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("A backup run is already in progress")]
    AlreadyRunning,

    #[error("Previous run ended as {0:?} and has not been acknowledged")]
    AwaitingAcknowledgement(RunState),

    #[error("Destination unavailable: {path}: {source}")]
    DestinationUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Backup jobs must be started from within a Tokio runtime")]
    NoRuntime,

    #[error("Snapshot naming error: {0}")]
    Naming(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
