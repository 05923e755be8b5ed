// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::types::ProcessId;

#[derive(Error, Debug)]
pub enum OpdeckError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Reload aborted by provider '{provider}': {message}")]
    Reload { provider: String, message: String },

    #[error("Unknown process: {0}")]
    UnknownProcess(ProcessId),

    #[error("Process {0} is still running; cancel it before closing")]
    ProcessStillRunning(ProcessId),

    #[error("Process {0} was already closed")]
    ProcessAlreadyClosed(ProcessId),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failure reported by a capability.
///
/// These are data, not manager faults: the process manager turns them into
/// a final log line and a finished outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    #[error("{0}")]
    Failed(String),

    #[error("cancelled")]
    Cancelled,
}

impl ExecError {
    pub fn failed(msg: impl Into<String>) -> Self {
        ExecError::Failed(msg.into())
    }
}

impl From<anyhow::Error> for ExecError {
    fn from(err: anyhow::Error) -> Self {
        ExecError::Failed(format!("{err:#}"))
    }
}

impl From<std::io::Error> for ExecError {
    fn from(err: std::io::Error) -> Self {
        ExecError::Failed(err.to_string())
    }
}

impl From<ExecError> for OpdeckError {
    fn from(err: ExecError) -> Self {
        OpdeckError::Execution(err.to_string())
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, OpdeckError>;
