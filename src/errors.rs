// src/errors.rs

//! Crate-wide error types.
//!
//! Every command-surface failure is a typed variant here; nothing on the
//! start/stop/restart path is reported as a bare string.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcwatchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown service: {0}")]
    NotFound(String),

    #[error("Service '{0}' is already starting or running")]
    AlreadyActive(String),

    #[error("Service '{0}' is not running")]
    NotRunning(String),

    #[error("Service '{0}' is already stopping")]
    AlreadyStopping(String),

    #[error("Working directory '{dir}' for service '{service}' does not exist")]
    InvalidWorkingDirectory { service: String, dir: String },

    #[error("Failed to spawn process for service '{service}': {reason}")]
    SpawnFailure { service: String, reason: String },

    #[error("Failed to terminate process tree for service '{service}': {reason}")]
    TerminationFailure { service: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ProcwatchError>;
