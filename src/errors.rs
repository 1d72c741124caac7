// src/errors.rs

//! Crate-wide error type and `Result` alias.
//!
//! Only precondition violations are returned synchronously. Anything that
//! goes wrong after a process has been handed to the background runner is
//! reported through [`crate::exec::ProcessResult`] instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("a command is already running; only one command may run at a time")]
    AlreadyRunning,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no active process to signal")]
    NoActiveProcess,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Binary not ready: {0}")]
    BinaryNotReady(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, SupervisorError>;
