// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! Every variant is contained to the rule that produced it: the engine logs
//! it and keeps watching. Only errors escaping [`crate::run`] reach `main`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Source unavailable: {path:?} ({reason})")]
    SourceUnavailable { path: PathBuf, reason: String },

    #[error("Failed to hash {path:?}: {source}")]
    HashError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Target {path:?} still locked after {attempts} removal attempts")]
    LockContention { path: PathBuf, attempts: u32 },

    #[error("Failed to swap {path:?}: {source}")]
    SwapFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Process control error: {0}")]
    ProcessControlError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DeployError>;
