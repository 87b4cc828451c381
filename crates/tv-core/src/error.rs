//! Core error types for the transit VPN hub

use std::path::PathBuf;

use thiserror::Error;

/// Artifact store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// No object under this key
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Key is empty or escapes the store
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    /// Backend I/O failure
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),
}
