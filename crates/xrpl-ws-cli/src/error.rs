//! Error handling for the xrpl-ws CLI

use thiserror::Error;
use xrpl_ws_core::ClientError;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration loading error: {0}")]
    Loading(#[from] figment::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
