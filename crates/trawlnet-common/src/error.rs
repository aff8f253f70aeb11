//! Shared error type for trawlnet components

use thiserror::Error;

/// Result type alias for trawlnet operations
pub type Result<T> = std::result::Result<T, TrawlError>;

/// Error type shared by crates that don't need a component-specific enum
#[derive(Error, Debug)]
pub enum TrawlError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}
