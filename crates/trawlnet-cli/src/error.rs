//! CLI-facing error type.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] trawlnet_core::CoreError),

    #[error("no host matches {0}")]
    UnknownHost(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
