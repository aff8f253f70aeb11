//! Error types for the scanning/indexing core.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while walking one host's FTP directory tree.
///
/// `TooManyErrors` and `MlsdNotSupported` are fatal to the current walk but
/// not to the daemon: callers catch them, log, and report `success=false`.
#[derive(Error, Debug)]
pub enum WalkError {
    #[error("exhausted retry budget after {attempts} attempts")]
    TooManyErrors { attempts: u32 },

    #[error("server does not support MLSD listing")]
    MlsdNotSupported,

    #[error("permission denied listing {path}")]
    PermissionDenied { path: String },

    #[error("store error: {0}")]
    Store(#[from] CoreError),
}

/// Errors surfaced by the store adapters and daemon-level plumbing.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("FTP protocol error: {0}")]
    Ftp(#[from] suppaftp::FtpError),

    #[error("invalid network specification: {0}")]
    InvalidNetwork(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(String),
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::Store(err.to_string())
    }
}
