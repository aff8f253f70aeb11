//! trawlnet-common
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging setup for the trawlnet workspace.
//!
//! # Example
//!
//! ```no_run
//! use trawlnet_common::logging::{LogConfig, init_logging};
//!
//! let config = LogConfig::from_env().unwrap_or_default();
//! init_logging(&config).unwrap();
//! ```

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{Result, TrawlError};
