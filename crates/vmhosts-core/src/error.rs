//! Error types for the vmhosts system
//!
//! This module defines all error types used throughout the crate.
//! Line-level parse failures live in [`crate::parser::ParseError`]; they are
//! recovered during load and never surface through this type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for vmhosts operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the vmhosts system
#[derive(Error, Debug)]
pub enum Error {
    /// `add` was called for a hostname the store already holds
    #[error("Hostname already exists: {0}")]
    DuplicateHostname(String),

    /// `remove` was called for a hostname the store does not hold
    #[error("Hostname not found: {0}")]
    NotFound(String),

    /// Hosts file open/read/write/flush/rename failures
    #[error("Hosts file error: {0}")]
    HostsFile(String),

    /// The temporary file does not hold the full buffer after writing
    #[error("Partial write to {}: expected {expected} bytes, found {written}", path.display())]
    PartialWrite {
        /// Temporary file that was being written
        path: PathBuf,
        /// Length of the rendered buffer
        expected: u64,
        /// Length found on disk
        written: u64,
    },

    /// Target discovery errors
    #[error("Target source error: {0}")]
    TargetSource(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Raw I/O errors without further context
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a duplicate hostname error
    pub fn duplicate(hostname: impl Into<String>) -> Self {
        Self::DuplicateHostname(hostname.into())
    }

    /// Create a "not found" error
    pub fn not_found(hostname: impl Into<String>) -> Self {
        Self::NotFound(hostname.into())
    }

    /// Create a hosts file error
    pub fn hosts_file(msg: impl Into<String>) -> Self {
        Self::HostsFile(msg.into())
    }

    /// Create a target source error
    pub fn target_source(msg: impl Into<String>) -> Self {
        Self::TargetSource(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether this error came from a store mutation on a caller-supplied hostname
    pub fn is_store_conflict(&self) -> bool {
        matches!(self, Self::DuplicateHostname(_) | Self::NotFound(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
