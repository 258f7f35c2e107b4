//! Error types for PlugVault operations.
//!
//! Library code returns [`VaultError`]; the CLI wraps these with `anyhow`
//! for context at the top level.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using VaultError
pub type Result<T> = std::result::Result<T, VaultError>;

#[derive(Error, Debug)]
pub enum VaultError {
    /// The index file exists but could not be read or parsed
    #[error("index at {path} is corrupted: {reason}")]
    IndexCorrupted { path: PathBuf, reason: String },

    /// A restored copy does not match its backup
    #[error("verification failed for {path}: digest mismatch")]
    VerificationFailed { path: PathBuf },

    /// A path could not be used for the requested operation
    #[error("invalid path {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    /// Configuration file parsing or writing failed
    #[error("configuration error: {reason}")]
    Config { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl VaultError {
    pub fn invalid_path(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        VaultError::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if a fresh run can recover from this error by rebuilding state
    pub fn is_recoverable(&self) -> bool {
        matches!(self, VaultError::IndexCorrupted { .. } | VaultError::Io(_))
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        VaultError::Serialization(err.to_string())
    }
}
