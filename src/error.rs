//! Application-wide error types.
//!
//! Library modules use specific error types via `thiserror`, while
//! CLI/main uses `anyhow` for convenient error propagation.
//!
//! # Design
//!
//! - [`Error`]: Top-level application error enum
//! - Module-specific errors (e.g., [`BackendError`], [`CatalogError`]) for
//!   detailed handling
//! - All errors implement `std::error::Error` for compatibility
//!
//! Nothing that happens while resolving a single track is fatal to a batch.
//! The driver turns per-track failures into report entries; only preflight
//! failures abort the run.

use std::path::PathBuf;

use crate::backend::BackendError;
use crate::catalog::CatalogError;
use crate::config::ConfigError;
use crate::dedup::DedupError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Search or download backend failure
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Catalog lookup failure
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Persisted index failure
    #[error("Index error: {0}")]
    Dedup(#[from] DedupError),

    /// Metadata reading/writing error
    #[error("Metadata error for {path}: {message}")]
    Metadata { path: PathBuf, message: String },

    /// Every query, candidate and tier was tried without an accepted file
    #[error("No suitable source for {reference} after {attempts} download attempts")]
    Exhausted { reference: String, attempts: usize },

    /// A required tool or credential is missing
    #[error("Preflight failed: {0}")]
    Preflight(String),
}

impl Error {
    /// Create a metadata error.
    pub fn metadata(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Metadata {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an exhaustion error for a reference.
    pub fn exhausted(reference: impl ToString, attempts: usize) -> Self {
        Self::Exhausted {
            reference: reference.to_string(),
            attempts,
        }
    }

    /// Create a preflight error.
    pub fn preflight(message: impl Into<String>) -> Self {
        Self::Preflight(message.into())
    }
}
