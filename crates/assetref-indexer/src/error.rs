//! Indexer error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while indexing or querying asset references.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// I/O error during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Seed scan of the assets directory failed
    #[error("Scan failed: {0}")]
    Scan(String),

    /// The target file has no `.meta` sidecar
    #[error("Metadata not found: {0}")]
    MetadataNotFound(PathBuf),

    /// The sidecar exists but carries no recognizable uuid
    #[error("No uuid in metadata: {0}")]
    IdentifierMissing(PathBuf),

    /// Seed scan failed; the query ran against whatever the index held
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    /// Configuration could not be loaded
    #[error("Config error: {0}")]
    Config(String),

    /// File watcher error
    #[error("Watcher error: {0}")]
    Watcher(String),

    /// Path not found
    #[error("Path not found: {0}")]
    NotFound(PathBuf),
}

impl From<serde_yaml::Error> for IndexerError {
    fn from(e: serde_yaml::Error) -> Self {
        IndexerError::Config(e.to_string())
    }
}
