//! Error types for sandboxed path resolution.

use std::path::PathBuf;

/// Result type for sandboxed path operations.
pub type Result<T> = std::result::Result<T, SandboxError>;

/// Errors that can occur while resolving paths against the storage root.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Path normalizes outside the storage root
    #[error("path escapes storage root: {path:?} (root: {root:?})")]
    PathEscape { path: PathBuf, root: PathBuf },

    /// Path is malformed in some other way
    #[error("path validation failed: {path:?} - {reason}")]
    PathValidation { path: PathBuf, reason: String },

    /// Directory creation failed
    #[error("failed to create directory: {path:?} - {source}")]
    DirectoryCreation {
        path: PathBuf,
        source: std::io::Error,
    },
}
