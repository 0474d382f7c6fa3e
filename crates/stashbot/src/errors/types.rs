//! Error type definitions for stashbot.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Path sandboxing failures (escapes, malformed paths)
    #[error("storage error: {0}")]
    Sandbox(#[from] sandboxed_path::SandboxError),

    /// Catalog persistence failures
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Download pipeline failures
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// Filesystem operation failures
    #[error("file operation error: {0}")]
    FileOp(#[from] FileOpError),

    /// Resource not found
    #[error("not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },
}

/// Catalog layer errors. A missing or unparsable catalog file is not an
/// error (the catalog recovers to an empty document); these cover the
/// failures that must surface, like a write that cannot be published.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Reading the on-disk document failed (other than file-not-found)
    #[error("failed to read catalog at {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Writing or atomically replacing the on-disk document failed
    #[error("failed to persist catalog at {path:?}: {source}")]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Encoding the document as JSON failed
    #[error("failed to encode catalog document: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Download pipeline errors.
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Declared or streamed size exceeds the configured ceiling. The
    /// partial `.part` file, if any, is left on disk.
    #[error("file too large: {size} bytes (limit {limit} bytes)")]
    TooLarge { size: u64, limit: u64 },

    /// Non-2xx response
    #[error("HTTP error: {status} - {url}")]
    Http { status: u16, url: String },

    /// Transport failure
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Source URL could not be parsed or led nowhere usable
    #[error("invalid download URL: {url} - {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Destination path escaped the sandbox
    #[error("storage error: {0}")]
    Sandbox(#[from] sandboxed_path::SandboxError),

    /// Local write failure while streaming
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Filesystem operation errors.
#[derive(Error, Debug)]
pub enum FileOpError {
    /// A blank name or path was given where one is required
    #[error("a name is required")]
    EmptyName,

    /// The source of a folder operation is not a folder
    #[error("not a folder: {path}")]
    NotAFolder { path: String },

    /// The source of a file operation is not a file
    #[error("not a file: {path}")]
    NotAFile { path: String },

    /// Archive writing failed
    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Path sandboxing failure
    #[error("storage error: {0}")]
    Sandbox(#[from] sandboxed_path::SandboxError),

    /// Underlying filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Create a not-found error for a resource/id pair
    pub fn not_found<R: Into<String>, I: ToString>(resource: R, id: I) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.to_string(),
        }
    }
}
