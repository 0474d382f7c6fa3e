//! Error handling for stashbot
//!
//! A hierarchical error system: one top-level [`AppError`] with per-layer
//! enums underneath it. User-facing failures render as a short message
//! naming the operation and the underlying cause; no single bad command
//! takes the process down.

pub mod types;

pub use types::{AppError, CatalogError, DownloadError, FileOpError};

/// Convenience result type using the top-level application error.
pub type AppResult<T> = Result<T, AppError>;
