//! # Sandboxed Path
//!
//! Path handling confined to a single storage root. Every relative path a
//! user hands the application goes through [`PathSandbox::resolve`] before
//! touching the filesystem; anything that normalizes outside the root is
//! rejected. [`sanitize_name`] turns arbitrary user-supplied names into
//! filesystem-safe tokens.
//!
//! ```rust
//! use sandboxed_path::{PathSandbox, sanitize_name};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let sandbox = PathSandbox::new("/var/lib/myapp/storage").await?;
//!
//! // Stays inside the root.
//! let path = sandbox.resolve("downloads/movie.mp4")?;
//!
//! // Rejected: would escape the root.
//! assert!(sandbox.resolve("../../etc/passwd").is_err());
//!
//! // Arbitrary names become safe tokens.
//! assert_eq!(sanitize_name("../../etc/passwd", "file"), "etc_passwd");
//! # Ok(())
//! # }
//! ```

mod error;
mod sandbox;

pub use error::{Result, SandboxError};
pub use sandbox::{PathSandbox, sanitize_name};
