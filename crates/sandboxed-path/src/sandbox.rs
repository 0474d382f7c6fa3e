//! The sandbox itself: lexical path resolution against a fixed root.

use std::path::{Component, Path, PathBuf};

use crate::error::{Result, SandboxError};

/// Maximum length of a sanitized name, in characters.
const MAX_NAME_LEN: usize = 200;

/// Resolves user-supplied relative paths against a fixed storage root.
///
/// Resolution is lexical: `.` and `..` components are normalized without
/// touching the filesystem, so paths that do not exist yet (download
/// destinations, archive targets) resolve the same way as existing ones.
/// Any path whose normalization would leave the root is rejected with
/// [`SandboxError::PathEscape`].
#[derive(Clone, Debug)]
pub struct PathSandbox {
    root: PathBuf,
}

impl PathSandbox {
    /// Create a sandbox rooted at `root`, creating the directory if absent.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| SandboxError::DirectoryCreation {
                path: root.clone(),
                source: e,
            })?;
        let root = root
            .canonicalize()
            .map_err(|e| SandboxError::PathValidation {
                path: root.clone(),
                reason: format!("failed to canonicalize storage root: {e}"),
            })?;
        Ok(Self { root })
    }

    /// The canonicalized storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative path to an absolute path inside the root.
    ///
    /// # Errors
    /// Returns an error if the path is absolute, contains NUL bytes, or
    /// normalizes outside the storage root.
    pub fn resolve(&self, rel: &str) -> Result<PathBuf> {
        if rel.contains('\0') {
            return Err(SandboxError::PathValidation {
                path: PathBuf::from(rel),
                reason: "path contains NUL bytes".to_string(),
            });
        }

        let rel_path = Path::new(rel);
        if rel_path.is_absolute() {
            return Err(SandboxError::PathValidation {
                path: rel_path.to_path_buf(),
                reason: "absolute paths are not allowed inside the sandbox".to_string(),
            });
        }

        let mut normalized = PathBuf::new();
        for component in rel_path.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    // Popping past the top of the relative path means the
                    // full path would leave the root.
                    if !normalized.pop() {
                        return Err(SandboxError::PathEscape {
                            path: rel_path.to_path_buf(),
                            root: self.root.clone(),
                        });
                    }
                }
                Component::Normal(part) => normalized.push(part),
                Component::RootDir | Component::Prefix(_) => {
                    return Err(SandboxError::PathValidation {
                        path: rel_path.to_path_buf(),
                        reason: "unexpected rooted component in relative path".to_string(),
                    });
                }
            }
        }

        let resolved = self.root.join(&normalized);
        tracing::trace!("path resolved: {rel:?} -> {}", resolved.display());
        Ok(resolved)
    }

    /// Resolve a relative path and create it (and parents) as a directory.
    /// Idempotent.
    ///
    /// # Errors
    /// Returns an error if resolution fails or the directory cannot be
    /// created.
    pub async fn ensure_dir(&self, rel: &str) -> Result<PathBuf> {
        let abs = self.resolve(rel)?;
        tokio::fs::create_dir_all(&abs)
            .await
            .map_err(|e| SandboxError::DirectoryCreation {
                path: abs.clone(),
                source: e,
            })?;
        Ok(abs)
    }

    /// The forward-slash relative path of an absolute path inside the root.
    ///
    /// # Errors
    /// Returns [`SandboxError::PathEscape`] if `abs` is not under the root.
    pub fn relativize(&self, abs: &Path) -> Result<String> {
        let rel = abs
            .strip_prefix(&self.root)
            .map_err(|_| SandboxError::PathEscape {
                path: abs.to_path_buf(),
                root: self.root.clone(),
            })?;
        Ok(rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"))
    }
}

/// Turn an arbitrary user-supplied name into a filesystem-safe token.
///
/// Characters outside `[A-Za-z0-9._-]` are collapsed (runs become a single
/// `_`), leading and trailing `.`, `_` and spaces are trimmed, and the
/// result is truncated to 200 characters. Falls back to `default` when the
/// input reduces to nothing. Total: never fails, performs no I/O.
pub fn sanitize_name(raw: &str, default: &str) -> String {
    let trimmed = raw.trim();
    let base = if trimmed.is_empty() { default } else { trimmed };

    let mut mapped = String::with_capacity(base.len());
    let mut last_was_sub = false;
    for ch in base.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            mapped.push(ch);
            last_was_sub = false;
        } else if !last_was_sub {
            mapped.push('_');
            last_was_sub = true;
        }
    }

    let stripped = mapped.trim_matches(|c| matches!(c, '.' | '_' | ' '));
    let mut name = if stripped.is_empty() {
        default.to_string()
    } else {
        stripped.to_string()
    };
    name.truncate(MAX_NAME_LEN);
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn sandbox() -> (tempfile::TempDir, PathSandbox) {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = PathSandbox::new(dir.path()).await.unwrap();
        (dir, sandbox)
    }

    #[tokio::test]
    async fn resolve_stays_within_root() {
        let (_dir, sandbox) = sandbox().await;
        let path = sandbox.resolve("downloads/movie.mp4").unwrap();
        assert!(path.starts_with(sandbox.root()));
        assert!(path.ends_with("downloads/movie.mp4"));
    }

    #[tokio::test]
    async fn resolve_normalizes_inner_parent_components() {
        let (_dir, sandbox) = sandbox().await;
        let path = sandbox.resolve("a/../b").unwrap();
        assert_eq!(path, sandbox.root().join("b"));
        let path = sandbox.resolve("./a/./x.txt").unwrap();
        assert_eq!(path, sandbox.root().join("a/x.txt"));
    }

    #[tokio::test]
    async fn resolve_rejects_escapes() {
        let (_dir, sandbox) = sandbox().await;
        for rel in ["..", "../x", "a/../../x", "../../etc/passwd", "a/b/../../../y"] {
            let err = sandbox.resolve(rel).unwrap_err();
            assert!(
                matches!(err, SandboxError::PathEscape { .. }),
                "{rel} should be a PathEscape, got {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn resolve_rejects_absolute_and_nul() {
        let (_dir, sandbox) = sandbox().await;
        assert!(matches!(
            sandbox.resolve("/etc/passwd").unwrap_err(),
            SandboxError::PathValidation { .. }
        ));
        assert!(matches!(
            sandbox.resolve("file\0.txt").unwrap_err(),
            SandboxError::PathValidation { .. }
        ));
    }

    #[tokio::test]
    async fn ensure_dir_is_idempotent() {
        let (_dir, sandbox) = sandbox().await;
        let first = sandbox.ensure_dir("a/b/c").await.unwrap();
        let second = sandbox.ensure_dir("a/b/c").await.unwrap();
        assert_eq!(first, second);
        assert!(first.is_dir());
    }

    #[tokio::test]
    async fn relativize_round_trips() {
        let (_dir, sandbox) = sandbox().await;
        let abs = sandbox.resolve("folder/file.bin").unwrap();
        assert_eq!(sandbox.relativize(&abs).unwrap(), "folder/file.bin");

        let outside = PathBuf::from("/somewhere/else");
        assert!(matches!(
            sandbox.relativize(&outside).unwrap_err(),
            SandboxError::PathEscape { .. }
        ));
    }

    #[test]
    fn sanitize_strips_traversal() {
        assert_eq!(sanitize_name("../../etc/passwd", "file"), "etc_passwd");
        assert_eq!(sanitize_name("..\\..\\windows", "file"), "windows");
    }

    #[test]
    fn sanitize_collapses_and_trims() {
        assert_eq!(sanitize_name("my file.txt", "file"), "my_file.txt");
        assert_eq!(sanitize_name("a  b!!c", "file"), "a_b_c");
        assert_eq!(sanitize_name(".hidden", "file"), "hidden");
        assert_eq!(sanitize_name("__name__", "file"), "name");
    }

    #[test]
    fn sanitize_falls_back_to_default() {
        assert_eq!(sanitize_name("", "download"), "download");
        assert_eq!(sanitize_name("   ", "download"), "download");
        assert_eq!(sanitize_name("..", "folder"), "folder");
        assert_eq!(sanitize_name("///", "folder"), "folder");
    }

    #[test]
    fn sanitize_truncates_long_names() {
        let long = "x".repeat(500);
        assert_eq!(sanitize_name(&long, "file").len(), 200);
    }
}
