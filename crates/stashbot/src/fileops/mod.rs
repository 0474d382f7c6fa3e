//! Filesystem operations over the sandboxed storage tree.
//!
//! Everything here resolves through the sandbox first. Listing, archiving
//! and recursive sizing do blocking filesystem walks, so they run under
//! `spawn_blocking`. Operations on different paths are safe to run
//! concurrently; nothing beyond the filesystem itself serializes two
//! operations on the same path.

use std::path::{Path, PathBuf};

use sandboxed_path::{PathSandbox, sanitize_name};
use tokio::task;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;

use crate::errors::FileOpError;

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub name: String,
    pub rel_path: String,
    pub size_bytes: u64,
    pub is_dir: bool,
}

#[derive(Clone)]
pub struct FileOps {
    sandbox: PathSandbox,
}

impl FileOps {
    pub fn new(sandbox: PathSandbox) -> Self {
        Self { sandbox }
    }

    pub fn sandbox(&self) -> &PathSandbox {
        &self.sandbox
    }

    /// List one directory level, sorted by name. Directory sizes are a
    /// full recursive traversal; storage trees are personal-scale, so
    /// nothing is cached.
    pub async fn list_dir(&self, rel: &str) -> Result<Vec<DirEntryInfo>, FileOpError> {
        let abs = self.sandbox.ensure_dir(rel).await?;
        let rel_base = rel.trim_matches('/').to_string();
        task::spawn_blocking(move || -> Result<Vec<DirEntryInfo>, FileOpError> {
            let mut out = Vec::new();
            for entry in std::fs::read_dir(&abs)? {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().into_owned();
                let rel_path = if rel_base.is_empty() {
                    name.clone()
                } else {
                    format!("{rel_base}/{name}")
                };
                let meta = entry.metadata()?;
                let (size_bytes, is_dir) = if meta.is_dir() {
                    (dir_size(&entry.path()), true)
                } else {
                    (meta.len(), false)
                };
                out.push(DirEntryInfo {
                    name,
                    rel_path,
                    size_bytes,
                    is_dir,
                });
            }
            out.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(out)
        })
        .await
        .map_err(|e| FileOpError::Io(std::io::Error::other(e)))?
    }

    /// Create a folder from a user-supplied path, sanitizing every segment
    /// independently so `..` can never re-enter as a traversal.
    pub async fn make_dir(&self, rel: &str) -> Result<String, FileOpError> {
        let trimmed = rel.trim().trim_matches('/');
        if trimmed.is_empty() {
            return Err(FileOpError::EmptyName);
        }
        let safe_rel = trimmed
            .split('/')
            .filter(|part| !part.is_empty())
            .map(|part| sanitize_name(part, "folder"))
            .collect::<Vec<_>>()
            .join("/");
        self.sandbox.ensure_dir(&safe_rel).await?;
        Ok(safe_rel)
    }

    /// Zip a folder into an archive inside the sandbox. Arc-names are
    /// relative to the zipped folder itself, whatever the archive's own
    /// location.
    pub async fn zip_folder(
        &self,
        folder_rel: &str,
        zip_name_hint: &str,
    ) -> Result<String, FileOpError> {
        let folder_abs = self.sandbox.resolve(folder_rel)?;
        if !folder_abs.is_dir() {
            return Err(FileOpError::NotAFolder {
                path: folder_rel.to_string(),
            });
        }
        let (zip_rel, zip_abs) = self.prepare_zip_target(zip_name_hint).await?;
        task::spawn_blocking(move || write_folder_zip(&folder_abs, &zip_abs))
            .await
            .map_err(|e| FileOpError::Io(std::io::Error::other(e)))??;
        Ok(zip_rel)
    }

    /// Zip a single file under its basename.
    pub async fn zip_file(
        &self,
        file_rel: &str,
        zip_name_hint: &str,
    ) -> Result<String, FileOpError> {
        let file_abs = self.sandbox.resolve(file_rel)?;
        if !file_abs.is_file() {
            return Err(FileOpError::NotAFile {
                path: file_rel.to_string(),
            });
        }
        let (zip_rel, zip_abs) = self.prepare_zip_target(zip_name_hint).await?;
        task::spawn_blocking(move || write_file_zip(&file_abs, &zip_abs))
            .await
            .map_err(|e| FileOpError::Io(std::io::Error::other(e)))??;
        Ok(zip_rel)
    }

    async fn prepare_zip_target(&self, hint: &str) -> Result<(String, PathBuf), FileOpError> {
        let mut zip_rel = hint.trim().trim_matches('/').to_string();
        if zip_rel.is_empty() {
            return Err(FileOpError::EmptyName);
        }
        if !zip_rel.ends_with(".zip") {
            zip_rel.push_str(".zip");
        }
        let zip_abs = self.sandbox.resolve(&zip_rel)?;
        if let Some(parent) = zip_abs.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok((zip_rel, zip_abs))
    }

    /// Rename within the same parent directory. Returns the new relative
    /// path.
    pub async fn rename_rel(&self, src_rel: &str, new_name: &str) -> Result<String, FileOpError> {
        let src_abs = self.sandbox.resolve(src_rel)?;
        let safe = sanitize_name(new_name, "file");
        let dst_abs = src_abs
            .parent()
            .map(|parent| parent.join(&safe))
            .ok_or(FileOpError::EmptyName)?;
        tokio::fs::rename(&src_abs, &dst_abs).await?;
        Ok(self.sandbox.relativize(&dst_abs)?)
    }

    /// Move a file into a folder, appending `_1`, `_2`, ... to the stem
    /// when the name is already taken there. Returns the new relative
    /// path.
    pub async fn move_to_folder(
        &self,
        src_rel: &str,
        folder_rel: &str,
    ) -> Result<String, FileOpError> {
        let src_abs = self.sandbox.resolve(src_rel)?;
        let folder_abs = self
            .sandbox
            .ensure_dir(folder_rel.trim().trim_matches('/'))
            .await?;
        let base_name = src_abs
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or(FileOpError::EmptyName)?;
        let dst_name = unique_name(&folder_abs, &base_name);
        let dst_abs = folder_abs.join(&dst_name);
        tokio::fs::rename(&src_abs, &dst_abs).await?;
        Ok(self.sandbox.relativize(&dst_abs)?)
    }

    /// Remove a file, or a directory tree recursively.
    pub async fn delete_rel(&self, rel: &str) -> Result<(), FileOpError> {
        let abs = self.sandbox.resolve(rel)?;
        let meta = tokio::fs::metadata(&abs).await?;
        if meta.is_dir() {
            tokio::fs::remove_dir_all(&abs).await?;
        } else {
            tokio::fs::remove_file(&abs).await?;
        }
        Ok(())
    }

    /// Size in bytes of a stored file.
    pub async fn file_size(&self, rel: &str) -> Result<u64, FileOpError> {
        let abs = self.sandbox.resolve(rel)?;
        Ok(tokio::fs::metadata(&abs).await?.len())
    }

    /// Total and available bytes on the disk holding the storage root.
    pub fn disk_usage(&self) -> (u64, u64) {
        let disks = sysinfo::Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .filter(|disk| self.sandbox.root().starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| (disk.total_space(), disk.available_space()))
            .unwrap_or((0, 0))
    }
}

/// Total size of all files under `path`, skipping entries that disappear
/// mid-walk.
pub fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|meta| meta.len())
        .sum()
}

/// First of `name`, `stem_1.ext`, `stem_2.ext`, ... that is free in `dir`.
pub fn unique_name(dir: &Path, base_name: &str) -> String {
    if !dir.join(base_name).exists() {
        return base_name.to_string();
    }
    let (stem, ext) = split_name(base_name);
    let mut i = 1;
    loop {
        let candidate = format!("{stem}_{i}{ext}");
        if !dir.join(&candidate).exists() {
            return candidate;
        }
        i += 1;
    }
}

fn split_name(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    }
}

fn zip_options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated)
}

fn write_folder_zip(folder_abs: &Path, zip_abs: &Path) -> Result<(), FileOpError> {
    let file = std::fs::File::create(zip_abs)?;
    let mut writer = zip::ZipWriter::new(file);
    let options = zip_options();
    for entry in WalkDir::new(folder_abs).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let arc_name = entry
            .path()
            .strip_prefix(folder_abs)
            .map_err(|e| FileOpError::Io(std::io::Error::other(e)))?
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        writer.start_file(arc_name, options)?;
        let mut source = std::fs::File::open(entry.path())?;
        std::io::copy(&mut source, &mut writer)?;
    }
    writer.finish()?;
    Ok(())
}

fn write_file_zip(file_abs: &Path, zip_abs: &Path) -> Result<(), FileOpError> {
    let file = std::fs::File::create(zip_abs)?;
    let mut writer = zip::ZipWriter::new(file);
    let arc_name = file_abs
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    writer.start_file(arc_name, zip_options())?;
    let mut source = std::fs::File::open(file_abs)?;
    std::io::copy(&mut source, &mut writer)?;
    writer.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    async fn fixture() -> (tempfile::TempDir, FileOps) {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = PathSandbox::new(dir.path()).await.unwrap();
        (dir, FileOps::new(sandbox))
    }

    fn write(ops: &FileOps, rel: &str, contents: &[u8]) {
        let abs = ops.sandbox().resolve(rel).unwrap();
        std::fs::create_dir_all(abs.parent().unwrap()).unwrap();
        std::fs::write(abs, contents).unwrap();
    }

    #[tokio::test]
    async fn list_dir_is_sorted_and_sizes_directories() {
        let (_dir, ops) = fixture().await;
        write(&ops, "zeta.txt", b"12345");
        write(&ops, "sub/a.txt", b"123");
        write(&ops, "sub/deeper/b.txt", b"4567");

        let entries = ops.list_dir("").await.unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["sub", "zeta.txt"]);

        let sub = &entries[0];
        assert!(sub.is_dir);
        assert_eq!(sub.size_bytes, 7);
        assert_eq!(sub.rel_path, "sub");

        let zeta = &entries[1];
        assert!(!zeta.is_dir);
        assert_eq!(zeta.size_bytes, 5);
    }

    #[tokio::test]
    async fn make_dir_sanitizes_each_segment() {
        let (_dir, ops) = fixture().await;
        let rel = ops.make_dir("a/../b").await.unwrap();
        assert_eq!(rel, "a/folder/b");
        assert!(ops.sandbox().resolve(&rel).unwrap().is_dir());

        let rel = ops.make_dir("  my docs/2024  ").await.unwrap();
        assert_eq!(rel, "my_docs/2024");

        assert!(matches!(
            ops.make_dir("   ").await.unwrap_err(),
            FileOpError::EmptyName
        ));
    }

    #[tokio::test]
    async fn zip_folder_uses_folder_relative_arc_names() {
        let (_dir, ops) = fixture().await;
        write(&ops, "a/x.txt", b"xx");
        write(&ops, "a/b/y.txt", b"yy");

        let zip_rel = ops.zip_folder("a", "archive").await.unwrap();
        assert_eq!(zip_rel, "archive.zip");

        let zip_abs = ops.sandbox().resolve(&zip_rel).unwrap();
        let archive = zip::ZipArchive::new(std::fs::File::open(zip_abs).unwrap()).unwrap();
        let names: BTreeSet<String> = archive.file_names().map(str::to_string).collect();
        assert_eq!(
            names,
            BTreeSet::from(["x.txt".to_string(), "b/y.txt".to_string()])
        );
    }

    #[tokio::test]
    async fn zip_folder_rejects_files() {
        let (_dir, ops) = fixture().await;
        write(&ops, "plain.txt", b"x");
        assert!(matches!(
            ops.zip_folder("plain.txt", "out").await.unwrap_err(),
            FileOpError::NotAFolder { .. }
        ));
    }

    #[tokio::test]
    async fn zip_file_stores_the_basename() {
        let (_dir, ops) = fixture().await;
        write(&ops, "docs/report.pdf", b"pdf bytes");

        let zip_rel = ops.zip_file("docs/report.pdf", "report").await.unwrap();
        let zip_abs = ops.sandbox().resolve(&zip_rel).unwrap();
        let archive = zip::ZipArchive::new(std::fs::File::open(zip_abs).unwrap()).unwrap();
        let names: Vec<String> = archive.file_names().map(str::to_string).collect();
        assert_eq!(names, vec!["report.pdf".to_string()]);

        assert!(matches!(
            ops.zip_file("docs", "out").await.unwrap_err(),
            FileOpError::NotAFile { .. }
        ));
    }

    #[tokio::test]
    async fn rename_stays_in_the_same_parent() {
        let (_dir, ops) = fixture().await;
        write(&ops, "sub/old.bin", b"data");

        let new_rel = ops.rename_rel("sub/old.bin", "new name.bin").await.unwrap();
        assert_eq!(new_rel, "sub/new_name.bin");
        assert!(ops.sandbox().resolve(&new_rel).unwrap().is_file());
        assert!(!ops.sandbox().resolve("sub/old.bin").unwrap().exists());
    }

    #[tokio::test]
    async fn move_avoids_name_collisions() {
        let (_dir, ops) = fixture().await;
        write(&ops, "file.txt", b"first");
        write(&ops, "dest/file.txt", b"already there");

        let new_rel = ops.move_to_folder("file.txt", "dest").await.unwrap();
        assert_eq!(new_rel, "dest/file_1.txt");
        assert!(ops.sandbox().resolve("dest/file.txt").unwrap().is_file());
        assert!(ops.sandbox().resolve(&new_rel).unwrap().is_file());
    }

    #[tokio::test]
    async fn delete_handles_files_and_trees() {
        let (_dir, ops) = fixture().await;
        write(&ops, "gone.txt", b"x");
        write(&ops, "tree/inner/file.txt", b"y");

        ops.delete_rel("gone.txt").await.unwrap();
        ops.delete_rel("tree").await.unwrap();
        assert!(!ops.sandbox().resolve("gone.txt").unwrap().exists());
        assert!(!ops.sandbox().resolve("tree").unwrap().exists());
    }

    #[test]
    fn unique_name_suffixes_the_stem() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "x").unwrap();
        std::fs::write(dir.path().join("a_1.txt"), "x").unwrap();
        assert_eq!(unique_name(dir.path(), "a.txt"), "a_2.txt");
        assert_eq!(unique_name(dir.path(), "fresh.txt"), "fresh.txt");
        assert_eq!(unique_name(dir.path(), ".hidden"), ".hidden");
    }
}
