//! JSON-backed item catalog.
//!
//! One document on disk holds the monotonic id counter and the id -> item
//! map. Every operation is a fresh load / mutate / atomic-replace cycle
//! under a single process-wide lock: readers take it too, so nobody can
//! observe a half-written file, and loading fresh each time tolerates
//! external process restarts. Publication goes through a `.tmp` sibling
//! followed by a rename, so a crash leaves either the old or the new
//! complete document, never a torn one.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use crate::errors::CatalogError;

/// Numeric handle under which a stored file is tracked. Strictly increasing
/// allocation order starting at 0; never reused after deletion.
pub type ItemId = u64;

/// Metadata for one stored file.
///
/// `path` is the join key to the filesystem. `name` and `size` are
/// denormalized caches and must be refreshed whenever the underlying file
/// is renamed, moved or replaced; staleness there is a correctness bug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    /// Path relative to the storage root, forward-slash separated.
    pub path: String,
    /// Display name, usually the basename of `path`.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
}

/// The persisted document: `{"next_id": <int>, "items": {"<id>": {...}}}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub next_id: ItemId,
    #[serde(default)]
    pub items: BTreeMap<ItemId, ItemRecord>,
}

/// The catalog handle. Cheap to share behind an `Arc`; all operations
/// serialize on the internal lock.
#[derive(Debug)]
pub struct Catalog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl Catalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the next id and persist the incremented counter. Two concurrent
    /// calls never return the same id.
    pub async fn allocate_id(&self) -> Result<ItemId, CatalogError> {
        let _guard = self.lock.lock().await;
        let mut doc = self.load().await?;
        let id = doc.next_id;
        doc.next_id += 1;
        self.persist(&doc).await?;
        Ok(id)
    }

    /// Upsert the record for `id`. Creates the document if absent.
    pub async fn put_item(
        &self,
        id: ItemId,
        path: &str,
        name: &str,
        size: u64,
    ) -> Result<(), CatalogError> {
        let _guard = self.lock.lock().await;
        let mut doc = self.load().await?;
        doc.items.insert(
            id,
            ItemRecord {
                path: path.to_string(),
                name: name.to_string(),
                size,
            },
        );
        self.persist(&doc).await
    }

    pub async fn get_item(&self, id: ItemId) -> Result<Option<ItemRecord>, CatalogError> {
        let _guard = self.lock.lock().await;
        let doc = self.load().await?;
        Ok(doc.items.get(&id).cloned())
    }

    /// Remove the record for `id`. Returns whether it existed; an absent id
    /// leaves the document untouched.
    pub async fn delete_item(&self, id: ItemId) -> Result<bool, CatalogError> {
        let _guard = self.lock.lock().await;
        let mut doc = self.load().await?;
        if doc.items.remove(&id).is_none() {
            return Ok(false);
        }
        self.persist(&doc).await?;
        Ok(true)
    }

    /// All records, ordered by id.
    pub async fn list_items(&self) -> Result<BTreeMap<ItemId, ItemRecord>, CatalogError> {
        let _guard = self.lock.lock().await;
        let doc = self.load().await?;
        Ok(doc.items)
    }

    async fn load(&self) -> Result<CatalogDocument, CatalogError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // First run: materialize the default document so the file
                // exists on disk from the first read onwards.
                let doc = CatalogDocument::default();
                self.persist(&doc).await?;
                return Ok(doc);
            }
            Err(e) => {
                return Err(CatalogError::Read {
                    path: self.path.clone(),
                    source: e,
                });
            }
        };
        match serde_json::from_str(&raw) {
            Ok(doc) => Ok(doc),
            Err(e) => {
                // Expected cause: a crash mid-write before this code used
                // temp-then-rename, or manual edits. Recover rather than
                // wedge every operation.
                warn!(
                    "catalog at {:?} failed to parse ({e}), starting from an empty document",
                    self.path
                );
                Ok(CatalogDocument::default())
            }
        }
    }

    async fn persist(&self, doc: &CatalogDocument) -> Result<(), CatalogError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CatalogError::Persist {
                    path: self.path.clone(),
                    source: e,
                })?;
        }
        let json = serde_json::to_string_pretty(doc)?;
        let tmp = tmp_path(&self.path);
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| CatalogError::Persist {
                path: tmp.clone(),
                source: e,
            })?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| CatalogError::Persist {
                path: self.path.clone(),
                source: e,
            })
    }
}

/// Sibling temp path: `<catalog>.tmp`.
fn tmp_path(path: &Path) -> PathBuf {
    let mut os = OsString::from(path.as_os_str());
    os.push(".tmp");
    PathBuf::from(os)
}
