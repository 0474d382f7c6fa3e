//! Textual command surface.
//!
//! One line in, one reply string out. The router is transport-agnostic so
//! any chat frontend (or the web surface's `POST /command`) can feed it.
//! Every filesystem mutation here is paired with its catalog update in the
//! same handler; the denormalized name/size fields must never go stale.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::catalog::{Catalog, ItemId};
use crate::downloader::{Downloader, guess_filename};
use crate::errors::{AppError, AppResult, CatalogError};
use crate::fileops::{FileOps, unique_name};
use crate::utils::format_size;

const HELP: &str = "\
commands:
  /help                     show this text
  /get <url> [folder]       download a URL into the storage root or a folder
  /ls [folder]              list a folder
  /files                    list all stored items
  /info <id>                show one item
  /up <id>                  mark a stored item ready for sending
  /rm <id>                  delete an item and its file
  /rename <id> <name>       rename an item's file
  /mkdir <folder>           create a folder
  /mv <id> <folder>         move an item's file into a folder
  /zip <folder> [name]      zip a folder into a new item
  /zipid <id> [name]        zip one item's file into a new item
  /df                       show disk usage";

/// A parsed one-line command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Get { url: String, folder: Option<String> },
    Ls { folder: String },
    Files,
    Info { id: ItemId },
    Upload { id: ItemId },
    Remove { id: ItemId },
    Rename { id: ItemId, new_name: String },
    MkDir { folder: String },
    Move { id: ItemId, folder: String },
    ZipFolder { folder: String, name: Option<String> },
    ZipItem { id: ItemId, name: Option<String> },
    DiskFree,
}

impl Command {
    /// Parse one line. The error string is already user-facing (usage
    /// text), not a diagnostic.
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut parts = line.split_whitespace();
        let Some(head) = parts.next() else {
            return Err("empty command, try /help".to_string());
        };
        let args: Vec<&str> = parts.collect();

        match head {
            "/help" | "/start" => Ok(Self::Help),
            "/get" => match args.first() {
                Some(url) => Ok(Self::Get {
                    url: url.to_string(),
                    folder: args.get(1).map(|s| s.to_string()),
                }),
                None => Err("usage: /get <url> [folder]".to_string()),
            },
            "/ls" => Ok(Self::Ls {
                folder: args.join(" "),
            }),
            "/files" => Ok(Self::Files),
            "/info" => Ok(Self::Info {
                id: parse_id(&args, "/info <id>")?,
            }),
            "/up" => Ok(Self::Upload {
                id: parse_id(&args, "/up <id>")?,
            }),
            "/rm" => Ok(Self::Remove {
                id: parse_id(&args, "/rm <id>")?,
            }),
            "/rename" => {
                let id = parse_id(&args, "/rename <id> <name>")?;
                let new_name = args[1..].join(" ");
                if new_name.trim().is_empty() {
                    return Err("usage: /rename <id> <name>".to_string());
                }
                Ok(Self::Rename { id, new_name })
            }
            "/mkdir" => {
                let folder = args.join(" ");
                if folder.trim().is_empty() {
                    return Err("usage: /mkdir <folder>".to_string());
                }
                Ok(Self::MkDir { folder })
            }
            "/mv" => {
                let id = parse_id(&args, "/mv <id> <folder>")?;
                match args.get(1) {
                    Some(folder) => Ok(Self::Move {
                        id,
                        folder: folder.to_string(),
                    }),
                    None => Err("usage: /mv <id> <folder>".to_string()),
                }
            }
            "/zip" => match args.first() {
                Some(folder) => Ok(Self::ZipFolder {
                    folder: folder.to_string(),
                    name: args.get(1).map(|s| s.to_string()),
                }),
                None => Err("usage: /zip <folder> [name]".to_string()),
            },
            "/zipid" => Ok(Self::ZipItem {
                id: parse_id(&args, "/zipid <id> [name]")?,
                name: args.get(1).map(|s| s.to_string()),
            }),
            "/df" => Ok(Self::DiskFree),
            other => Err(format!("unknown command {other}, try /help")),
        }
    }
}

fn parse_id(args: &[&str], usage: &str) -> Result<ItemId, String> {
    args.first()
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| format!("usage: {usage}"))
}

/// Parses and runs commands against the catalog, storage tree and
/// downloader, producing reply strings.
pub struct CommandRouter {
    catalog: Arc<Catalog>,
    fileops: FileOps,
    downloader: Arc<Downloader>,
}

impl CommandRouter {
    pub fn new(catalog: Arc<Catalog>, fileops: FileOps, downloader: Arc<Downloader>) -> Self {
        Self {
            catalog,
            fileops,
            downloader,
        }
    }

    /// Run one line and render the outcome as a reply. Failures become a
    /// short message naming the cause; nothing here panics a bad command
    /// into the process.
    pub async fn dispatch(&self, line: &str) -> String {
        match Command::parse(line) {
            Ok(command) => match self.run(command).await {
                Ok(reply) => reply,
                Err(e) => format!("error: {e}"),
            },
            Err(usage) => usage,
        }
    }

    async fn run(&self, command: Command) -> AppResult<String> {
        match command {
            Command::Help => Ok(HELP.to_string()),
            Command::Get { url, folder } => self.get(&url, folder.as_deref()).await,
            Command::Ls { folder } => self.ls(&folder).await,
            Command::Files => self.files().await,
            Command::Info { id } => self.info(id).await,
            Command::Upload { id } => self.upload(id).await,
            Command::Remove { id } => self.remove(id).await,
            Command::Rename { id, new_name } => self.rename(id, &new_name).await,
            Command::MkDir { folder } => {
                let rel = self.fileops.make_dir(&folder).await?;
                Ok(format!("folder created: {rel}"))
            }
            Command::Move { id, folder } => self.mv(id, &folder).await,
            Command::ZipFolder { folder, name } => self.zip_folder(&folder, name.as_deref()).await,
            Command::ZipItem { id, name } => self.zip_item(id, name.as_deref()).await,
            Command::DiskFree => {
                let (total, available) = self.fileops.disk_usage();
                Ok(format!(
                    "disk: {} free of {}",
                    format_size(available),
                    format_size(total)
                ))
            }
        }
    }

    async fn get(&self, url: &str, folder: Option<&str>) -> AppResult<String> {
        let folder_rel = folder.unwrap_or("").trim().trim_matches('/');
        let folder_abs = self.fileops.sandbox().ensure_dir(folder_rel).await?;

        let file_name = unique_name(&folder_abs, &guess_filename(url));
        let dest_rel = if folder_rel.is_empty() {
            file_name.clone()
        } else {
            format!("{folder_rel}/{file_name}")
        };

        // Progress is attempt-and-discard, at most one line per second.
        let mut last_report: Option<Instant> = None;
        let report_rel = dest_rel.clone();
        let on_progress = move |written: u64, declared: Option<u64>| {
            if last_report.is_none_or(|at| at.elapsed() >= Duration::from_secs(1)) {
                match declared {
                    Some(total) => info!(
                        "downloading {report_rel}: {} / {}",
                        format_size(written),
                        format_size(total)
                    ),
                    None => info!("downloading {report_rel}: {}", format_size(written)),
                }
                last_report = Some(Instant::now());
            }
        };

        let (_, size) = self.downloader.download(url, &dest_rel, on_progress).await?;
        let id = self.register(&dest_rel, &file_name, size).await?;
        Ok(format!(
            "saved #{id}: {dest_rel} ({})",
            format_size(size)
        ))
    }

    async fn ls(&self, folder: &str) -> AppResult<String> {
        let entries = self.fileops.list_dir(folder.trim().trim_matches('/')).await?;
        if entries.is_empty() {
            return Ok("folder is empty".to_string());
        }
        let lines: Vec<String> = entries
            .iter()
            .map(|entry| {
                let marker = if entry.is_dir { "[dir] " } else { "" };
                format!(
                    "{marker}{} ({})",
                    entry.name,
                    format_size(entry.size_bytes)
                )
            })
            .collect();
        Ok(lines.join("\n"))
    }

    async fn files(&self) -> AppResult<String> {
        let items = self.catalog.list_items().await?;
        if items.is_empty() {
            return Ok("no items stored yet".to_string());
        }
        let lines: Vec<String> = items
            .iter()
            .map(|(id, item)| {
                format!("#{id}: {} ({}) - {}", item.name, format_size(item.size), item.path)
            })
            .collect();
        Ok(lines.join("\n"))
    }

    async fn info(&self, id: ItemId) -> AppResult<String> {
        let item = self.require_item(id).await?;
        Ok(format!(
            "#{id}\nname: {}\npath: {}\nsize: {}",
            item.name,
            item.path,
            format_size(item.size)
        ))
    }

    /// Re-sending the bytes belongs to the hosting transport; this
    /// verifies the file is still there and refreshes the cached size.
    async fn upload(&self, id: ItemId) -> AppResult<String> {
        let item = self.require_item(id).await?;
        let size = self.fileops.file_size(&item.path).await?;
        if size != item.size {
            self.catalog.put_item(id, &item.path, &item.name, size).await?;
        }
        Ok(format!(
            "ready to send #{id}: {} ({})",
            item.path,
            format_size(size)
        ))
    }

    async fn remove(&self, id: ItemId) -> AppResult<String> {
        let item = self.require_item(id).await?;
        // The file deletion is best-effort: a filesystem failure must not
        // block removing the catalog entry.
        if let Err(e) = self.fileops.delete_rel(&item.path).await {
            warn!("could not delete file {} for item {id}: {e}", item.path);
        }
        self.catalog.delete_item(id).await?;
        Ok(format!("removed #{id}: {}", item.name))
    }

    async fn rename(&self, id: ItemId, new_name: &str) -> AppResult<String> {
        let item = self.require_item(id).await?;
        let new_rel = self.fileops.rename_rel(&item.path, new_name).await?;
        let name = basename(&new_rel).to_string();
        let size = self.fileops.file_size(&new_rel).await?;
        self.catalog.put_item(id, &new_rel, &name, size).await?;
        Ok(format!("renamed #{id} to {name}"))
    }

    async fn mv(&self, id: ItemId, folder: &str) -> AppResult<String> {
        let item = self.require_item(id).await?;
        let new_rel = self.fileops.move_to_folder(&item.path, folder).await?;
        let name = basename(&new_rel).to_string();
        let size = self.fileops.file_size(&new_rel).await?;
        self.catalog.put_item(id, &new_rel, &name, size).await?;
        Ok(format!("moved #{id} to {new_rel}"))
    }

    async fn zip_folder(&self, folder: &str, name: Option<&str>) -> AppResult<String> {
        let folder = folder.trim().trim_matches('/');
        let hint = name.unwrap_or_else(|| basename(folder));
        let zip_rel = self.fileops.zip_folder(folder, hint).await?;
        let size = self.fileops.file_size(&zip_rel).await?;
        let id = self.register(&zip_rel, basename(&zip_rel), size).await?;
        Ok(format!(
            "zipped {folder} into #{id}: {zip_rel} ({})",
            format_size(size)
        ))
    }

    async fn zip_item(&self, id: ItemId, name: Option<&str>) -> AppResult<String> {
        let item = self.require_item(id).await?;
        let hint = name.unwrap_or(&item.name);
        let zip_rel = self.fileops.zip_file(&item.path, hint).await?;
        let size = self.fileops.file_size(&zip_rel).await?;
        let new_id = self.register(&zip_rel, basename(&zip_rel), size).await?;
        Ok(format!(
            "zipped #{id} into #{new_id}: {zip_rel} ({})",
            format_size(size)
        ))
    }

    /// Allocate an id and store the record for a freshly created file.
    pub async fn register(
        &self,
        rel: &str,
        name: &str,
        size: u64,
    ) -> Result<ItemId, CatalogError> {
        let id = self.catalog.allocate_id().await?;
        self.catalog.put_item(id, rel, name, size).await?;
        Ok(id)
    }

    async fn require_item(&self, id: ItemId) -> AppResult<crate::catalog::ItemRecord> {
        self.catalog
            .get_item(id)
            .await?
            .ok_or_else(|| AppError::not_found("item", id))
    }
}

fn basename(rel: &str) -> &str {
    rel.rsplit('/').next().unwrap_or(rel)
}
