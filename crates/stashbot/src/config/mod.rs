//! Application configuration.
//!
//! One small TOML file; a default is written out on first run so the
//! service starts with zero setup. Host, port and the storage root can be
//! overridden from the CLI.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub download: DownloadConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage root; every relative path in the system is sandboxed
    /// against this directory.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    /// Catalog file path. Defaults to `<root>/catalog.json` when unset.
    pub catalog_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Maximum download size in megabytes, enforced before and during the
    /// transfer.
    #[serde(default = "default_max_download_mb")]
    pub max_download_mb: u64,
    /// Connection timeout in seconds. There is deliberately no total
    /// transfer timeout; the byte ceiling bounds the work instead.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    10000
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./storage")
}

fn default_max_download_mb() -> u64 {
    4096
}

fn default_connect_timeout_secs() -> u64 {
    30
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            catalog_path: None,
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_download_mb: default_max_download_mb(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl StorageConfig {
    /// Effective catalog file path.
    pub fn catalog_file(&self) -> PathBuf {
        self.catalog_path
            .clone()
            .unwrap_or_else(|| self.root.join("catalog.json"))
    }
}

impl DownloadConfig {
    /// The size ceiling in bytes.
    pub fn max_download_bytes(&self) -> u64 {
        self.max_download_mb * 1024 * 1024
    }
}

impl Config {
    pub fn load_from_file(config_file: &str) -> Result<Self> {
        if std::path::Path::new(&config_file).exists() {
            let contents = std::fs::read_to_string(config_file)?;
            Ok(toml::from_str(&contents)?)
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::write(config_file, contents)?;
            info!("Created default config file: {}", config_file);
            Ok(default_config)
        }
    }
}
