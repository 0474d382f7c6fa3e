use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use sandboxed_path::PathSandbox;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use stashbot::catalog::Catalog;
use stashbot::commands::CommandRouter;
use stashbot::config::Config;
use stashbot::downloader::Downloader;
use stashbot::fileops::FileOps;
use stashbot::web::{self, AppState};

#[derive(Parser)]
#[command(author, version, about = "personal file-management service")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Override the listen host
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the storage root directory
    #[arg(short, long)]
    storage_root: Option<String>,

    /// Log level when RUST_LOG is not set
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("stashbot={}", cli.log_level)));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::load_from_file(&cli.config)?;
    if let Some(host) = cli.host {
        config.web.host = host;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }
    if let Some(root) = cli.storage_root {
        config.storage.root = root.into();
    }

    let sandbox = PathSandbox::new(&config.storage.root).await?;
    info!("storage root: {}", sandbox.root().display());

    let catalog = Arc::new(Catalog::new(config.storage.catalog_file()));
    let fileops = FileOps::new(sandbox.clone());
    let downloader = Arc::new(Downloader::new(
        sandbox,
        config.download.max_download_bytes(),
        Duration::from_secs(config.download.connect_timeout_secs),
    )?);
    let router = Arc::new(CommandRouter::new(catalog, fileops, downloader));

    let addr = format!("{}:{}", config.web.host, config.web.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on http://{addr}");

    web::serve(listener, AppState { router }).await?;
    Ok(())
}
