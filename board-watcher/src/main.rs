//! Board Watcher - Main entry point
//!
//! Runs the order board monitor until Ctrl+C.

use board_watcher::{
    logging, Config, Deduplicator, MonitorLoop, MonitorSettings, PlaywrightLauncher,
    SessionManager, SessionSettings, SnippetExtractor, StorageStateAuth,
};
use clap::Parser;
use seen_store::JsonFileStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "board-watcher", version, about = "Watch an order board for bot-development requests")]
struct Args {
    /// Config file (defaults to the per-user config directory)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Show the browser window, e.g. to log in by hand
    #[arg(long)]
    headed: bool,

    /// Write a default config file to the config path and exit
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(Config::default_config_path);

    if args.init_config {
        Config::default().save_to_path(&config_path)?;
        println!("Wrote default configuration to {}", config_path.display());
        return Ok(());
    }

    let mut config = Config::load_from_path(&config_path)?;
    if args.headed {
        config.browser.headless = false;
    }
    config.validate()?;

    logging::init(&config.general)?;
    info!("Starting Board Watcher");
    info!("Configuration loaded from {:?}", config_path);

    let store = Arc::new(JsonFileStore::new());
    let dedup = Deduplicator::hydrate(store.as_ref(), &config.paths.seen_ids_path)?;
    let extractor = SnippetExtractor::new(&config.board.fields)?;

    let launcher = PlaywrightLauncher::new(&config.browser);
    let session = SessionManager::new(Box::new(launcher), SessionSettings::from_config(&config));
    let auth = Arc::new(StorageStateAuth::new(&config));

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down...");
                shutdown.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    let mut monitor = MonitorLoop::new(
        session,
        extractor,
        dedup,
        store,
        auth,
        MonitorSettings::from_config(&config),
        cancel,
    );

    if let Err(e) = monitor.start().await {
        error!("Startup failed, the poll loop will retry: {}", e);
    }

    let summary = monitor.run().await;
    info!(
        "Board Watcher stopped after {} cycles ({} orders emitted, {} restarts)",
        summary.cycles, summary.emitted, summary.restarts
    );
    Ok(())
}
