use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use cuelight_core::loader::{index_urls, prefetch_index, PrefetchReport};
use cuelight_core::protocol::{self, decode_script, CALLBACK_FUNCTION};
use cuelight_core::{BridgeConfig, CacheStore, CueBridge, Messenger};
use log::warn;

mod console;

/// Cue light show host: cache maintenance and bridge message replay
#[derive(Parser)]
#[command(name = "cuelight", version)]
struct Cli {
    /// TOML config file
    #[arg(long, global = true, env = "CUELIGHT_CONFIG")]
    config: Option<PathBuf>,

    /// Cache directory, overriding the config
    #[arg(long, global = true, env = "CUELIGHT_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect or manage the content cache
    #[command(subcommand)]
    Cache(CacheCommand),

    /// Warm the cache from a page's index files
    Prefetch { url: String },

    /// Run one bridge message and print the scripts sent back to the page
    Send {
        /// e.g. '[1, "torch", "sparkle", 500]'
        message: String,

        /// Give up waiting for the response after this many seconds
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
    },
}

#[derive(Subcommand)]
enum CacheCommand {
    /// List cached files
    Show,
    /// Delete every cached file
    Clear,
    /// Download one URL into the cache
    Fetch { url: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => BridgeConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => BridgeConfig::default(),
    };
    if let Some(dir) = cli.cache_dir {
        config = config.with_cache_dir(dir);
    }
    let cache = Arc::new(CacheStore::from_config(&config)?);

    match cli.command {
        Commands::Cache(CacheCommand::Show) => {
            let listing = cache.show_cache().await;
            if listing.is_empty() {
                println!("Cache is empty ({})", cache.dir().display());
            } else {
                print!("{listing}");
                println!("{} bytes in {}", cache.size_bytes().await, cache.dir().display());
            }
        }
        Commands::Cache(CacheCommand::Clear) => {
            let report = cache.clear_cache().await;
            print!("{report}");
            if !report.failed.is_empty() {
                bail!("{} files could not be deleted", report.failed.len());
            }
        }
        Commands::Cache(CacheCommand::Fetch { url }) => {
            let status = cache.download_to_file(&url).await;
            println!("{status}");
            if !status.is_success() {
                bail!("Download failed");
            }
        }
        Commands::Prefetch { url } => prefetch(&cache, &config, &url).await?,
        Commands::Send { message, timeout_secs } => {
            send(cache, &config, &message, Duration::from_secs(timeout_secs)).await?
        }
    }

    Ok(())
}

async fn prefetch(cache: &CacheStore, config: &BridgeConfig, url: &str) -> Result<()> {
    let page = url::Url::parse(url).with_context(|| format!("Invalid URL: '{url}'"))?;
    let mut total = PrefetchReport::default();
    for index in index_urls(&page, config)? {
        match prefetch_index(cache, &index, config.max_concurrent_downloads).await {
            Ok(report) => {
                println!(
                    "{index}: {} downloaded, {} already cached, {} failed",
                    report.downloaded, report.skipped, report.failed
                );
                total.merge(report);
            }
            Err(e) => warn!("{index}: {e}"),
        }
    }
    if total.failed > 0 {
        bail!("{} files could not be downloaded", total.failed);
    }
    Ok(())
}

async fn send(
    cache: Arc<CacheStore>,
    config: &BridgeConfig,
    message: &str,
    timeout: Duration,
) -> Result<()> {
    // Unaddressable messages get no answer at all; report them instead of waiting
    if let Err(e) = protocol::decode(message) {
        if e.request_id().is_none() {
            bail!("Message would be dropped: {e}");
        }
    }

    let media_dir = std::env::current_dir()?;
    let (messenger, mut scripts) = Messenger::channel();
    let bridge = CueBridge::new(console::platform(media_dir), cache, messenger, config)?;
    bridge.post_message(message);

    let answered = tokio::time::timeout(timeout, async {
        while let Some(script) = scripts.recv().await {
            println!("{script}");
            if decode_script(&script).is_some_and(|(function, _)| function == CALLBACK_FUNCTION) {
                return true;
            }
        }
        false
    })
    .await;

    bridge.shutdown();
    match answered {
        Ok(true) => Ok(()),
        Ok(false) => bail!("Bridge closed without answering"),
        Err(_) => bail!("No response within {} s", timeout.as_secs()),
    }
}
