//! Index-driven cache warm-up.
//!
//! An index is a JSON array of file paths relative to the index itself:
//! ```json
//! ["files/intro.mp3", "files/sprites/flash.png"]
//! ```

use futures_util::future::join_all;
use log::{debug, warn};
use tokio::sync::Semaphore;
use url::Url;

use crate::cache::CacheStore;
use crate::config::BridgeConfig;
use crate::error::{Error, Result};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PrefetchReport {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl PrefetchReport {
    pub fn merge(&mut self, other: PrefetchReport) {
        self.downloaded += other.downloaded;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// The platform-level and game-assets index locations for a page's host
pub fn index_urls(page: &Url, config: &BridgeConfig) -> Result<Vec<Url>> {
    let root = page.join("/")?;
    let game_assets = format!(
        "/{}/{}",
        config.game_assets_path.trim_matches('/'),
        config.index_file_name
    );
    Ok(vec![root.join(&config.index_file_name)?, root.join(&game_assets)?])
}

/// Fetch an index and resolve its entries against the index URL
pub async fn fetch_index(client: &reqwest::Client, index_url: &Url) -> Result<Vec<Url>> {
    let response = client.get(index_url.clone()).send().await?;
    if !response.status().is_success() {
        return Err(Error::HttpStatus {
            status: response.status().as_u16(),
            url: index_url.to_string(),
        });
    }
    let entries: Vec<String> = serde_json::from_slice(&response.bytes().await?)?;

    let mut files = Vec::with_capacity(entries.len());
    for entry in entries {
        match index_url.join(&entry) {
            Ok(url) => files.push(url),
            Err(e) => warn!("[WebViewLink] Skipping index entry '{}': {}", entry, e),
        }
    }
    Ok(files)
}

/// Download every file listed in `index_url` that is not cached yet
pub async fn prefetch_index(
    cache: &CacheStore,
    index_url: &Url,
    max_concurrent: usize,
) -> Result<PrefetchReport> {
    let files = fetch_index(cache.client(), index_url).await?;
    debug!("[WebViewLink] {} lists {} files", index_url, files.len());

    let permits = Semaphore::new(max_concurrent.max(1));
    let permits = &permits;
    let results = join_all(files.iter().map(|file| async move {
        if cache.contains(file.as_str()).await {
            return None;
        }
        let _permit = permits.acquire().await.ok()?;
        Some(cache.download_to_file(file.as_str()).await.is_success())
    }))
    .await;

    let mut report = PrefetchReport::default();
    for result in results {
        match result {
            None => report.skipped += 1,
            Some(true) => report.downloaded += 1,
            Some(false) => report.failed += 1,
        }
    }
    Ok(report)
}
