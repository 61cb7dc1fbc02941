//! Runtime configuration for the bridge and the content cache.
//!
//! Every field has a default, so an empty TOML document is a valid config:
//!
//! ```toml
//! cache_dir = "/data/user/0/com.cueaudio.lights/files/cache"
//! ignore_pattern = "https://services"
//! blink_interval_ms = 50
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Directory holding cached files (created on first use)
    pub cache_dir: PathBuf,
    /// URL fragment marking a sub-resource as cacheable; recomputed per navigation
    pub cache_pattern: String,
    /// URL fragment marking first-party API calls that must never be cached
    pub ignore_pattern: String,
    pub index_file_name: String,
    pub game_assets_path: String,
    /// Torch toggle / envelope step interval
    pub blink_interval_ms: u64,
    /// Delay before re-reading connectivity after a platform callback
    pub network_debounce_ms: u64,
    pub http_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub user_agent: String,
    pub max_concurrent_downloads: usize,
    /// Save-photo permission needs no prompt above this platform API level
    pub scoped_storage_api_level: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join("cuelight").join("cache"),
            cache_pattern: ".com/files/".to_string(),
            ignore_pattern: "https://services".to_string(),
            index_file_name: "index.json".to_string(),
            game_assets_path: "games/light-show".to_string(),
            blink_interval_ms: 50,
            network_debounce_ms: 50,
            http_timeout_secs: 30,
            connect_timeout_secs: 10,
            user_agent: concat!("CueLight/", env!("CARGO_PKG_VERSION")).to_string(),
            max_concurrent_downloads: 4,
            scoped_storage_api_level: 29,
        }
    }
}

impl BridgeConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn blink_interval(&self) -> Duration {
        Duration::from_millis(self.blink_interval_ms)
    }

    pub fn network_debounce(&self) -> Duration {
        Duration::from_millis(self.network_debounce_ms)
    }

    /// Build the HTTP client used for downloads and index fetches
    pub fn http_client(&self) -> Result<reqwest::Client> {
        Ok(reqwest::Client::builder()
            .timeout(Duration::from_secs(self.http_timeout_secs))
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .user_agent(self.user_agent.clone())
            .build()?)
    }
}
