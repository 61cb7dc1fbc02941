//! Page loading and sub-resource interception.
//!
//! [`WebViewLink`] owns the content-load intent:
//!
//! - `None`: nothing is intercepted.
//! - `Prefetch`: cacheable sub-resources are downloaded in the background while
//!   the page's own requests go to the network untouched.
//! - `Navigate`: cacheable sub-resources are served from the cache when
//!   present; misses are downloaded in the background for next time.
//!
//! A sub-resource is cacheable when its URL contains the page host's
//! `.<tld>/files/` segment and does not match the ignore pattern.

pub mod connectivity;
pub mod index;
pub mod mime;

use std::sync::{Arc, RwLock};

use log::{debug, info, warn};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use url::Url;

use crate::bridge::CueBridge;
use crate::cache::CacheStore;
use crate::config::BridgeConfig;
use crate::error::{Error, Result};
use crate::platform::{Connectivity, WebViewHost};

pub use connectivity::{ConnectivityTracker, NetworkStatus};
pub use index::{fetch_index, index_urls, prefetch_index, PrefetchReport};
pub use mime::{mime_type_for_url, DEFAULT_MIME_TYPE};

pub type LogHandler = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentLoadType {
    #[default]
    None,
    Prefetch,
    Navigate,
}

#[derive(Debug, Default)]
struct LinkState {
    load_type: ContentLoadType,
    /// `scheme://host[:port]` of the current page
    main_origin: Option<String>,
    cache_pattern: String,
}

pub struct WebViewLink {
    webview: Arc<dyn WebViewHost>,
    cache: Arc<CacheStore>,
    config: BridgeConfig,
    state: RwLock<LinkState>,
    log_handler: RwLock<Option<LogHandler>>,
    tracker: ConnectivityTracker,
    _connectivity: Arc<dyn Connectivity>,
    runtime: Handle,
}

impl WebViewLink {
    /// Must be called from within a tokio runtime. Connectivity changes are
    /// forwarded to `bridge` as `network-state` notifications.
    pub fn new(
        webview: Arc<dyn WebViewHost>,
        bridge: Arc<CueBridge>,
        connectivity: Arc<dyn Connectivity>,
        config: &BridgeConfig,
    ) -> Result<Arc<Self>> {
        let runtime = Handle::try_current()?;
        let cache = Arc::clone(bridge.cache());
        let tracker = ConnectivityTracker::start(
            Arc::clone(&connectivity),
            config.network_debounce(),
            runtime.clone(),
            move |status| bridge.notify_internet_connection(status),
        );

        Ok(Arc::new(Self {
            webview,
            cache,
            config: config.clone(),
            state: RwLock::new(LinkState {
                cache_pattern: config.cache_pattern.clone(),
                ..LinkState::default()
            }),
            log_handler: RwLock::new(None),
            tracker,
            _connectivity: connectivity,
            runtime,
        }))
    }

    /// Mirror loader log lines into a per-session sink
    pub fn set_log_handler(&self, handler: Option<LogHandler>) {
        *self.log_handler.write().unwrap_or_else(|e| e.into_inner()) = handler;
    }

    fn log(&self, line: &str) {
        info!("[WebViewLink] {}", line);
        let handler = self.log_handler.read().unwrap_or_else(|e| e.into_inner()).clone();
        if let Some(handler) = handler {
            handler(line);
        }
    }

    pub fn load_type(&self) -> ContentLoadType {
        self.state.read().unwrap_or_else(|e| e.into_inner()).load_type
    }

    pub fn network_status(&self) -> NetworkStatus {
        self.tracker.status()
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Switch intent and derive the origin and cache pattern from the page URL
    fn begin(&self, url: &str, load_type: ContentLoadType) -> Result<Url> {
        let parsed = Url::parse(url).map_err(|_| Error::InvalidUrl(url.to_string()))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| Error::InvalidUrl(url.to_string()))?;

        let tld = host.rsplit('.').next().unwrap_or(host);
        let cache_pattern = match parsed.port() {
            Some(port) => format!(".{tld}:{port}/files/"),
            None => format!(".{tld}/files/"),
        };

        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.load_type = load_type;
        state.main_origin = Some(parsed.origin().ascii_serialization());
        state.cache_pattern = cache_pattern;
        Ok(parsed)
    }

    /// Load a page, serving its cacheable sub-resources from the cache
    pub fn navigate_to(&self, url: &str) -> Result<()> {
        let mut target = self.begin(url, ContentLoadType::Navigate)?;
        if self.network_status().is_offline() {
            target.query_pairs_mut().append_pair("offline", "true");
        }
        self.log(&format!("Navigate to: {target}"));
        self.webview.load_url(target.as_str());
        Ok(())
    }

    /// Load a page in preload mode and warm the cache from its index files.
    ///
    /// The returned handle resolves once the index warm-up has finished.
    pub fn prefetch(self: &Arc<Self>, url: &str) -> Result<JoinHandle<PrefetchReport>> {
        let mut target = self.begin(url, ContentLoadType::Prefetch)?;
        let indexes = index_urls(&target, &self.config)?;
        target.query_pairs_mut().append_pair("preload", "true");

        let link = Arc::clone(self);
        let warm_up = self.runtime.spawn(async move {
            let mut report = PrefetchReport::default();
            if link.network_status().is_offline() {
                link.log("Offline, index prefetch skipped");
                return report;
            }
            for index in indexes {
                match prefetch_index(&link.cache, &index, link.config.max_concurrent_downloads).await {
                    Ok(result) => {
                        link.log(&format!(
                            "Prefetched {}: {} downloaded, {} already cached, {} failed",
                            index, result.downloaded, result.skipped, result.failed
                        ));
                        report.merge(result);
                    }
                    Err(e) => link.log(&format!("Index {index} not prefetched: {e}")),
                }
            }
            report
        });

        self.log(&format!("Prefetch: {target}"));
        self.webview.load_url(target.as_str());
        Ok(warm_up)
    }

    pub fn is_cacheable(&self, url: &str) -> bool {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        url.contains(&state.cache_pattern) && !url.contains(&self.config.ignore_pattern)
    }

    /// Decide how a sub-resource request is served.
    ///
    /// `Some` is a cached response that replaces the network fetch; `None`
    /// lets the web view load the resource itself.
    pub async fn intercept(&self, url: &str) -> Option<http::Response<Vec<u8>>> {
        let load_type = self.load_type();
        if load_type == ContentLoadType::None || !self.is_cacheable(url) {
            return None;
        }

        if load_type == ContentLoadType::Navigate {
            let (bytes, status) = self.cache.load_from_file(url).await;
            if let Some(bytes) = bytes {
                self.log(&status.to_string());
                return self.cached_response(url, bytes);
            }
            self.log(&format!("Loaded NOT from cache, from url: {url}"));
        }

        if self.network_status().is_offline() {
            debug!("[WebViewLink] Offline, not caching {}", url);
            return None;
        }
        self.spawn_download(url);
        None
    }

    /// [`WebViewLink::intercept`] for web view threads outside the runtime
    pub fn intercept_blocking(&self, url: &str) -> Option<http::Response<Vec<u8>>> {
        if Handle::try_current().is_ok() {
            warn!("[WebViewLink] intercept_blocking called on a runtime thread, not intercepting {}", url);
            return None;
        }
        self.runtime.block_on(self.intercept(url))
    }

    fn spawn_download(&self, url: &str) {
        let cache = Arc::clone(&self.cache);
        let handler = self.log_handler.read().unwrap_or_else(|e| e.into_inner()).clone();
        let url = url.to_string();
        self.runtime.spawn(async move {
            let status = cache.download_to_file(&url).await;
            if let Some(handler) = handler {
                handler(&status.to_string());
            }
        });
    }

    fn cached_response(&self, url: &str, body: Vec<u8>) -> Option<http::Response<Vec<u8>>> {
        let origin = self
            .state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .main_origin
            .clone()
            .unwrap_or_else(|| "*".to_string());

        match http::Response::builder()
            .status(http::StatusCode::OK)
            .header(http::header::CONTENT_TYPE, mime_type_for_url(url))
            .header(http::header::ACCESS_CONTROL_ALLOW_ORIGIN, origin)
            .body(body)
        {
            Ok(response) => Some(response),
            Err(e) => {
                warn!("[WebViewLink] Failed to build cached response for {}: {}", url, e);
                None
            }
        }
    }
}
