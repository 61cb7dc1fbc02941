//! cuelight-core: native side of the Cue light show web view.
//!
//! - [`bridge`]: JSON-RPC style dispatcher between the page and device services
//! - [`effects`]: torch control and timed flash patterns
//! - [`cache`]: on-disk content cache with per-path locking
//! - [`loader`]: page loading, sub-resource interception, connectivity
//!
//! Device capabilities are supplied by the host through the traits in
//! [`platform`].

pub mod bridge;
pub mod cache;
pub mod config;
pub mod effects;
pub mod error;
pub mod loader;
pub mod observer;
pub mod platform;
pub mod protocol;

#[cfg(test)]
pub(crate) mod test_support;

pub use bridge::{run_script_pump, CueBridge, Messenger, Responder};
pub use cache::{CacheStatus, CacheStore, ClearReport};
pub use config::BridgeConfig;
pub use error::{Error, Result};
pub use loader::{ContentLoadType, NetworkStatus, PrefetchReport, WebViewLink};
pub use observer::{Observers, Subscription};
pub use platform::{HardwareError, Platform};
