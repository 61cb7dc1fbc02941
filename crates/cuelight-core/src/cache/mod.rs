//! File cache for page assets and page-provided data.
//!
//! ## Storage Structure
//! ```text
//! <cache_dir>/
//!   https___host.com_files_show_intro.mp3     (downloaded sub-resources)
//!   .tmpX3kd9Q.part                            (write in progress)
//!   state.json                                 (saveCacheFile entries)
//! ```
//!
//! Writers fill their own `.part` file unlocked and hold the entry's write
//! lock only for the rename over the old copy; readers hold the read lock
//! while reading.

pub mod keys;
pub mod locks;
pub mod store;

pub use keys::{cache_key_for_url, sanitize, shorten};
pub use locks::PathLocks;
pub use store::{CacheOutcome, CacheStatus, CacheStore, ClearReport};
