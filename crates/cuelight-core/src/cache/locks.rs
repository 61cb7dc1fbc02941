//! Per-path reader/writer locks.
//!
//! A lock is created lazily on first use and pruned from the map when its last
//! holder releases it, so the map only tracks paths with active users.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

type LockMap = HashMap<PathBuf, Arc<RwLock<()>>>;

#[derive(Clone, Default)]
pub struct PathLocks {
    map: Arc<Mutex<LockMap>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, path: &Path) -> Arc<RwLock<()>> {
        let mut map = self.map.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(path.to_path_buf()).or_default().clone()
    }

    pub async fn write(&self, path: &Path) -> PathWriteGuard {
        let guard = self.entry(path).write_owned().await;
        PathGuard { guard: Some(guard), map: self.map.clone(), path: path.to_path_buf() }
    }

    pub async fn read(&self, path: &Path) -> PathReadGuard {
        let guard = self.entry(path).read_owned().await;
        PathGuard { guard: Some(guard), map: self.map.clone(), path: path.to_path_buf() }
    }

    /// Number of paths currently holding a lock entry
    pub fn tracked(&self) -> usize {
        self.map.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

pub struct PathGuard<G> {
    guard: Option<G>,
    map: Arc<Mutex<LockMap>>,
    path: PathBuf,
}

pub type PathWriteGuard = PathGuard<OwnedRwLockWriteGuard<()>>;
pub type PathReadGuard = PathGuard<OwnedRwLockReadGuard<()>>;

impl<G> Drop for PathGuard<G> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut map = self.map.lock().unwrap_or_else(|e| e.into_inner());
        // Only the map's own reference left: nobody holds or waits on this lock
        if map.get(&self.path).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            map.remove(&self.path);
        }
    }
}
