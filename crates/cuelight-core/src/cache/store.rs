//! On-disk content cache keyed by source URL

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use log::{debug, info, warn};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;

use super::keys::{cache_key_for_url, sanitize, shorten};
use super::locks::PathLocks;
use crate::config::BridgeConfig;
use crate::error::{Error, Result};

/// Suffix of in-flight downloads; renamed into place once complete
const PARTIAL_SUFFIX: &str = ".part";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOutcome {
    Added,
    Overwritten,
    Loaded,
    Missing,
    Failed(String),
}

/// Human-readable result of a cache operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStatus {
    pub outcome: CacheOutcome,
    /// Shortened file name, for log lines
    pub short_name: String,
}

impl CacheStatus {
    fn new(outcome: CacheOutcome, file_name: &str) -> Self {
        Self { outcome, short_name: shorten(file_name).to_string() }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self.outcome,
            CacheOutcome::Added | CacheOutcome::Overwritten | CacheOutcome::Loaded
        )
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            CacheOutcome::Added => write!(f, "Added to cache: {}", self.short_name),
            CacheOutcome::Overwritten => write!(f, "Overwritten in cache: {}", self.short_name),
            CacheOutcome::Loaded => write!(f, "Loaded from cache: {}", self.short_name),
            CacheOutcome::Missing => {
                write!(f, "Not loaded, file does not exist: {}", self.short_name)
            }
            CacheOutcome::Failed(reason) => write!(f, "Error: {}: {}", reason, self.short_name),
        }
    }
}

/// Per-file results of [`CacheStore::clear_cache`]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClearReport {
    pub deleted: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl fmt::Display for ClearReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for name in &self.deleted {
            writeln!(f, "Deleted: {}", shorten(name))?;
        }
        for (name, reason) in &self.failed {
            writeln!(f, "Error deleting file: {} ({})", shorten(name), reason)?;
        }
        Ok(())
    }
}

pub struct CacheStore {
    dir: PathBuf,
    client: reqwest::Client,
    locks: PathLocks,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>, client: reqwest::Client) -> Self {
        Self { dir: dir.into(), client, locks: PathLocks::new() }
    }

    pub fn from_config(config: &BridgeConfig) -> Result<Self> {
        Ok(Self::new(config.cache_dir.clone(), config.http_client()?))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for_url(&self, url: &str) -> PathBuf {
        self.dir.join(cache_key_for_url(url))
    }

    pub(crate) fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn locks(&self) -> &PathLocks {
        &self.locks
    }

    async fn ensure_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    pub async fn contains(&self, url: &str) -> bool {
        tokio::fs::try_exists(self.path_for_url(url)).await.unwrap_or(false)
    }

    /// Download `url` into the cache, replacing any previous copy.
    ///
    /// The body is streamed into a private `.part` file without holding the
    /// path lock; the write lock is only taken to swap it into place. A
    /// failed download leaves the previous copy untouched.
    ///
    /// Never fails: network and I/O errors are reported through the status.
    pub async fn download_to_file(&self, url: &str) -> CacheStatus {
        let path = self.path_for_url(url);
        let file_name = file_name_of(&path);

        if let Err(e) = self.ensure_dir().await {
            return CacheStatus::new(
                CacheOutcome::Failed(format!("Failed to create cache directory ({e})")),
                &file_name,
            );
        }

        let outcome = match self.fetch_staged(url).await {
            Ok((staged, bytes)) => match self.commit(staged, &path).await {
                Ok(existed) => {
                    debug!("[FileCache] Stored {} bytes from {}", bytes, url);
                    if existed {
                        CacheOutcome::Overwritten
                    } else {
                        CacheOutcome::Added
                    }
                }
                Err(e) => CacheOutcome::Failed(format!("Failed to save in cache ({e})")),
            },
            Err(e) => CacheOutcome::Failed(format!("Failed to save in cache ({e})")),
        };

        let status = CacheStatus::new(outcome, &file_name);
        info!("[FileCache] {}", status);
        status
    }

    /// Create a `.part` file in the cache directory, unique to this writer.
    /// Dropping the returned path deletes the file.
    fn stage(&self) -> Result<(tokio::fs::File, TempPath)> {
        let (file, staged) = tempfile::Builder::new()
            .suffix(PARTIAL_SUFFIX)
            .tempfile_in(&self.dir)?
            .into_parts();
        Ok((tokio::fs::File::from_std(file), staged))
    }

    /// Move a staged file over `path`, returning whether an entry was replaced
    async fn commit(&self, staged: TempPath, path: &Path) -> std::io::Result<bool> {
        let _guard = self.locks.write(path).await;
        let existed = tokio::fs::try_exists(path).await.unwrap_or(false);
        staged.persist(path).map_err(|e| e.error)?;
        Ok(existed)
    }

    async fn fetch_staged(&self, url: &str) -> Result<(TempPath, u64)> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(Error::HttpStatus { status: response.status().as_u16(), url: url.to_string() });
        }

        let (mut file, staged) = self.stage()?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok((staged, written))
    }

    /// Read the cached copy of `url`.
    ///
    /// The whole file is read under the path's read lock, so the bytes are
    /// always one complete version of the file.
    pub async fn load_from_file(&self, url: &str) -> (Option<Vec<u8>>, CacheStatus) {
        self.read_entry(&self.path_for_url(url)).await
    }

    async fn read_entry(&self, path: &Path) -> (Option<Vec<u8>>, CacheStatus) {
        let file_name = file_name_of(path);
        let _guard = self.locks.read(path).await;
        match tokio::fs::read(path).await {
            Ok(bytes) => (Some(bytes), CacheStatus::new(CacheOutcome::Loaded, &file_name)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                (None, CacheStatus::new(CacheOutcome::Missing, &file_name))
            }
            Err(e) => (
                None,
                CacheStatus::new(CacheOutcome::Failed(format!("Failed to load file ({e})")), &file_name),
            ),
        }
    }

    fn path_for_name(&self, filename: &str) -> PathBuf {
        self.dir.join(sanitize(filename))
    }

    /// Store page-provided data under a caller-chosen name
    pub async fn save_named(&self, filename: &str, data: &[u8]) -> CacheStatus {
        let path = self.path_for_name(filename);
        let file_name = file_name_of(&path);

        if let Err(e) = self.ensure_dir().await {
            return CacheStatus::new(
                CacheOutcome::Failed(format!("Failed to create cache directory ({e})")),
                &file_name,
            );
        }

        let written = async {
            let (mut file, staged) = self.stage()?;
            file.write_all(data).await?;
            file.flush().await?;
            drop(file);
            Ok::<_, Error>(self.commit(staged, &path).await?)
        }
        .await;

        let outcome = match written {
            Ok(true) => CacheOutcome::Overwritten,
            Ok(false) => CacheOutcome::Added,
            Err(e) => CacheOutcome::Failed(format!("Failed to save in cache ({e})")),
        };
        CacheStatus::new(outcome, &file_name)
    }

    pub async fn load_named(&self, filename: &str) -> (Option<Vec<u8>>, CacheStatus) {
        self.read_entry(&self.path_for_name(filename)).await
    }

    /// Names of the cached files, sorted
    pub async fn entries(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .files()
            .await
            .into_iter()
            .filter(|name| !name.ends_with(PARTIAL_SUFFIX))
            .collect();
        names.sort();
        names
    }

    /// Every regular file in the cache directory, `.part` files included
    async fn files(&self) -> Vec<String> {
        let mut names = Vec::new();
        let Ok(mut dir) = tokio::fs::read_dir(&self.dir).await else {
            return names;
        };
        while let Ok(Some(entry)) = dir.next_entry().await {
            let is_file = match entry.file_type().await {
                Ok(file_type) => file_type.is_file(),
                Err(_) => false,
            };
            if is_file {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names
    }

    /// Numbered listing of the cache content
    pub async fn show_cache(&self) -> String {
        self.entries()
            .await
            .iter()
            .enumerate()
            .map(|(index, name)| format!("{}. {}\n", index + 1, shorten(name)))
            .collect()
    }

    /// Delete every cached file; a failed deletion does not stop the batch.
    ///
    /// Leftover `.part` files are swept too but not reported.
    pub async fn clear_cache(&self) -> ClearReport {
        let mut report = ClearReport::default();
        let (partials, mut names): (Vec<String>, Vec<String>) =
            self.files().await.into_iter().partition(|name| name.ends_with(PARTIAL_SUFFIX));
        for name in partials {
            if let Err(e) = tokio::fs::remove_file(self.dir.join(&name)).await {
                debug!("[FileCache] Could not remove partial file {}: {}", name, e);
            }
        }
        names.sort();
        for name in names {
            let path = self.dir.join(&name);
            let _guard = self.locks.write(&path).await;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => report.deleted.push(name),
                Err(e) => {
                    warn!("[FileCache] Error deleting {}: {}", name, e);
                    report.failed.push((name, e.to_string()));
                }
            }
        }
        info!(
            "[FileCache] Cleared {} files ({} failed)",
            report.deleted.len(),
            report.failed.len()
        );
        report
    }

    pub async fn size_bytes(&self) -> u64 {
        let mut total = 0;
        for name in self.entries().await {
            if let Ok(meta) = tokio::fs::metadata(self.dir.join(name)).await {
                total += meta.len();
            }
        }
        total
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(dir: &tempfile::TempDir) -> CacheStore {
        CacheStore::new(dir.path().join("cache"), reqwest::Client::new())
    }

    async fn serve(server: &MockServer, at: &str, body: Vec<u8>) {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_download_then_load() {
        let server = MockServer::start().await;
        serve(&server, "/files/intro.mp3", b"ID3 audio".to_vec()).await;
        let dir = tempfile::tempdir().unwrap();
        let cache = store(&dir);
        let url = format!("{}/files/intro.mp3", server.uri());

        let status = cache.download_to_file(&url).await;
        assert_eq!(status.outcome, CacheOutcome::Added);
        assert_eq!(status.to_string(), "Added to cache: intro.mp3");
        assert!(cache.contains(&url).await);

        let (bytes, status) = cache.load_from_file(&url).await;
        assert_eq!(bytes.as_deref(), Some(&b"ID3 audio"[..]));
        assert_eq!(status.outcome, CacheOutcome::Loaded);

        let status = cache.download_to_file(&url).await;
        assert_eq!(status.outcome, CacheOutcome::Overwritten);
        assert_eq!(cache.locks().tracked(), 0);
    }

    #[tokio::test]
    async fn test_http_error_leaves_no_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let cache = store(&dir);
        let url = format!("{}/files/gone.png", server.uri());

        let status = cache.download_to_file(&url).await;
        assert!(matches!(status.outcome, CacheOutcome::Failed(_)));
        assert!(status.to_string().starts_with("Error: Failed to save in cache"));
        assert!(!cache.contains(&url).await);
        assert!(cache.entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_refetch_keeps_previous_copy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/a.js"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"v1".to_vec()))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/a.js"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let cache = store(&dir);
        let url = format!("{}/files/a.js", server.uri());

        assert_eq!(cache.download_to_file(&url).await.outcome, CacheOutcome::Added);
        let status = cache.download_to_file(&url).await;
        assert!(matches!(status.outcome, CacheOutcome::Failed(_)));

        assert!(cache.contains(&url).await);
        let (bytes, status) = cache.load_from_file(&url).await;
        assert_eq!(bytes.as_deref(), Some(&b"v1"[..]));
        assert_eq!(status.outcome, CacheOutcome::Loaded);
        assert_eq!(cache.files().await.len(), 1);
    }

    #[tokio::test]
    async fn test_read_is_not_held_up_by_download() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/a.js"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"v1".to_vec()))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/a.js"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"v2".to_vec())
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(store(&dir));
        let url = format!("{}/files/a.js", server.uri());
        cache.download_to_file(&url).await;

        let refresh = tokio::spawn({
            let cache = cache.clone();
            let url = url.clone();
            async move { cache.download_to_file(&url).await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = Instant::now();
        let (bytes, _) = cache.load_from_file(&url).await;
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(bytes.as_deref(), Some(&b"v1"[..]));

        assert_eq!(refresh.await.unwrap().outcome, CacheOutcome::Overwritten);
        let (bytes, _) = cache.load_from_file(&url).await;
        assert_eq!(bytes.as_deref(), Some(&b"v2"[..]));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_a_status() {
        let dir = tempfile::tempdir().unwrap();
        let cache = store(&dir);
        let status = cache.download_to_file("http://127.0.0.1:9/files/a.js").await;
        assert!(!status.is_success());
    }

    #[tokio::test]
    async fn test_missing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = store(&dir);
        let (bytes, status) = cache.load_from_file("https://example.com/files/none.js").await;
        assert!(bytes.is_none());
        assert_eq!(status.outcome, CacheOutcome::Missing);
        assert_eq!(status.to_string(), "Not loaded, file does not exist: none.js");
    }

    #[tokio::test]
    async fn test_concurrent_downloads_do_not_corrupt() {
        let server = MockServer::start().await;
        let body: Vec<u8> = (0..256 * 1024).map(|i| (i % 251) as u8).collect();
        serve(&server, "/files/big.bin", body.clone()).await;
        let dir = tempfile::tempdir().unwrap();
        let cache = store(&dir);
        let url = format!("{}/files/big.bin", server.uri());

        let (first, second) = tokio::join!(cache.download_to_file(&url), cache.download_to_file(&url));
        assert!(first.is_success() && second.is_success());

        let (bytes, _) = cache.load_from_file(&url).await;
        assert_eq!(bytes.unwrap(), body);
        assert_eq!(cache.entries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_named_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = store(&dir);
        let data = r#"{"score": 12, "name": "zoë"}"#;

        assert_eq!(cache.save_named("State.json", data.as_bytes()).await.outcome, CacheOutcome::Added);
        let (bytes, _) = cache.load_named("State.json").await;
        assert_eq!(String::from_utf8(bytes.unwrap()).unwrap(), data);

        assert_eq!(cache.save_named("State.json", b"{}").await.outcome, CacheOutcome::Overwritten);
    }

    #[tokio::test]
    async fn test_show_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = store(&dir);
        cache.save_named("b.txt", b"2").await;
        cache.save_named("a.txt", b"1").await;

        assert_eq!(cache.show_cache().await, "1. a.txt\n2. b.txt\n");
        assert_eq!(cache.size_bytes().await, 2);

        let report = cache.clear_cache().await;
        assert_eq!(report.deleted.len(), 2);
        assert!(report.failed.is_empty());
        assert_eq!(report.to_string(), "Deleted: a.txt\nDeleted: b.txt\n");
        assert!(cache.entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_clear_sweeps_leftover_partials() {
        let dir = tempfile::tempdir().unwrap();
        let cache = store(&dir);
        cache.save_named("a.txt", b"1").await;
        let stray = cache.dir().join(".tmpAbC123.part");
        tokio::fs::write(&stray, b"half").await.unwrap();

        assert_eq!(cache.entries().await, vec!["a.txt".to_string()]);
        assert_eq!(cache.size_bytes().await, 1);

        let report = cache.clear_cache().await;
        assert_eq!(report.deleted, vec!["a.txt".to_string()]);
        assert!(!stray.exists());
        assert!(cache.files().await.is_empty());
    }
}
