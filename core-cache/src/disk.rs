//! File-backed disk tier
//!
//! Each entry is its own file named by the SHA-256 of its key. Writes land in
//! a temporary file that is renamed over the target, so a reader sees either
//! the old entry or the new one, never a partial write. Expiry is computed
//! from the file modification time at read time.

use crate::config::DiskCacheConfig;
use crate::error::Result;
use crate::store::{is_past_ttl, CacheEntry, CacheStore};
use async_trait::async_trait;
use bridge_traits::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Filename for `key`: lowercase hex SHA-256 plus `suffix`.
pub fn entry_file_name(key: &str, suffix: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    format!("{}{}", hex::encode(digest), suffix)
}

/// Contents and modification time of one entry file.
#[derive(Debug, Clone)]
pub(crate) struct StoredFile {
    pub bytes: Vec<u8>,
    pub modified: DateTime<Utc>,
}

/// Directory listing record.
#[derive(Debug, Clone)]
pub(crate) struct FileInfo {
    pub path: PathBuf,
    pub len: u64,
    pub modified: DateTime<Utc>,
}

/// Raw byte store shared by the plain and encrypted tiers.
///
/// Every operation holds one async mutex for its duration.
pub(crate) struct DiskStore {
    directory: PathBuf,
    suffix: &'static str,
    lock: Mutex<()>,
}

impl DiskStore {
    pub fn new(directory: PathBuf, suffix: &'static str) -> Self {
        Self {
            directory,
            suffix,
            lock: Mutex::new(()),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.directory.join(entry_file_name(key, self.suffix))
    }

    pub async fn ensure_directory(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.directory).await?;
        Ok(())
    }

    pub async fn read(&self, key: &str) -> Result<Option<StoredFile>> {
        let _guard = self.lock.lock().await;
        read_file(&self.path_for(key)).await
    }

    /// Read the entry for `key` and hand it to `accept`.
    ///
    /// When `accept` returns `None` the file is deleted before the lock is
    /// released, so a write that lands after the read is never discarded.
    pub async fn read_or_discard<T, F>(&self, key: &str, accept: F) -> Result<Option<T>>
    where
        F: FnOnce(StoredFile) -> Option<T>,
    {
        let _guard = self.lock.lock().await;
        let path = self.path_for(key);
        let Some(file) = read_file(&path).await? else {
            return Ok(None);
        };

        match accept(file) {
            Some(value) => Ok(Some(value)),
            None => {
                remove_file(&path).await?;
                Ok(None)
            }
        }
    }

    pub async fn read_path(&self, path: &Path) -> Result<Option<StoredFile>> {
        let _guard = self.lock.lock().await;
        read_file(path).await
    }

    pub async fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.write_atomic(&self.path_for(key), bytes).await
    }

    /// Write `key`, then sweep the directory down to `max_bytes` in the same
    /// critical section.
    pub async fn write_within_quota(
        &self,
        key: &str,
        bytes: &[u8],
        max_bytes: Option<u64>,
    ) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.write_atomic(&self.path_for(key), bytes).await?;
        if let Some(max_bytes) = max_bytes {
            self.enforce_quota_unlocked(max_bytes).await?;
        }
        Ok(())
    }

    pub async fn write_path(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.write_atomic(path, bytes).await
    }

    pub async fn remove(&self, key: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        remove_file(&self.path_for(key)).await
    }

    pub async fn remove_path(&self, path: &Path) -> Result<bool> {
        let _guard = self.lock.lock().await;
        remove_file(path).await
    }

    /// Delete every entry file for which `doomed` returns `true`, listing and
    /// deleting under one lock. Returns the number removed.
    pub async fn remove_where<F>(&self, doomed: F) -> Result<usize>
    where
        F: Fn(&FileInfo) -> bool,
    {
        let _guard = self.lock.lock().await;

        let mut removed = 0;
        for file in self.list_unlocked().await? {
            if doomed(&file) && remove_file(&file.path).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Entry files in the directory; temporaries and markers are skipped.
    pub async fn list(&self) -> Result<Vec<FileInfo>> {
        let _guard = self.lock.lock().await;
        self.list_unlocked().await
    }

    /// Replace the directory with an empty one.
    ///
    /// The old tree is moved aside and deleted afterwards; readers of this
    /// store are held on the lock until the new directory exists.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().await;

        let trash = self.sibling_path("trash");
        match tokio::fs::rename(&self.directory, &trash).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tokio::fs::create_dir_all(&self.directory).await?;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        tokio::fs::create_dir_all(&self.directory).await?;

        if let Err(e) = tokio::fs::remove_dir_all(&trash).await {
            warn!(path = %trash.display(), error = %e, "Failed to delete cleared cache directory");
        }

        Ok(())
    }

    /// Remove the oldest entries until the directory fits in `max_bytes`.
    /// Callers hold the lock.
    async fn enforce_quota_unlocked(&self, max_bytes: u64) -> Result<usize> {
        let mut files = self.list_unlocked().await?;
        let mut total: u64 = files.iter().map(|f| f.len).sum();
        if total <= max_bytes {
            return Ok(0);
        }

        files.sort_by_key(|f| f.modified);

        let mut removed = 0;
        for file in files {
            if total <= max_bytes {
                break;
            }
            if remove_file(&file.path).await? {
                removed += 1;
            }
            total = total.saturating_sub(file.len);
        }

        debug!(
            directory = %self.directory.display(),
            removed,
            remaining_bytes = total,
            "Disk quota sweep finished"
        );
        Ok(removed)
    }

    async fn list_unlocked(&self) -> Result<Vec<FileInfo>> {
        let mut reader = match tokio::fs::read_dir(&self.directory).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(dir_entry) = reader.next_entry().await? {
            let name = dir_entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') || !name.ends_with(self.suffix) {
                continue;
            }

            let metadata = match dir_entry.metadata().await {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => continue,
                // Removed between listing and stat
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            files.push(FileInfo {
                path: dir_entry.path(),
                len: metadata.len(),
                modified: modified_time(&metadata),
            });
        }

        Ok(files)
    }

    async fn write_atomic(&self, target: &Path, bytes: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.directory).await?;

        let tmp = self
            .directory
            .join(format!(".{}.tmp", Uuid::new_v4().simple()));

        if let Err(e) = tokio::fs::write(&tmp, bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        if let Err(e) = tokio::fs::rename(&tmp, target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        Ok(())
    }

    fn sibling_path(&self, label: &str) -> PathBuf {
        let name = self
            .directory
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.directory
            .with_file_name(format!(".{}.{}-{}", name, label, Uuid::new_v4().simple()))
    }
}

async fn read_file(path: &Path) -> Result<Option<StoredFile>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let modified = match tokio::fs::metadata(path).await {
        Ok(metadata) => modified_time(&metadata),
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    Ok(Some(StoredFile { bytes, modified }))
}

async fn remove_file(path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn modified_time(metadata: &std::fs::Metadata) -> DateTime<Utc> {
    let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    DateTime::<Utc>::from(modified)
}

/// Disk cache tier storing JSON-serialized values.
pub struct DiskCache<V> {
    config: DiskCacheConfig,
    store: Arc<DiskStore>,
    clock: Arc<dyn Clock>,
    _marker: PhantomData<fn() -> V>,
}

impl<V> DiskCache<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub const FILE_SUFFIX: &'static str = ".json";

    pub fn new(config: DiskCacheConfig) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(DiskStore::new(config.directory.clone(), Self::FILE_SUFFIX));
        Ok(Self::with_store(config, store))
    }

    /// Handle over a store another handle already owns. Both handles then
    /// serialize on the same lock.
    pub(crate) fn with_store(config: DiskCacheConfig, store: Arc<DiskStore>) -> Self {
        Self {
            config,
            store,
            clock: Arc::new(SystemClock),
            _marker: PhantomData,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &DiskCacheConfig {
        &self.config
    }

    /// Whether both handles serialize on the same underlying store.
    pub fn shares_store_with<U>(&self, other: &DiskCache<U>) -> bool {
        Arc::ptr_eq(&self.store, &other.store)
    }

    /// Create the backing directory if it does not exist yet.
    pub async fn initialize(&self) -> Result<()> {
        self.store.ensure_directory().await
    }

    pub async fn get_entry(&self, key: &str) -> Result<Option<CacheEntry<V>>> {
        let now = self.clock.now();
        let ttl = self.config.ttl;

        // Expired and undecodable entries are a miss and are deleted so
        // they get rewritten
        self.store
            .read_or_discard(key, |file| {
                if is_past_ttl(file.modified, now, ttl) {
                    debug!(file = %entry_file_name(key, Self::FILE_SUFFIX), "Disk cache entry expired");
                    return None;
                }

                match serde_json::from_slice(&file.bytes) {
                    Ok(value) => Some(CacheEntry::new(value, file.modified)),
                    Err(e) => {
                        warn!(
                            file = %entry_file_name(key, Self::FILE_SUFFIX),
                            error = %e,
                            "Discarding undecodable disk cache entry"
                        );
                        None
                    }
                }
            })
            .await
    }

    pub async fn get(&self, key: &str) -> Result<Option<V>> {
        Ok(self.get_entry(key).await?.map(|entry| entry.value))
    }

    /// Serialize and write `value`, then apply the quota if one is set.
    ///
    /// A failed write leaves any previous entry for `key` intact.
    pub async fn set(&self, key: &str, value: &V) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.store
            .write_within_quota(key, &bytes, self.config.max_bytes)
            .await
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        self.store.remove(key).await?;
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await?;
        info!(directory = %self.config.directory.display(), "Disk cache cleared");
        Ok(())
    }

    /// Delete every entry whose TTL has elapsed. Returns the number removed.
    pub async fn purge_expired(&self) -> Result<usize> {
        if self.config.ttl.is_none() {
            return Ok(0);
        }

        let now = self.clock.now();
        let ttl = self.config.ttl;
        let removed = self
            .store
            .remove_where(|file| is_past_ttl(file.modified, now, ttl))
            .await?;

        debug!(removed, "Purged expired disk cache entries");
        Ok(removed)
    }

    /// Total bytes currently stored in entry files.
    pub async fn size_bytes(&self) -> Result<u64> {
        Ok(self.store.list().await?.iter().map(|f| f.len).sum())
    }
}

#[async_trait]
impl<V> CacheStore<V> for DiskCache<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get_entry(&self, key: &str) -> Result<Option<CacheEntry<V>>> {
        DiskCache::get_entry(self, key).await
    }

    async fn set(&self, key: &str, value: V) -> Result<()> {
        DiskCache::set(self, key, &value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        DiskCache::remove(self, key).await
    }

    async fn clear(&self) -> Result<()> {
        DiskCache::clear(self).await
    }

    fn ttl(&self) -> Option<Duration> {
        self.config.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::ManualClock;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Listing {
        id: u64,
        title: String,
    }

    fn listing(id: u64) -> Listing {
        Listing {
            id,
            title: format!("Listing {}", id),
        }
    }

    fn cache(dir: &TempDir, clock: Arc<ManualClock>) -> DiskCache<Listing> {
        DiskCache::new(DiskCacheConfig::new(dir.path().join("listings")))
            .unwrap()
            .with_clock(clock)
    }

    #[test]
    fn test_entry_file_name_is_stable_hex() {
        let name = entry_file_name("feed?lat=1&lng=2", ".json");
        assert_eq!(name, entry_file_name("feed?lat=1&lng=2", ".json"));
        assert_ne!(name, entry_file_name("feed?lat=1&lng=3", ".json"));
        assert!(name.ends_with(".json"));
        assert_eq!(name.len(), 64 + ".json".len());
        assert!(name[..64].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, Arc::new(ManualClock::starting_now()));

        assert!(cache.get("k").await.unwrap().is_none());
        cache.set("k", &listing(1)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(listing(1)));

        cache.set("k", &listing(2)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(listing(2)));
    }

    #[tokio::test]
    async fn test_expiry_uses_modification_time() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::starting_now());
        let cache = DiskCache::<Listing>::new(
            DiskCacheConfig::new(dir.path()).with_ttl(Some(Duration::from_secs(60))),
        )
        .unwrap()
        .with_clock(clock.clone());

        cache.set("k", &listing(1)).await.unwrap();
        clock.advance(Duration::from_secs(120));

        assert!(cache.get("k").await.unwrap().is_none());
        assert!(!cache.store.path_for("k").exists());

        clock.advance(Duration::from_secs(1));
        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_discarding_a_corrupt_entry_never_drops_a_concurrent_write() {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(cache(&dir, Arc::new(ManualClock::starting_now())));
        cache.initialize().await.unwrap();
        let path = cache.store.path_for("k");

        for round in 0..200 {
            std::fs::write(&path, b"{not json").unwrap();

            let reader = {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get("k").await })
            };
            let writer = {
                let cache = cache.clone();
                tokio::spawn(async move { cache.set("k", &listing(round)).await })
            };

            let _ = reader.await.unwrap().unwrap();
            writer.await.unwrap().unwrap();

            assert_eq!(
                cache.get("k").await.unwrap(),
                Some(listing(round)),
                "write lost in round {}",
                round
            );
        }
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, Arc::new(ManualClock::starting_now()));
        cache.set("k", &listing(1)).await.unwrap();

        std::fs::write(cache.store.path_for("k"), b"{not json").unwrap();
        assert!(cache.get("k").await.unwrap().is_none());
        assert!(!cache.store.path_for("k").exists());
    }

    #[tokio::test]
    async fn test_clear_recreates_directory() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, Arc::new(ManualClock::starting_now()));
        cache.set("a", &listing(1)).await.unwrap();
        cache.set("b", &listing(2)).await.unwrap();

        cache.clear().await.unwrap();

        assert!(cache.config().directory.is_dir());
        assert!(cache.get("a").await.unwrap().is_none());
        assert_eq!(cache.size_bytes().await.unwrap(), 0);

        // Only the recreated directory remains beside nothing else
        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[tokio::test]
    async fn test_no_temporary_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, Arc::new(ManualClock::starting_now()));
        for i in 0..5 {
            cache.set(&format!("k{}", i), &listing(i)).await.unwrap();
        }

        let names: Vec<String> = std::fs::read_dir(&cache.config().directory)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 5);
        assert!(names.iter().all(|n| n.ends_with(".json") && !n.starts_with('.')));
    }

    #[tokio::test]
    async fn test_quota_sweep_removes_oldest() {
        let dir = TempDir::new().unwrap();
        let entry_len = serde_json::to_vec(&listing(1)).unwrap().len() as u64;
        let cache = DiskCache::<Listing>::new(
            DiskCacheConfig::new(dir.path()).with_max_bytes(Some(entry_len * 2)),
        )
        .unwrap();

        cache.set("first", &listing(1)).await.unwrap();
        // Distinct modification times
        tokio::time::sleep(Duration::from_millis(20)).await;
        cache.set("second", &listing(2)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        cache.set("third", &listing(3)).await.unwrap();

        assert!(cache.get("first").await.unwrap().is_none());
        assert!(cache.get("second").await.unwrap().is_some());
        assert!(cache.get("third").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::starting_now());
        let cache = cache(&dir, clock.clone());
        cache.set("a", &listing(1)).await.unwrap();
        cache.set("b", &listing(2)).await.unwrap();

        assert_eq!(cache.purge_expired().await.unwrap(), 0);

        clock.advance(Duration::from_secs(25 * 60 * 60));
        assert_eq!(cache.purge_expired().await.unwrap(), 2);
        assert_eq!(cache.size_bytes().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_remove_absent_key_is_ok() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, Arc::new(ManualClock::starting_now()));
        cache.remove("missing").await.unwrap();
        CacheStore::<Listing>::clear(&cache).await.unwrap();
    }
}
