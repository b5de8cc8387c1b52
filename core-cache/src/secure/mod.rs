//! Encrypted cache tier
//!
//! Wraps the disk store with AES-256-GCM. Each entry is one `.encrypted`
//! file holding `nonce || ciphertext || tag`. The key is owned by
//! [`KeyManager`] and never written to the cache directory.
//!
//! ## Rotation
//!
//! [`SecureCache::rotate_encryption_key`] decrypts every entry into memory
//! before the new key is persisted. A crash before the swap leaves all files
//! under the old key, which is still in the keystore. A crash after the swap
//! leaves a `rotation.pending` marker; [`SecureCache::recover_incomplete_rotation`]
//! drops whatever no longer authenticates so later reads are clean misses.

mod encryption;
mod keys;

pub use encryption::{CacheEncryptor, EncryptionKey, KEY_LEN, NONCE_LEN, TAG_LEN};
pub use keys::KeyManager;

use crate::config::SecureCacheConfig;
use crate::disk::DiskStore;
use crate::error::{CacheError, Result};
use crate::store::{CacheEntry, CacheStore};
use async_trait::async_trait;
use bridge_traits::SecureKeystore;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

/// Marker present while a rotation is rewriting entries.
pub const ROTATION_MARKER: &str = "rotation.pending";

pub struct SecureCache {
    config: SecureCacheConfig,
    store: DiskStore,
    keys: KeyManager,
    // Readers and writers share; rotation and clear_all are exclusive
    gate: RwLock<()>,
}

impl SecureCache {
    pub const FILE_SUFFIX: &'static str = ".encrypted";

    pub fn new(config: SecureCacheConfig, keystore: Arc<dyn SecureKeystore>) -> Result<Self> {
        config.validate()?;

        let store = DiskStore::new(config.directory.clone(), Self::FILE_SUFFIX);
        let keys = KeyManager::new(keystore, config.service_id.clone(), config.account.clone());

        Ok(Self {
            config,
            store,
            keys,
            gate: RwLock::new(()),
        })
    }

    pub fn config(&self) -> &SecureCacheConfig {
        &self.config
    }

    /// Create the backing directory if it does not exist yet.
    pub async fn initialize(&self) -> Result<()> {
        self.store.ensure_directory().await
    }

    /// Encrypt `bytes` under the current key and write them for `key`.
    pub async fn store(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let _shared = self.gate.read().await;

        let encryptor = CacheEncryptor::new(&self.keys.get_or_create_key().await?);
        let blob = encryptor.encrypt(bytes)?;
        self.store.write(key, &blob).await
    }

    /// Read and authenticate the entry for `key`.
    ///
    /// Returns `Ok(None)` when no entry exists. Data that fails
    /// authentication is reported as [`CacheError::DecryptionFailed`].
    pub async fn retrieve(&self, key: &str) -> Result<Option<Bytes>> {
        Ok(self.retrieve_entry(key).await?.map(|entry| entry.value))
    }

    pub async fn retrieve_entry(&self, key: &str) -> Result<Option<CacheEntry<Bytes>>> {
        let _shared = self.gate.read().await;

        let Some(file) = self.store.read(key).await? else {
            return Ok(None);
        };

        let encryptor = CacheEncryptor::new(&self.keys.get_or_create_key().await?);
        match encryptor.decrypt(&file.bytes) {
            Ok(plaintext) => Ok(Some(CacheEntry::new(plaintext, file.modified))),
            Err(e) => {
                error!(
                    file = %self.file_name(key),
                    "Secure cache entry failed authentication"
                );
                Err(e)
            }
        }
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        let _shared = self.gate.read().await;
        self.store.remove(key).await?;
        Ok(())
    }

    /// Re-encrypt every entry under a newly generated key.
    ///
    /// Holds the store exclusively for the whole operation. Returns the
    /// number of entries rewritten. If any entry fails to decrypt under the
    /// current key nothing is changed and the error is returned. A failed
    /// rewrite after the key swap leaves the marker in place.
    #[instrument(skip(self), fields(directory = %self.config.directory.display()))]
    pub async fn rotate_encryption_key(&self) -> Result<usize> {
        let _exclusive = self.gate.write().await;

        let current = self.keys.get_or_create_key().await?;
        let old = CacheEncryptor::new(&current);

        // Buffer all plaintext before touching the keystore
        let files = self.store.list().await?;
        let mut plaintexts: Vec<(PathBuf, Bytes)> = Vec::with_capacity(files.len());
        for file in files {
            let Some(stored) = self.store.read_path(&file.path).await? else {
                continue;
            };
            let plaintext = old.decrypt(&stored.bytes).map_err(|e| {
                error!(
                    path = %file.path.display(),
                    "Entry does not authenticate under the current key; rotation aborted"
                );
                e
            })?;
            plaintexts.push((file.path, plaintext));
        }

        self.write_marker().await?;

        let replacement = EncryptionKey::generate();
        self.keys.replace_key(replacement.clone()).await?;
        info!(entries = plaintexts.len(), "Encryption key replaced; rewriting entries");

        // On failure the marker stays so the next open drops what is left
        self.rewrite_entries(&CacheEncryptor::new(&replacement), &plaintexts)
            .await?;

        self.clear_marker().await?;
        info!(entries = plaintexts.len(), "Encryption key rotation complete");

        Ok(plaintexts.len())
    }

    /// Write every entry under `encryptor`, continuing past failures.
    /// Returns the first error once all entries have been attempted.
    async fn rewrite_entries(
        &self,
        encryptor: &CacheEncryptor,
        plaintexts: &[(PathBuf, Bytes)],
    ) -> Result<()> {
        let mut first_error = None;
        for (path, plaintext) in plaintexts {
            let written = match encryptor.encrypt(plaintext) {
                Ok(blob) => self.store.write_path(path, &blob).await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                error!(path = %path.display(), error = %e, "Failed to rewrite entry under new key");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Finish a rotation interrupted after the key swap.
    ///
    /// Without a marker this is a no-op. Otherwise every entry that does not
    /// authenticate under the current key is deleted. Returns the number of
    /// entries dropped.
    #[instrument(skip(self))]
    pub async fn recover_incomplete_rotation(&self) -> Result<usize> {
        let _exclusive = self.gate.write().await;

        let marker = self.marker_path();
        if !tokio::fs::try_exists(&marker).await? {
            return Ok(0);
        }

        warn!("Found interrupted key rotation; dropping unreadable entries");

        let encryptor = CacheEncryptor::new(&self.keys.get_or_create_key().await?);
        let mut dropped = 0;
        for file in self.store.list().await? {
            let Some(stored) = self.store.read_path(&file.path).await? else {
                continue;
            };
            if encryptor.decrypt(&stored.bytes).is_err()
                && self.store.remove_path(&file.path).await?
            {
                dropped += 1;
            }
        }

        self.clear_marker().await?;
        info!(dropped, "Recovered from interrupted key rotation");

        Ok(dropped)
    }

    /// Delete every entry and the encryption key.
    ///
    /// Exclusive with all other operations, so no caller observes entries
    /// without a key or a key without entries.
    pub async fn clear_all(&self) -> Result<()> {
        let _exclusive = self.gate.write().await;

        self.store.clear().await?;
        self.keys.delete_key().await?;

        info!(directory = %self.config.directory.display(), "Secure cache cleared");
        Ok(())
    }

    /// Number of encrypted entries on disk.
    pub async fn len(&self) -> Result<usize> {
        let _shared = self.gate.read().await;
        Ok(self.store.list().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Path of the file backing `key`.
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.store.path_for(key)
    }

    fn file_name(&self, key: &str) -> String {
        crate::disk::entry_file_name(key, Self::FILE_SUFFIX)
    }

    fn marker_path(&self) -> PathBuf {
        self.store.directory().join(ROTATION_MARKER)
    }

    async fn write_marker(&self) -> Result<()> {
        self.store.ensure_directory().await?;
        let started_at = chrono::Utc::now().to_rfc3339();
        tokio::fs::write(self.marker_path(), started_at.as_bytes()).await?;
        debug!("Rotation marker written");
        Ok(())
    }

    async fn clear_marker(&self) -> Result<()> {
        match tokio::fs::remove_file(self.marker_path()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::Io(e)),
        }
    }
}

/// JSON values stored through the encrypted tier.
#[async_trait]
impl<V> CacheStore<V> for SecureCache
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get_entry(&self, key: &str) -> Result<Option<CacheEntry<V>>> {
        let Some(entry) = self.retrieve_entry(key).await? else {
            return Ok(None);
        };
        let value = serde_json::from_slice(&entry.value)?;
        Ok(Some(CacheEntry::new(value, entry.stored_at)))
    }

    async fn set(&self, key: &str, value: V) -> Result<()> {
        let bytes = serde_json::to_vec(&value)?;
        self.store(key, &bytes).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        SecureCache::remove(self, key).await
    }

    /// Removes entries and the key, like [`SecureCache::clear_all`].
    async fn clear(&self) -> Result<()> {
        self.clear_all().await
    }
}
