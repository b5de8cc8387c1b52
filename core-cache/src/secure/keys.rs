//! Encryption key lifecycle
//!
//! The key lives in the platform keystore and is cached in memory after the
//! first lookup. It never touches the cache directories.

use super::encryption::EncryptionKey;
use crate::error::Result;
use bridge_traits::SecureKeystore;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub struct KeyManager {
    keystore: Arc<dyn SecureKeystore>,
    service_id: String,
    account: String,
    // Held across keystore calls so concurrent first use creates one key
    cached: Mutex<Option<EncryptionKey>>,
}

impl KeyManager {
    pub fn new(
        keystore: Arc<dyn SecureKeystore>,
        service_id: impl Into<String>,
        account: impl Into<String>,
    ) -> Self {
        Self {
            keystore,
            service_id: service_id.into(),
            account: account.into(),
            cached: Mutex::new(None),
        }
    }

    /// Return the cached key, else the keystore's, else a newly generated one.
    ///
    /// A generated key is persisted before it is returned, so no entry is
    /// ever written under a key the keystore does not hold.
    pub async fn get_or_create_key(&self) -> Result<EncryptionKey> {
        let mut cached = self.cached.lock().await;
        if let Some(key) = cached.as_ref() {
            return Ok(key.clone());
        }

        let key = match self.keystore.load(&self.service_id, &self.account).await? {
            Some(bytes) => {
                debug!(service_id = %self.service_id, "Loaded encryption key from keystore");
                EncryptionKey::from_bytes(&bytes)?
            }
            None => {
                let key = EncryptionKey::generate();
                self.keystore
                    .store(&self.service_id, &self.account, key.as_bytes())
                    .await?;
                info!(service_id = %self.service_id, "Generated new encryption key");
                key
            }
        };

        *cached = Some(key.clone());
        Ok(key)
    }

    /// Persist `key` over the current one, then make it the cached key.
    pub async fn replace_key(&self, key: EncryptionKey) -> Result<()> {
        let mut cached = self.cached.lock().await;
        self.keystore
            .store(&self.service_id, &self.account, key.as_bytes())
            .await?;
        *cached = Some(key);
        Ok(())
    }

    /// Remove the key from the keystore and from memory.
    pub async fn delete_key(&self) -> Result<()> {
        let mut cached = self.cached.lock().await;
        self.keystore.delete(&self.service_id, &self.account).await?;
        *cached = None;
        Ok(())
    }
}
