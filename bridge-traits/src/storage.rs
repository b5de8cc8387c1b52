//! Secure Keystore Abstraction
//!
//! Provides the platform contract for persisting small secrets (encryption
//! keys) outside of the plaintext cache.

use async_trait::async_trait;

use crate::error::Result;

/// Platform secure keystore
///
/// Abstracts the host's secret storage:
/// - macOS/iOS: Keychain
/// - Android: Keystore (hardware-backed when available)
/// - Windows: Credential Manager (DPAPI)
/// - Linux: Secret Service / libsecret
///
/// Secrets are addressed by a `(service_id, account)` pair. The cache engine
/// uses this exclusively for its symmetric encryption key, never for cached
/// payloads.
///
/// # Security Requirements
///
/// Implementations MUST:
/// - Encrypt data at rest
/// - Overwrite the previous value on `store`
/// - Never log or expose secret bytes
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SecureKeystore;
///
/// async fn save_key(keystore: &dyn SecureKeystore, key: &[u8]) -> Result<()> {
///     keystore.store("com.foodshare.cache", "cache-key", key).await
/// }
/// ```
#[async_trait]
pub trait SecureKeystore: Send + Sync {
    /// Store a secret, replacing any existing value for the same pair.
    async fn store(&self, service_id: &str, account: &str, bytes: &[u8]) -> Result<()>;

    /// Load a secret.
    ///
    /// Returns `Ok(None)` if nothing is stored for the pair.
    async fn load(&self, service_id: &str, account: &str) -> Result<Option<Vec<u8>>>;

    /// Delete a secret. Deleting a missing secret succeeds.
    async fn delete(&self, service_id: &str, account: &str) -> Result<()>;

    /// Check if a secret exists without handing out its bytes
    async fn contains(&self, service_id: &str, account: &str) -> Result<bool> {
        Ok(self.load(service_id, account).await?.is_some())
    }
}

/// Process-local keystore backed by a map.
///
/// Holds secrets only for the lifetime of the process. Intended for tests and
/// for hosts without a platform keychain (headless CI).
#[derive(Debug, Default)]
pub struct InMemoryKeystore {
    secrets: parking_lot::Mutex<std::collections::HashMap<(String, String), Vec<u8>>>,
}

impl InMemoryKeystore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of secrets currently held
    pub fn len(&self) -> usize {
        self.secrets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.lock().is_empty()
    }
}

#[async_trait]
impl SecureKeystore for InMemoryKeystore {
    async fn store(&self, service_id: &str, account: &str, bytes: &[u8]) -> Result<()> {
        self.secrets
            .lock()
            .insert((service_id.to_string(), account.to_string()), bytes.to_vec());
        Ok(())
    }

    async fn load(&self, service_id: &str, account: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .secrets
            .lock()
            .get(&(service_id.to_string(), account.to_string()))
            .cloned())
    }

    async fn delete(&self, service_id: &str, account: &str) -> Result<()> {
        self.secrets
            .lock()
            .remove(&(service_id.to_string(), account.to_string()));
        Ok(())
    }
}
