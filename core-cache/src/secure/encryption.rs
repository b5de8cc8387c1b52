//! Authenticated encryption for secure cache entries

use crate::error::{CacheError, Result};
use aes_gcm::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use bytes::Bytes;
use std::fmt;

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;
/// GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;
/// GCM authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Symmetric key protecting the secure tier.
///
/// Never serialized and never logged; `Debug` is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey {
    key_bytes: [u8; KEY_LEN],
}

impl EncryptionKey {
    /// Generate a new random encryption key.
    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(&mut OsRng);
        let mut key_bytes = [0u8; KEY_LEN];
        key_bytes.copy_from_slice(key.as_slice());
        Self { key_bytes }
    }

    /// Create from existing key bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let key_bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            CacheError::KeyNotFound(format!(
                "Invalid key length {}. Expected {} bytes for AES-256.",
                bytes.len(),
                KEY_LEN
            ))
        })?;

        Ok(Self { key_bytes })
    }

    /// Get the key bytes (for the keystore only).
    pub fn as_bytes(&self) -> &[u8] {
        &self.key_bytes
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("key_bytes", &"[REDACTED]")
            .finish()
    }
}

/// Entry encryptor using AES-256-GCM.
///
/// Output layout is `nonce(12) || ciphertext || tag(16)` with no header.
pub struct CacheEncryptor {
    cipher: Aes256Gcm,
}

impl CacheEncryptor {
    pub fn new(key: &EncryptionKey) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(&key.key_bytes);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// Encrypt with a fresh random nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Bytes> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        // aes-gcm appends the tag to the ciphertext
        let sealed = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| CacheError::EncryptionFailed(e.to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + sealed.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&sealed);

        Ok(Bytes::from(blob))
    }

    /// Split and authenticate a stored blob.
    ///
    /// Truncated, tampered, or foreign-key data fails with
    /// [`CacheError::DecryptionFailed`].
    pub fn decrypt(&self, blob: &[u8]) -> Result<Bytes> {
        if blob.len() < NONCE_LEN + TAG_LEN {
            return Err(CacheError::DecryptionFailed(format!(
                "blob too short: {} bytes",
                blob.len()
            )));
        }

        let (nonce_bytes, sealed) = blob.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self.cipher.decrypt(nonce, sealed).map_err(|_| {
            CacheError::DecryptionFailed("authentication tag mismatch".to_string())
        })?;

        Ok(Bytes::from(plaintext))
    }
}
