//! Secure Key Storage using OS Keychain

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SecureKeystore,
};
use keyring::Entry;
use tracing::{debug, error};

/// Keyring-based keystore implementation
///
/// Uses platform-specific secure storage:
/// - macOS: Keychain
/// - Windows: Credential Manager (DPAPI)
/// - Linux: Secret Service (libsecret)
///
/// `service_id`/`account` map directly onto the keyring's service and user
/// fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyringKeystore;

impl KeyringKeystore {
    pub fn new() -> Self {
        Self
    }

    fn entry(service_id: &str, account: &str) -> Result<Entry> {
        Entry::new(service_id, account).map_err(Self::map_keyring_error)
    }

    fn map_keyring_error(e: keyring::Error) -> BridgeError {
        BridgeError::Keystore(format!("Keyring error: {}", e))
    }
}

#[async_trait]
impl SecureKeystore for KeyringKeystore {
    async fn store(&self, service_id: &str, account: &str, bytes: &[u8]) -> Result<()> {
        // Keyring only supports strings, so binary secrets are base64 encoded
        let encoded = base64::encode(bytes);

        Self::entry(service_id, account)?
            .set_password(&encoded)
            .map_err(Self::map_keyring_error)?;

        debug!(service_id, account, "Stored secret in keyring");
        Ok(())
    }

    async fn load(&self, service_id: &str, account: &str) -> Result<Option<Vec<u8>>> {
        match Self::entry(service_id, account)?.get_password() {
            Ok(encoded) => {
                let decoded = base64::decode(&encoded).map_err(|e| {
                    error!(service_id, account, error = %e, "Failed to decode secret");
                    BridgeError::Keystore(format!("Failed to decode secret: {}", e))
                })?;

                debug!(service_id, account, "Loaded secret from keyring");
                Ok(Some(decoded))
            }
            Err(keyring::Error::NoEntry) => {
                debug!(service_id, account, "Secret not found in keyring");
                Ok(None)
            }
            Err(e) => Err(Self::map_keyring_error(e)),
        }
    }

    async fn delete(&self, service_id: &str, account: &str) -> Result<()> {
        match Self::entry(service_id, account)?.delete_credential() {
            Ok(()) => {
                debug!(service_id, account, "Deleted secret from keyring");
                Ok(())
            }
            // Already gone
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(Self::map_keyring_error(e)),
        }
    }

    async fn contains(&self, service_id: &str, account: &str) -> Result<bool> {
        match Self::entry(service_id, account)?.get_password() {
            Ok(_) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(Self::map_keyring_error(e)),
        }
    }
}

mod base64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    pub fn encode(data: &[u8]) -> String {
        STANDARD.encode(data)
    }

    pub fn decode(data: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(data)
    }
}
