//! # Core Configuration Module
//!
//! Configuration for the offline-first cache engine.
//!
//! ## Overview
//!
//! A builder constructs a [`CoreConfig`] that holds the host capabilities the
//! engine needs plus the tuning knobs for each cache tier and for outbound
//! remote calls. Validation is fail-fast: a missing capability or a nonsensical
//! value is reported at `build()` time, not on the first cache read.
//!
//! ## Required Dependencies
//!
//! - `SecureKeystore` - Persists the secure cache's encryption key
//!
//! ## Optional Dependencies
//!
//! - `NetworkMonitor` - Drives automatic cache policy selection
//! - `Clock` - Time source for TTL checks (defaults to the system clock)
//!
//! When the `desktop-shims` feature is enabled, the OS keychain is used as the
//! keystore if none is injected.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .cache_dir("/data/user/0/app/cache/engine")
//!     .secure_keystore(Arc::new(MyKeystore))
//!     .network_monitor(Arc::new(MyMonitor))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{Clock, NetworkMonitor, SecureKeystore, SystemClock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_SERVICE_ID: &str = "com.foodshare.cache";
const DEFAULT_KEY_ACCOUNT: &str = "secure-cache-key";

/// Core configuration for the cache engine.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Root directory; each cache tier gets a subdirectory below it
    pub cache_dir: PathBuf,

    /// Tier sizing and expiry
    pub tiers: TierConfig,

    /// Throttling and retry for remote calls
    pub remote: RemoteCallConfig,

    /// Keystore service identifier for the encryption key
    pub keystore_service_id: String,

    /// Keystore account name for the encryption key
    pub keystore_account: String,

    /// Encryption key storage (required)
    pub secure_keystore: Arc<dyn SecureKeystore>,

    /// Network connectivity monitor (optional)
    pub network_monitor: Option<Arc<dyn NetworkMonitor>>,

    /// Time source for TTL checks
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("cache_dir", &self.cache_dir)
            .field("tiers", &self.tiers)
            .field("remote", &self.remote)
            .field("keystore_service_id", &self.keystore_service_id)
            .field("keystore_account", &self.keystore_account)
            .field("secure_keystore", &"SecureKeystore { ... }")
            .field(
                "network_monitor",
                &self
                    .network_monitor
                    .as_ref()
                    .map(|_| "NetworkMonitor { ... }"),
            )
            .finish()
    }
}

/// Sizing and expiry for the memory and disk tiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierConfig {
    /// Maximum number of entries held in memory
    pub memory_max_entries: usize,
    /// Maximum summed cost (bytes) of entries held in memory
    pub memory_max_cost_bytes: usize,
    /// Memory entry lifetime; `None` keeps entries until evicted
    pub memory_ttl: Option<Duration>,
    /// Disk entry lifetime measured from file modification time
    pub disk_ttl: Option<Duration>,
    /// Disk quota per cache directory; `None` disables the sweep
    pub disk_max_bytes: Option<u64>,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            memory_max_entries: 512,
            memory_max_cost_bytes: 16 * 1024 * 1024,
            memory_ttl: Some(Duration::from_secs(5 * 60)),
            disk_ttl: Some(Duration::from_secs(24 * 60 * 60)),
            disk_max_bytes: Some(100 * 1024 * 1024),
        }
    }
}

/// Throttling and retry settings applied to every remote fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCallConfig {
    /// Admitted calls per window
    pub max_requests: u32,
    /// Length of the trailing window
    pub window: Duration,
    /// Longest a caller may be held by the rate limiter before failing
    pub max_wait: Duration,
    /// Total attempts including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Ceiling for a single backoff delay
    pub max_delay: Option<Duration>,
    /// Symmetric jitter fraction in `[0.0, 1.0)`
    pub jitter: f64,
}

impl Default for RemoteCallConfig {
    fn default() -> Self {
        Self {
            max_requests: 30,
            window: Duration::from_secs(60),
            max_wait: Duration::from_secs(30),
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Some(Duration::from_secs(10)),
            jitter: 0.1,
        }
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Directory for the plain disk cache named `name`
    pub fn disk_cache_dir(&self, name: &str) -> PathBuf {
        self.cache_dir.join("disk").join(name)
    }

    /// Directory for encrypted entries
    pub fn secure_cache_dir(&self) -> PathBuf {
        self.cache_dir.join("secure")
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.cache_dir.as_os_str().is_empty() {
            return Err(Error::Config("Cache directory cannot be empty".to_string()));
        }

        if self.tiers.memory_max_entries == 0 {
            return Err(Error::Config(
                "Memory cache must allow at least one entry".to_string(),
            ));
        }

        if self.tiers.memory_max_cost_bytes == 0 {
            return Err(Error::Config(
                "Memory cache cost budget must be greater than 0 bytes".to_string(),
            ));
        }

        if self.tiers.disk_max_bytes == Some(0) {
            return Err(Error::Config(
                "Disk quota must be greater than 0 bytes; use None to disable it".to_string(),
            ));
        }

        if self.remote.max_attempts == 0 {
            return Err(Error::Config(
                "Retry policy needs at least one attempt".to_string(),
            ));
        }

        if self.remote.window.is_zero() {
            return Err(Error::Config(
                "Rate limit window must be longer than zero".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&self.remote.jitter) {
            return Err(Error::Config(format!(
                "Retry jitter must be in [0.0, 1.0), got {}",
                self.remote.jitter
            )));
        }

        if self.keystore_service_id.is_empty() || self.keystore_account.is_empty() {
            return Err(Error::Config(
                "Keystore service id and account cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn keystore_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "SecureKeystore".to_string(),
        message: "SecureKeystore implementation is required for the secure cache key. \
                 Desktop: enable the 'desktop-shims' feature to use the default KeyringKeystore. \
                 Mobile: inject platform-native secure storage (Keychain/Keystore)."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_keystore() -> Result<Arc<dyn SecureKeystore>> {
    use bridge_desktop::KeyringKeystore;

    let keystore: Arc<dyn SecureKeystore> = Arc::new(KeyringKeystore::new());
    Ok(keystore)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_keystore() -> Result<Arc<dyn SecureKeystore>> {
    Err(keystore_missing_error())
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    cache_dir: Option<PathBuf>,
    tiers: TierConfig,
    remote: RemoteCallConfig,
    keystore_service_id: Option<String>,
    keystore_account: Option<String>,
    secure_keystore: Option<Arc<dyn SecureKeystore>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    clock: Option<Arc<dyn Clock>>,
}

impl CoreConfigBuilder {
    /// Sets the root cache directory (required).
    pub fn cache_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.cache_dir = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn tiers(mut self, tiers: TierConfig) -> Self {
        self.tiers = tiers;
        self
    }

    pub fn memory_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.tiers.memory_ttl = ttl;
        self
    }

    pub fn disk_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.tiers.disk_ttl = ttl;
        self
    }

    pub fn remote(mut self, remote: RemoteCallConfig) -> Self {
        self.remote = remote;
        self
    }

    /// Overrides the keystore location of the encryption key.
    pub fn keystore_identity(
        mut self,
        service_id: impl Into<String>,
        account: impl Into<String>,
    ) -> Self {
        self.keystore_service_id = Some(service_id.into());
        self.keystore_account = Some(account.into());
        self
    }

    pub fn secure_keystore(mut self, keystore: Arc<dyn SecureKeystore>) -> Self {
        self.secure_keystore = Some(keystore);
        self
    }

    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// Fails if the cache directory is missing, if no keystore is available,
    /// or if any tuning value is out of range.
    pub fn build(self) -> Result<CoreConfig> {
        let cache_dir = self.cache_dir.ok_or_else(|| {
            Error::Config("Cache directory is required. Use .cache_dir() to set it.".to_string())
        })?;

        let secure_keystore = match self.secure_keystore {
            Some(keystore) => keystore,
            None => provide_default_keystore()?,
        };

        let config = CoreConfig {
            cache_dir,
            tiers: self.tiers,
            remote: self.remote,
            keystore_service_id: self
                .keystore_service_id
                .unwrap_or_else(|| DEFAULT_SERVICE_ID.to_string()),
            keystore_account: self
                .keystore_account
                .unwrap_or_else(|| DEFAULT_KEY_ACCOUNT.to_string()),
            secure_keystore,
            network_monitor: self.network_monitor,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };

        config.validate()?;

        Ok(config)
    }
}
