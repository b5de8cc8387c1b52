//! Per-tier cache configuration

use crate::error::{CacheError, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the in-process memory tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryCacheConfig {
    /// Maximum number of live entries (default: 512)
    pub max_entries: usize,

    /// Maximum summed entry cost in bytes (default: 16MB)
    pub max_cost_bytes: usize,

    /// Entry lifetime; `None` keeps entries until evicted or removed
    pub ttl: Option<Duration>,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 512,
            max_cost_bytes: 16 * 1024 * 1024, // 16MB
            ttl: Some(Duration::from_secs(5 * 60)),
        }
    }
}

impl MemoryCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_max_cost_bytes(mut self, bytes: usize) -> Self {
        self.max_cost_bytes = bytes;
        self
    }

    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(CacheError::InvalidArgument(
                "max_entries must be at least 1".to_string(),
            ));
        }

        if self.max_cost_bytes == 0 {
            return Err(CacheError::InvalidArgument(
                "max_cost_bytes must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration for a file-backed cache directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskCacheConfig {
    /// Directory holding one file per entry
    pub directory: PathBuf,

    /// Entry lifetime measured from file modification time
    pub ttl: Option<Duration>,

    /// Quota for the directory; oldest entries are swept once exceeded
    pub max_bytes: Option<u64>,
}

impl DiskCacheConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ttl: Some(Duration::from_secs(24 * 60 * 60)),
            max_bytes: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: Option<u64>) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.directory.as_os_str().is_empty() {
            return Err(CacheError::InvalidArgument(
                "directory cannot be empty".to_string(),
            ));
        }

        if self.max_bytes == Some(0) {
            return Err(CacheError::InvalidArgument(
                "max_bytes must be greater than 0; use None to disable the quota".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration for the encrypted tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureCacheConfig {
    /// Directory holding `.encrypted` entry files
    pub directory: PathBuf,

    /// Keystore service identifier for the encryption key
    pub service_id: String,

    /// Keystore account for the encryption key
    pub account: String,
}

impl SecureCacheConfig {
    pub fn new(
        directory: impl Into<PathBuf>,
        service_id: impl Into<String>,
        account: impl Into<String>,
    ) -> Self {
        Self {
            directory: directory.into(),
            service_id: service_id.into(),
            account: account.into(),
        }
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.directory.as_os_str().is_empty() {
            return Err(CacheError::InvalidArgument(
                "directory cannot be empty".to_string(),
            ));
        }

        if self.service_id.is_empty() || self.account.is_empty() {
            return Err(CacheError::InvalidArgument(
                "keystore service_id and account cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Sliding-window admission settings for remote calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Calls admitted per window (default: 30)
    pub max_requests: u32,

    /// Trailing window length (default: 60s)
    pub window: Duration,

    /// Longest a caller may wait for capacity (default: 30s)
    pub max_wait: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 30,
            window: Duration::from_secs(60),
            max_wait: Duration::from_secs(30),
        }
    }
}

impl RateLimitConfig {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            ..Self::default()
        }
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Validate configuration.
    ///
    /// `max_requests == 0` is accepted here; the limiter rejects every call
    /// under such a configuration instead of waiting forever.
    pub fn validate(&self) -> Result<()> {
        if self.window.is_zero() {
            return Err(CacheError::InvalidArgument(
                "window must be longer than zero".to_string(),
            ));
        }

        Ok(())
    }
}

impl From<&core_runtime::TierConfig> for MemoryCacheConfig {
    fn from(tiers: &core_runtime::TierConfig) -> Self {
        Self {
            max_entries: tiers.memory_max_entries,
            max_cost_bytes: tiers.memory_max_cost_bytes,
            ttl: tiers.memory_ttl,
        }
    }
}

impl From<&core_runtime::RemoteCallConfig> for RateLimitConfig {
    fn from(remote: &core_runtime::RemoteCallConfig) -> Self {
        Self {
            max_requests: remote.max_requests,
            window: remote.window,
            max_wait: remote.max_wait,
        }
    }
}
