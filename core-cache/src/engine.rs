//! Engine assembly
//!
//! [`CacheEngine`] is built once from a [`CoreConfig`] and handed to the
//! feature repositories that need it. It owns the secure tier, the shared
//! rate limiter and the orchestrator, and creates memory and disk tiers on
//! demand so unrelated caches never share a lock.

use crate::config::{DiskCacheConfig, MemoryCacheConfig, RateLimitConfig, SecureCacheConfig};
use crate::disk::{DiskCache, DiskStore};
use crate::error::Result;
use crate::memory::MemoryCache;
use crate::orchestrator::Orchestrator;
use crate::rate_limiter::RateLimiter;
use crate::retry::RetryPolicy;
use crate::secure::SecureCache;
use bridge_traits::Clock;
use core_runtime::CoreConfig;
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

pub struct CacheEngine {
    config: CoreConfig,
    clock: Arc<dyn Clock>,
    secure: Arc<SecureCache>,
    rate_limiter: Arc<RateLimiter>,
    orchestrator: Arc<Orchestrator>,
    // One store per disk cache name, shared by every handle for that name
    disk_stores: Mutex<HashMap<String, Arc<DiskStore>>>,
}

impl CacheEngine {
    /// Wire every component from `config` without touching the file system.
    pub fn from_config(config: &CoreConfig) -> Result<Self> {
        config.validate()?;

        let secure = SecureCache::new(
            SecureCacheConfig::new(
                config.secure_cache_dir(),
                config.keystore_service_id.clone(),
                config.keystore_account.clone(),
            ),
            config.secure_keystore.clone(),
        )?;

        let rate_limiter = Arc::new(RateLimiter::new(RateLimitConfig::from(&config.remote))?);

        let retry = RetryPolicy::from(&config.remote);
        retry.validate()?;

        let mut orchestrator = Orchestrator::new()
            .with_rate_limiter(rate_limiter.clone())
            .with_retry_policy(retry);
        if let Some(monitor) = &config.network_monitor {
            orchestrator = orchestrator.with_network_monitor(monitor.clone());
        }

        Ok(Self {
            config: config.clone(),
            clock: config.clock.clone(),
            secure: Arc::new(secure),
            rate_limiter,
            orchestrator: Arc::new(orchestrator),
            disk_stores: Mutex::new(HashMap::new()),
        })
    }

    /// Build the engine, create its directories and finish any key rotation
    /// a previous process left incomplete.
    pub async fn open(config: &CoreConfig) -> Result<Self> {
        let engine = Self::from_config(config)?;

        tokio::fs::create_dir_all(&engine.config.cache_dir).await?;
        engine.secure.initialize().await?;

        let dropped = engine.secure.recover_incomplete_rotation().await?;
        if dropped > 0 {
            warn!(dropped, "Dropped secure entries left by an interrupted rotation");
        }

        info!(
            cache_dir = %engine.config.cache_dir.display(),
            network_monitor = engine.config.network_monitor.is_some(),
            "Cache engine ready"
        );
        Ok(engine)
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// New memory tier using the configured sizing and TTL.
    ///
    /// Entries are charged their key length plus `size_of::<V>()`, which
    /// ignores heap data. Values such as `Vec<T>` or `String` should use
    /// [`CacheEngine::memory_cache_weighed`] so the byte budget holds.
    pub fn memory_cache<V>(&self) -> Result<MemoryCache<V>>
    where
        V: Clone + Send + Sync + 'static,
    {
        Ok(MemoryCache::new(MemoryCacheConfig::from(&self.config.tiers))?
            .with_clock(self.clock.clone()))
    }

    /// Memory tier charging each entry what `weigher` reports.
    pub fn memory_cache_weighed<V>(
        &self,
        weigher: impl Fn(&str, &V) -> usize + Send + Sync + 'static,
    ) -> Result<MemoryCache<V>>
    where
        V: Clone + Send + Sync + 'static,
    {
        Ok(self.memory_cache()?.with_weigher(weigher))
    }

    /// Disk tier stored under `<cache_dir>/disk/<name>`.
    ///
    /// Handles returned for the same `name` share one store, so their
    /// operations are serialized against each other.
    pub fn disk_cache<V>(&self, name: &str) -> Result<DiskCache<V>>
    where
        V: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let config = DiskCacheConfig::new(self.config.disk_cache_dir(name))
            .with_ttl(self.config.tiers.disk_ttl)
            .with_max_bytes(self.config.tiers.disk_max_bytes);
        config.validate()?;

        let store = self
            .disk_stores
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(DiskStore::new(
                    config.directory.clone(),
                    DiskCache::<V>::FILE_SUFFIX,
                ))
            })
            .clone();

        Ok(DiskCache::with_store(config, store).with_clock(self.clock.clone()))
    }

    pub fn secure_cache(&self) -> Arc<SecureCache> {
        self.secure.clone()
    }

    pub fn rate_limiter(&self) -> Arc<RateLimiter> {
        self.rate_limiter.clone()
    }

    pub fn orchestrator(&self) -> Arc<Orchestrator> {
        self.orchestrator.clone()
    }
}
