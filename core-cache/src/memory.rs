//! In-process memory tier
//!
//! Entries live for the process lifetime, bounded by an entry count and a
//! byte-cost budget. Least recently used entries are evicted first. Expiry is
//! lazy: an expired entry is dropped on the lookup that finds it, never by a
//! background timer.

use crate::config::MemoryCacheConfig;
use crate::disk::entry_file_name;
use crate::error::Result;
use crate::stats::CacheStats;
use crate::store::{CacheEntry, CacheStore};
use async_trait::async_trait;
use bridge_traits::{Clock, SystemClock};
use lru::LruCache;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};

/// Computes the cost in bytes charged against the memory budget.
pub type Weigher<V> = Arc<dyn Fn(&str, &V) -> usize + Send + Sync>;

struct Slot<V> {
    entry: CacheEntry<V>,
    cost: usize,
}

struct Inner<V> {
    entries: LruCache<String, Slot<V>>,
    cost_bytes: usize,
    hits: u64,
    misses: u64,
    expirations: u64,
    evictions: u64,
}

impl<V> Inner<V> {
    fn take(&mut self, key: &str) -> Option<Slot<V>> {
        let slot = self.entries.pop(key)?;
        self.cost_bytes -= slot.cost;
        Some(slot)
    }
}

/// Memory cache tier.
///
/// All operations take one short lock and never suspend.
pub struct MemoryCache<V> {
    config: MemoryCacheConfig,
    inner: Mutex<Inner<V>>,
    weigher: Weigher<V>,
    clock: Arc<dyn Clock>,
}

impl<V> MemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a memory tier charging each entry its key length plus the
    /// inline size of `V`. Use [`MemoryCache::with_weigher`] for values
    /// that own heap data.
    pub fn new(config: MemoryCacheConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                cost_bytes: 0,
                hits: 0,
                misses: 0,
                expirations: 0,
                evictions: 0,
            }),
            weigher: Arc::new(|key: &str, _: &V| key.len() + std::mem::size_of::<V>()),
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_weigher(
        mut self,
        weigher: impl Fn(&str, &V) -> usize + Send + Sync + 'static,
    ) -> Self {
        self.weigher = Arc::new(weigher);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &MemoryCacheConfig {
        &self.config
    }

    pub fn get_entry(&self, key: &str) -> Option<CacheEntry<V>> {
        let now = self.clock.now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let expired = match inner.entries.peek(key) {
            Some(slot) => slot.entry.is_expired(now, self.config.ttl),
            None => {
                inner.misses += 1;
                trace!(key = %entry_file_name(key, ""), "Memory cache miss");
                return None;
            }
        };

        if expired {
            inner.take(key);
            inner.expirations += 1;
            inner.misses += 1;
            debug!(key = %entry_file_name(key, ""), "Memory cache entry expired");
            return None;
        }

        inner.hits += 1;
        inner.entries.get(key).map(|slot| slot.entry.clone())
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.get_entry(key).map(|entry| entry.value)
    }

    /// Insert or replace `key`.
    ///
    /// A value whose cost alone exceeds the budget is not cached, and any
    /// previous value for the key is dropped.
    pub fn set(&self, key: &str, value: V) {
        let cost = (self.weigher)(key, &value);
        let entry = CacheEntry::new(value, self.clock.now());
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        inner.take(key);

        if cost > self.config.max_cost_bytes {
            debug!(
                key = %entry_file_name(key, ""),
                cost,
                max_cost_bytes = self.config.max_cost_bytes,
                "Value exceeds memory budget; not cached"
            );
            return;
        }

        inner.cost_bytes += cost;
        inner.entries.put(key.to_string(), Slot { entry, cost });

        while inner.entries.len() > self.config.max_entries
            || inner.cost_bytes > self.config.max_cost_bytes
        {
            let Some((evicted, slot)) = inner.entries.pop_lru() else {
                break;
            };
            inner.cost_bytes -= slot.cost;
            inner.evictions += 1;
            trace!(key = %entry_file_name(&evicted, ""), cost = slot.cost, "Evicted from memory cache");
        }
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.inner.lock().take(key).map(|slot| slot.entry.value)
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        let dropped = inner.entries.len();
        inner.entries.clear();
        inner.cost_bytes = 0;
        info!(dropped, "Memory cache cleared");
    }

    /// Number of stored entries, including expired ones not yet accessed.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            expirations: inner.expirations,
            evictions: inner.evictions,
            entries: inner.entries.len(),
            cost_bytes: inner.cost_bytes,
        }
    }
}

#[async_trait]
impl<V> CacheStore<V> for MemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get_entry(&self, key: &str) -> Result<Option<CacheEntry<V>>> {
        Ok(MemoryCache::get_entry(self, key))
    }

    async fn set(&self, key: &str, value: V) -> Result<()> {
        MemoryCache::set(self, key, value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        MemoryCache::remove(self, key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        MemoryCache::clear(self);
        Ok(())
    }

    fn ttl(&self) -> Option<Duration> {
        self.config.ttl
    }
}
