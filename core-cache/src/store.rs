//! The contract shared by every cache tier

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;

/// A cached value together with the instant it was written.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    pub value: V,
    pub stored_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
    pub fn new(value: V, stored_at: DateTime<Utc>) -> Self {
        Self { value, stored_at }
    }

    /// Time elapsed since the entry was written, clamped at zero.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.stored_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// An entry is logically absent once `now - stored_at > ttl`.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Option<Duration>) -> bool {
        is_past_ttl(self.stored_at, now, ttl)
    }
}

pub(crate) fn is_past_ttl(
    stored_at: DateTime<Utc>,
    now: DateTime<Utc>,
    ttl: Option<Duration>,
) -> bool {
    let Some(ttl) = ttl else {
        return false;
    };
    // A TTL too large for chrono never elapses
    match ChronoDuration::from_std(ttl) {
        Ok(ttl) => now.signed_duration_since(stored_at) > ttl,
        Err(_) => false,
    }
}

/// Key/value cache tier.
///
/// Keys are opaque strings composed by the caller. Each implementation owns
/// its own exclusive-access boundary, so concurrent callers never observe a
/// partial write.
#[async_trait]
pub trait CacheStore<V>: Send + Sync
where
    V: Send + 'static,
{
    /// Returns the live entry for `key`, dropping it first if it has expired.
    async fn get_entry(&self, key: &str) -> Result<Option<CacheEntry<V>>>;

    async fn get(&self, key: &str) -> Result<Option<V>> {
        Ok(self.get_entry(key).await?.map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: V) -> Result<()>;

    /// Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;

    /// Entry lifetime enforced by this tier, if any.
    fn ttl(&self) -> Option<Duration> {
        None
    }
}
