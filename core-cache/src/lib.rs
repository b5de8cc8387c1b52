//! # Offline-First Cache Engine
//!
//! Multi-tier caching and sync coordination for the marketplace client.
//!
//! ## Overview
//!
//! - **Memory tier** ([`MemoryCache`]): process-lifetime LRU bounded by entry
//!   count and byte cost, with lazy TTL expiry.
//! - **Disk tier** ([`DiskCache`]): one JSON file per key, atomic writes, TTL
//!   from file modification time, optional quota sweep.
//! - **Secure tier** ([`SecureCache`]): AES-256-GCM over the disk layout with
//!   a keystore-held key and crash-tolerant key rotation.
//! - **Remote call guards** ([`RateLimiter`], [`RetryPolicy`]): sliding-window
//!   admission and exponential backoff, both cancellable.
//! - **[`Paginator`]**: allow-listed cursor pagination.
//! - **[`Orchestrator`]**: runs a fetch under a [`CachePolicy`] and reports
//!   whether the data is fresh, cached, or absent.
//!
//! [`CacheEngine`] wires all of the above from a `core_runtime::CoreConfig`.
//!
//! ## Usage
//!
//! ```ignore
//! let engine = CacheEngine::open(&config).await?;
//! let feed = Arc::new(engine.disk_cache::<Vec<Listing>>("feed")?);
//!
//! let source = StoreBackedSource::new(feed, "nearby:51.5,-0.12", |cancel| {
//!     let api = api.clone();
//!     async move { api.nearby(&cancel).await }
//! });
//!
//! match engine.orchestrator().fetch_auto(&source, &cancel).await? {
//!     OfflineDataResult::Fresh(items) => render(items),
//!     OfflineDataResult::Cached(items, synced_at) => render_stale(items, synced_at),
//!     OfflineDataResult::Empty => render_empty(),
//! }
//! ```

pub mod config;
pub mod disk;
pub mod engine;
pub mod error;
pub mod memory;
pub mod orchestrator;
pub mod pagination;
pub mod policy;
pub mod rate_limiter;
pub mod retry;
pub mod secure;
pub mod stats;
pub mod store;

pub use config::{DiskCacheConfig, MemoryCacheConfig, RateLimitConfig, SecureCacheConfig};
pub use disk::{entry_file_name, DiskCache};
pub use engine::CacheEngine;
pub use error::{CacheError, Cancelled, ErrorCategory, Result};
pub use memory::{MemoryCache, Weigher};
pub use orchestrator::{
    FetchStrategy, LocalSnapshot, OfflineDataResult, Orchestrator, StoreBackedSource,
};
pub use pagination::{
    CursorDirection, CursorValue, Page, PaginationCursor, Paginator, SqlFragment,
    DEFAULT_SORT_COLUMNS,
};
pub use policy::{CachePolicy, CachePolicySelector};
pub use rate_limiter::RateLimiter;
pub use retry::{with_retry, RetryPolicy};
pub use secure::{CacheEncryptor, EncryptionKey, KeyManager, SecureCache, ROTATION_MARKER};
pub use stats::CacheStats;
pub use store::{CacheEntry, CacheStore};

/// Re-exported so callers can cancel fetches without a direct dependency.
pub use tokio_util::sync::CancellationToken;
