//! End-to-end fetches through the orchestrator over real cache tiers.

use async_trait::async_trait;
use bridge_traits::{InMemoryKeystore, NetworkInfo, NetworkMonitor, NetworkType};
use core_cache::{
    CacheError, CachePolicy, CacheStore, CancellationToken, DiskCache, DiskCacheConfig,
    MemoryCache, MemoryCacheConfig, OfflineDataResult, Orchestrator, RateLimitConfig,
    RateLimiter, Result, RetryPolicy, SecureCache, SecureCacheConfig, StoreBackedSource,
};
use futures::future::{ready, Ready};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct FixedNetwork(NetworkInfo);

#[async_trait]
impl NetworkMonitor for FixedNetwork {
    async fn get_network_info(&self) -> bridge_traits::error::Result<NetworkInfo> {
        Ok(self.0.clone())
    }
}

fn names(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

fn memory_feed() -> Arc<MemoryCache<Vec<String>>> {
    Arc::new(MemoryCache::new(MemoryCacheConfig::default()).unwrap())
}

/// Remote closure that counts its calls and answers with `outcome`.
fn remote<O>(
    calls: Arc<AtomicUsize>,
    outcome: O,
) -> impl Fn(CancellationToken) -> Ready<Result<Vec<String>>> + Send + Sync
where
    O: Fn() -> Result<Vec<String>> + Send + Sync,
{
    move |_cancel| {
        calls.fetch_add(1, Ordering::SeqCst);
        ready(outcome())
    }
}

fn no_retry() -> Orchestrator {
    Orchestrator::new().with_retry_policy(RetryPolicy::no_retry())
}

#[tokio::test]
async fn offline_with_empty_cache_is_empty() {
    let calls = Arc::new(AtomicUsize::new(0));
    let source = StoreBackedSource::new(
        memory_feed(),
        "feed:nearby",
        remote(calls.clone(), || Ok(names(&["X"]))),
    );
    let orchestrator =
        no_retry().with_network_monitor(Arc::new(FixedNetwork(NetworkInfo::offline())));

    assert_eq!(orchestrator.current_policy().await, CachePolicy::CacheOnly);

    let result: OfflineDataResult<String> = orchestrator
        .fetch_auto(&source, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result, OfflineDataResult::Empty);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cache_first_serves_cached_items_without_remote() {
    let feed = memory_feed();
    CacheStore::set(&*feed, "feed:nearby", names(&["A", "B"]))
        .await
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let source = StoreBackedSource::new(
        feed,
        "feed:nearby",
        remote(calls.clone(), || Ok(names(&["X"]))),
    );

    let result: OfflineDataResult<String> = no_retry()
        .fetch(CachePolicy::CacheFirst, &source, &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.is_cached());
    assert_eq!(result.items(), names(&["A", "B"]).as_slice());
    assert!(result.last_synced_at().is_some());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cache_first_goes_remote_on_miss() {
    let feed = memory_feed();
    let calls = Arc::new(AtomicUsize::new(0));
    let source = StoreBackedSource::new(
        feed.clone(),
        "feed:nearby",
        remote(calls.clone(), || Ok(names(&["X"]))),
    );

    let result: OfflineDataResult<String> = no_retry()
        .fetch(CachePolicy::CacheFirst, &source, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result, OfflineDataResult::Fresh(names(&["X"])));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        CacheStore::get(&*feed, "feed:nearby").await.unwrap(),
        Some(names(&["X"]))
    );
}

#[tokio::test]
async fn fallback_refreshes_cache_for_later_offline_reads() {
    let dir = TempDir::new().unwrap();
    let feed: Arc<DiskCache<Vec<String>>> =
        Arc::new(DiskCache::new(DiskCacheConfig::new(dir.path().join("feed"))).unwrap());
    let calls = Arc::new(AtomicUsize::new(0));
    let source = StoreBackedSource::new(
        feed,
        "feed:nearby",
        remote(calls.clone(), || Ok(names(&["X", "Y", "Z"]))),
    );
    let orchestrator = no_retry();
    let cancel = CancellationToken::new();

    let online: OfflineDataResult<String> = orchestrator
        .fetch(CachePolicy::CacheFallback, &source, &cancel)
        .await
        .unwrap();
    assert_eq!(online, OfflineDataResult::Fresh(names(&["X", "Y", "Z"])));

    let offline: OfflineDataResult<String> = orchestrator
        .fetch(CachePolicy::CacheOnly, &source, &cancel)
        .await
        .unwrap();
    assert!(offline.is_cached());
    assert_eq!(offline.into_items(), names(&["X", "Y", "Z"]));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn fallback_uses_cache_when_remote_fails() {
    let feed = memory_feed();
    CacheStore::set(&*feed, "feed:nearby", names(&["A"]))
        .await
        .unwrap();

    let source = StoreBackedSource::new(
        feed,
        "feed:nearby",
        remote(Arc::new(AtomicUsize::new(0)), || {
            Err(CacheError::Transient("connection reset".into()))
        }),
    );

    let result: OfflineDataResult<String> = no_retry()
        .fetch(CachePolicy::CacheFallback, &source, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.into_items(), names(&["A"]));
}

#[tokio::test]
async fn fallback_with_nothing_cached_is_empty() {
    let source = StoreBackedSource::new(
        memory_feed(),
        "feed:nearby",
        remote(Arc::new(AtomicUsize::new(0)), || {
            Err(CacheError::Permanent("404".into()))
        }),
    );

    let result: OfflineDataResult<String> = no_retry()
        .fetch(CachePolicy::CacheFallback, &source, &CancellationToken::new())
        .await
        .unwrap();
    assert!(result.is_empty());
}

#[tokio::test]
async fn remote_only_surfaces_failure_and_leaves_cache_alone() {
    let feed = memory_feed();
    CacheStore::set(&*feed, "feed:nearby", names(&["A"]))
        .await
        .unwrap();

    let source = StoreBackedSource::new(
        feed.clone(),
        "feed:nearby",
        remote(Arc::new(AtomicUsize::new(0)), || {
            Err(CacheError::Permanent("forbidden".into()))
        }),
    );

    let err = no_retry()
        .fetch::<String, _>(CachePolicy::RemoteOnly, &source, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::Permanent(_)));
    assert_eq!(
        CacheStore::get(&*feed, "feed:nearby").await.unwrap(),
        Some(names(&["A"]))
    );
}

#[tokio::test]
async fn remote_only_does_not_write_back() {
    let feed = memory_feed();
    let source = StoreBackedSource::new(
        feed.clone(),
        "feed:nearby",
        remote(Arc::new(AtomicUsize::new(0)), || Ok(names(&["X"]))),
    );

    let result: OfflineDataResult<String> = no_retry()
        .fetch(CachePolicy::RemoteOnly, &source, &CancellationToken::new())
        .await
        .unwrap();
    assert!(result.is_fresh());
    assert_eq!(CacheStore::get(&*feed, "feed:nearby").await.unwrap(), None);
}

#[tokio::test]
async fn metered_network_prefers_cache() {
    let mut info = NetworkInfo::online(NetworkType::Cellular);
    info.is_metered = true;
    let orchestrator = no_retry().with_network_monitor(Arc::new(FixedNetwork(info)));
    assert_eq!(orchestrator.current_policy().await, CachePolicy::CacheFirst);

    let wifi = no_retry().with_network_monitor(Arc::new(FixedNetwork(NetworkInfo::online(
        NetworkType::WiFi,
    ))));
    assert_eq!(wifi.current_policy().await, CachePolicy::CacheFallback);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_with_backoff() {
    let failures_left = Arc::new(AtomicUsize::new(2));
    let calls = Arc::new(AtomicUsize::new(0));
    let source = StoreBackedSource::new(memory_feed(), "feed:nearby", {
        let failures_left = failures_left.clone();
        remote(calls.clone(), move || {
            if failures_left.load(Ordering::SeqCst) > 0 {
                failures_left.fetch_sub(1, Ordering::SeqCst);
                Err(CacheError::Transient("timeout".into()))
            } else {
                Ok(names(&["X"]))
            }
        })
    });
    let orchestrator = Orchestrator::new().with_retry_policy(
        RetryPolicy::new(3, Duration::from_millis(100)).with_jitter(0.0),
    );

    let started = tokio::time::Instant::now();
    let result: OfflineDataResult<String> = orchestrator
        .fetch(CachePolicy::RemoteOnly, &source, &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.is_fresh());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    // 200ms before the second attempt, 400ms before the third
    assert!(started.elapsed() >= Duration::from_millis(600));
}

#[tokio::test(start_paused = true)]
async fn attempts_stop_at_the_configured_maximum() {
    let calls = Arc::new(AtomicUsize::new(0));
    let source = StoreBackedSource::new(
        memory_feed(),
        "feed:nearby",
        remote(calls.clone(), || Err(CacheError::Transient("timeout".into()))),
    );
    let orchestrator = Orchestrator::new().with_retry_policy(
        RetryPolicy::new(4, Duration::from_millis(10)).with_jitter(0.0),
    );

    let err = orchestrator
        .fetch::<String, _>(CachePolicy::RemoteOnly, &source, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is_transient());
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn rate_limit_rejection_is_not_retried() {
    let limiter = Arc::new(
        RateLimiter::new(
            RateLimitConfig::new(2, Duration::from_secs(60)).with_max_wait(Duration::ZERO),
        )
        .unwrap(),
    );
    let calls = Arc::new(AtomicUsize::new(0));
    let source = StoreBackedSource::new(
        memory_feed(),
        "feed:nearby",
        remote(calls.clone(), || Ok(names(&["X"]))),
    );
    let orchestrator = Orchestrator::new()
        .with_rate_limiter(limiter.clone())
        .with_retry_policy(RetryPolicy::new(5, Duration::from_millis(10)));
    let cancel = CancellationToken::new();

    for _ in 0..2 {
        orchestrator
            .fetch::<String, _>(CachePolicy::RemoteOnly, &source, &cancel)
            .await
            .unwrap();
    }
    let err = orchestrator
        .fetch::<String, _>(CachePolicy::RemoteOnly, &source, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, CacheError::RateLimited { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(limiter.admitted_in_window(), 2);
}

#[tokio::test]
async fn cancelled_fetch_skips_remote_and_cache() {
    let feed = memory_feed();
    CacheStore::set(&*feed, "feed:nearby", names(&["A"]))
        .await
        .unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let source = StoreBackedSource::new(
        feed,
        "feed:nearby",
        remote(calls.clone(), || Ok(names(&["X"]))),
    );

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = no_retry()
        .fetch::<String, _>(CachePolicy::CacheFallback, &source, &cancel)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn tampered_secure_cache_is_not_masked_by_fallback() {
    let dir = TempDir::new().unwrap();
    let secure = Arc::new(
        SecureCache::new(
            SecureCacheConfig::new(dir.path(), "svc", "acct"),
            Arc::new(InMemoryKeystore::new()),
        )
        .unwrap(),
    );
    CacheStore::set(&*secure, "profile", names(&["555-0100"]))
        .await
        .unwrap();

    let path = secure.entry_path("profile");
    let mut raw = std::fs::read(&path).unwrap();
    let last = raw.len() - 1;
    raw[last] ^= 0xff;
    std::fs::write(&path, raw).unwrap();

    let source = StoreBackedSource::new(
        secure,
        "profile",
        remote(Arc::new(AtomicUsize::new(0)), || {
            Err(CacheError::Transient("offline".into()))
        }),
    );

    let err = no_retry()
        .fetch::<String, _>(CachePolicy::CacheFallback, &source, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::DecryptionFailed(_)));
}
