//! Offline-first fetch coordination
//!
//! The [`Orchestrator`] runs one fetch under a [`CachePolicy`] and tags the
//! result with where it came from. Domain code supplies the local read, the
//! remote call and the cache write through a [`FetchStrategy`].
//!
//! Error policy:
//! - Remote failures are absorbed under `CacheFirst` and `CacheFallback` and
//!   surfaced under `RemoteOnly`.
//! - Storage errors on the local path are logged and treated as a miss.
//! - Cryptographic errors and cancellation are always returned.

use crate::error::{CacheError, Result};
use crate::policy::{CachePolicy, CachePolicySelector};
use crate::rate_limiter::RateLimiter;
use crate::retry::{with_retry, RetryPolicy};
use crate::store::CacheStore;
use async_trait::async_trait;
use bridge_traits::{NetworkMonitor, NetworkState};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

/// What the local cache holds for a request.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalSnapshot<T> {
    pub items: Vec<T>,
    /// When the items were last written from the remote source
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Set by sources that return stale rows instead of dropping them
    pub expired: bool,
}

impl<T> LocalSnapshot<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            last_synced_at: None,
            expired: false,
        }
    }

    pub fn new(items: Vec<T>, last_synced_at: Option<DateTime<Utc>>) -> Self {
        Self {
            items,
            last_synced_at,
            expired: false,
        }
    }

    pub fn with_expired(mut self, expired: bool) -> Self {
        self.expired = expired;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Result of a fetch, tagged with its provenance.
#[derive(Debug, Clone, PartialEq)]
pub enum OfflineDataResult<T> {
    /// Returned by the remote source during this call
    Fresh(Vec<T>),
    /// Served from the local cache
    Cached(Vec<T>, Option<DateTime<Utc>>),
    /// Neither path produced data
    Empty,
}

impl<T> OfflineDataResult<T> {
    fn from_local(snapshot: LocalSnapshot<T>) -> Self {
        if snapshot.items.is_empty() {
            OfflineDataResult::Empty
        } else {
            OfflineDataResult::Cached(snapshot.items, snapshot.last_synced_at)
        }
    }

    pub fn items(&self) -> &[T] {
        match self {
            OfflineDataResult::Fresh(items) | OfflineDataResult::Cached(items, _) => items,
            OfflineDataResult::Empty => &[],
        }
    }

    pub fn into_items(self) -> Vec<T> {
        match self {
            OfflineDataResult::Fresh(items) | OfflineDataResult::Cached(items, _) => items,
            OfflineDataResult::Empty => Vec::new(),
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, OfflineDataResult::Fresh(_))
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, OfflineDataResult::Cached(..))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, OfflineDataResult::Empty)
    }

    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        match self {
            OfflineDataResult::Cached(_, at) => *at,
            _ => None,
        }
    }
}

/// Domain-supplied data access for one request.
#[async_trait]
pub trait FetchStrategy<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    async fn fetch_local(&self) -> Result<LocalSnapshot<T>>;

    /// Implementations should return promptly once `cancel` fires.
    async fn fetch_remote(&self, cancel: &CancellationToken) -> Result<Vec<T>>;

    async fn save_to_cache(&self, items: &[T]) -> Result<()>;
}

/// Coordinates local and remote reads under a policy.
///
/// Remote calls pass through the rate limiter (if any) on every attempt and
/// are retried per the retry policy.
pub struct Orchestrator {
    rate_limiter: Option<Arc<RateLimiter>>,
    retry: RetryPolicy,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Orchestrator {
    pub fn new() -> Self {
        Self {
            rate_limiter: None,
            retry: RetryPolicy::default(),
            network_monitor: None,
        }
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Policy for the current network state.
    ///
    /// Without a monitor the network is assumed online. A failing monitor
    /// reports `Constrained`.
    pub async fn current_policy(&self) -> CachePolicy {
        let state = match &self.network_monitor {
            Some(monitor) => monitor.network_state().await,
            None => NetworkState::Online,
        };
        CachePolicySelector::select(state)
    }

    /// Fetch under the policy chosen from the network monitor.
    pub async fn fetch_auto<T, S>(
        &self,
        strategy: &S,
        cancel: &CancellationToken,
    ) -> Result<OfflineDataResult<T>>
    where
        T: Send + Sync + 'static,
        S: FetchStrategy<T> + ?Sized,
    {
        let policy = self.current_policy().await;
        self.fetch(policy, strategy, cancel).await
    }

    #[instrument(skip(self, strategy, cancel))]
    pub async fn fetch<T, S>(
        &self,
        policy: CachePolicy,
        strategy: &S,
        cancel: &CancellationToken,
    ) -> Result<OfflineDataResult<T>>
    where
        T: Send + Sync + 'static,
        S: FetchStrategy<T> + ?Sized,
    {
        match policy {
            CachePolicy::CacheOnly => {
                let local = self.read_local(strategy).await?;
                Ok(OfflineDataResult::from_local(local))
            }

            CachePolicy::CacheFirst => {
                let local = self.read_local(strategy).await?;
                if !local.is_empty() && !local.expired {
                    debug!(items = local.items.len(), "Serving from cache");
                    return Ok(OfflineDataResult::from_local(local));
                }

                match self.call_remote(strategy, cancel).await {
                    Ok(items) => {
                        self.persist(strategy, &items).await;
                        Ok(OfflineDataResult::Fresh(items))
                    }
                    Err(e) if e.is_cancelled() => Err(e),
                    Err(e) => {
                        warn!(error = %e, "Remote fetch failed; using local data");
                        Ok(OfflineDataResult::from_local(local))
                    }
                }
            }

            CachePolicy::CacheFallback => match self.call_remote(strategy, cancel).await {
                Ok(items) => {
                    self.persist(strategy, &items).await;
                    Ok(OfflineDataResult::Fresh(items))
                }
                Err(e) if e.is_cancelled() => Err(e),
                Err(e) => {
                    warn!(error = %e, "Remote fetch failed; falling back to cache");
                    let local = self.read_local(strategy).await?;
                    Ok(OfflineDataResult::from_local(local))
                }
            },

            CachePolicy::RemoteOnly => {
                let items = self.call_remote(strategy, cancel).await?;
                Ok(OfflineDataResult::Fresh(items))
            }
        }
    }

    /// Rate-limited, retried remote call.
    async fn call_remote<T, S>(&self, strategy: &S, cancel: &CancellationToken) -> Result<Vec<T>>
    where
        T: Send + Sync + 'static,
        S: FetchStrategy<T> + ?Sized,
    {
        let limiter = self.rate_limiter.as_deref();
        with_retry(&self.retry, cancel, CacheError::is_transient, move || async move {
            if let Some(limiter) = limiter {
                limiter.check_rate_limit(cancel).await?;
            }
            strategy.fetch_remote(cancel).await
        })
        .await
    }

    async fn read_local<T, S>(&self, strategy: &S) -> Result<LocalSnapshot<T>>
    where
        T: Send + Sync + 'static,
        S: FetchStrategy<T> + ?Sized,
    {
        match strategy.fetch_local().await {
            Ok(snapshot) => Ok(snapshot),
            Err(e) if e.is_storage() => {
                warn!(error = %e, "Local cache read failed; treating as miss");
                Ok(LocalSnapshot::empty())
            }
            Err(e) => {
                if e.is_cryptographic() {
                    error!(error = %e, "Cached data failed integrity check");
                }
                Err(e)
            }
        }
    }

    /// Write-back never fails the fetch that produced the data.
    async fn persist<T, S>(&self, strategy: &S, items: &[T])
    where
        T: Send + Sync + 'static,
        S: FetchStrategy<T> + ?Sized,
    {
        match strategy.save_to_cache(items).await {
            Ok(()) => debug!(items = items.len(), "Cache updated from remote"),
            Err(e) if e.is_storage() => {
                warn!(error = %e, "Failed to persist remote result")
            }
            Err(e) => error!(error = %e, "Failed to persist remote result"),
        }
    }
}

/// [`FetchStrategy`] over one key of a [`CacheStore`] and a remote closure.
///
/// ```ignore
/// let source = StoreBackedSource::new(disk.clone(), "feed:nearby", |cancel| {
///     let api = api.clone();
///     async move { api.nearby_listings(&cancel).await }
/// });
/// let result = orchestrator.fetch_auto(&source, &cancel).await?;
/// ```
pub struct StoreBackedSource<S: ?Sized, F> {
    store: Arc<S>,
    key: String,
    remote: F,
}

impl<S: ?Sized, F> StoreBackedSource<S, F> {
    pub fn new(store: Arc<S>, key: impl Into<String>, remote: F) -> Self {
        Self {
            store,
            key: key.into(),
            remote,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl<T, S, F, Fut> FetchStrategy<T> for StoreBackedSource<S, F>
where
    T: Clone + Send + Sync + 'static,
    S: CacheStore<Vec<T>> + ?Sized,
    F: Fn(CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<T>>> + Send,
{
    async fn fetch_local(&self) -> Result<LocalSnapshot<T>> {
        Ok(match self.store.get_entry(&self.key).await? {
            Some(entry) => LocalSnapshot::new(entry.value, Some(entry.stored_at)),
            None => LocalSnapshot::empty(),
        })
    }

    async fn fetch_remote(&self, cancel: &CancellationToken) -> Result<Vec<T>> {
        (self.remote)(cancel.clone()).await
    }

    async fn save_to_cache(&self, items: &[T]) -> Result<()> {
        self.store.set(&self.key, items.to_vec()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::{NetworkInfo, NetworkType};
    use mockall::mock;

    mock! {
        Strategy {}

        #[async_trait]
        impl FetchStrategy<String> for Strategy {
            async fn fetch_local(&self) -> Result<LocalSnapshot<String>>;
            async fn fetch_remote(&self, cancel: &CancellationToken) -> Result<Vec<String>>;
            async fn save_to_cache(&self, items: &[String]) -> Result<()>;
        }
    }

    mock! {
        Monitor {}

        #[async_trait]
        impl NetworkMonitor for Monitor {
            async fn get_network_info(&self) -> bridge_traits::error::Result<NetworkInfo>;
        }
    }

    fn items(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn no_retry() -> Orchestrator {
        Orchestrator::new().with_retry_policy(RetryPolicy::no_retry())
    }

    #[tokio::test]
    async fn test_cache_only_never_calls_remote() {
        let mut strategy = MockStrategy::new();
        strategy
            .expect_fetch_local()
            .times(1)
            .returning(|| Ok(LocalSnapshot::new(items(&["a"]), None)));
        strategy.expect_fetch_remote().never();
        strategy.expect_save_to_cache().never();

        let result = no_retry()
            .fetch(CachePolicy::CacheOnly, &strategy, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result, OfflineDataResult::Cached(items(&["a"]), None));
    }

    #[tokio::test]
    async fn test_cache_first_hit_skips_remote() {
        let synced = Utc::now();
        let mut strategy = MockStrategy::new();
        strategy
            .expect_fetch_local()
            .returning(move || Ok(LocalSnapshot::new(items(&["a", "b"]), Some(synced))));
        strategy.expect_fetch_remote().never();

        let result = no_retry()
            .fetch(CachePolicy::CacheFirst, &strategy, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.items(), items(&["a", "b"]).as_slice());
        assert_eq!(result.last_synced_at(), Some(synced));
    }

    #[tokio::test]
    async fn test_cache_first_expired_local_refreshes() {
        let mut strategy = MockStrategy::new();
        strategy
            .expect_fetch_local()
            .returning(|| Ok(LocalSnapshot::new(items(&["stale"]), None).with_expired(true)));
        strategy
            .expect_fetch_remote()
            .times(1)
            .returning(|_| Ok(items(&["new"])));
        strategy
            .expect_save_to_cache()
            .withf(|saved| saved.len() == 1 && saved[0] == "new")
            .times(1)
            .returning(|_| Ok(()));

        let result = no_retry()
            .fetch(CachePolicy::CacheFirst, &strategy, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result, OfflineDataResult::Fresh(items(&["new"])));
    }

    #[tokio::test]
    async fn test_cache_first_remote_failure_serves_stale() {
        let mut strategy = MockStrategy::new();
        strategy
            .expect_fetch_local()
            .times(1)
            .returning(|| Ok(LocalSnapshot::new(items(&["stale"]), None).with_expired(true)));
        strategy
            .expect_fetch_remote()
            .returning(|_| Err(CacheError::Transient("timeout".to_string())));
        strategy.expect_save_to_cache().never();

        let result = no_retry()
            .fetch(CachePolicy::CacheFirst, &strategy, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result, OfflineDataResult::Cached(items(&["stale"]), None));
    }

    #[tokio::test]
    async fn test_cache_fallback_failure_reads_local_after_remote() {
        let mut seq = mockall::Sequence::new();
        let mut strategy = MockStrategy::new();
        strategy
            .expect_fetch_remote()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(CacheError::Permanent("500".to_string())));
        strategy
            .expect_fetch_local()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(LocalSnapshot::empty()));

        let result = no_retry()
            .fetch(CachePolicy::CacheFallback, &strategy, &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_remote_only_surfaces_error_and_skips_cache() {
        let mut strategy = MockStrategy::new();
        strategy.expect_fetch_local().never();
        strategy.expect_save_to_cache().never();
        strategy
            .expect_fetch_remote()
            .returning(|_| Err(CacheError::Permanent("403".to_string())));

        let err = no_retry()
            .fetch(CachePolicy::RemoteOnly, &strategy, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Permanent(msg) if msg == "403"));
    }

    #[tokio::test]
    async fn test_remote_only_success_does_not_persist() {
        let mut strategy = MockStrategy::new();
        strategy.expect_fetch_local().never();
        strategy.expect_save_to_cache().never();
        strategy
            .expect_fetch_remote()
            .returning(|_| Ok(items(&["x"])));

        let result = no_retry()
            .fetch(CachePolicy::RemoteOnly, &strategy, &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.is_fresh());
    }

    #[tokio::test]
    async fn test_storage_error_on_local_is_a_miss() {
        let mut strategy = MockStrategy::new();
        strategy
            .expect_fetch_local()
            .returning(|| Err(CacheError::Storage("disk full".to_string())));

        let result = no_retry()
            .fetch(CachePolicy::CacheOnly, &strategy, &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_cryptographic_error_on_local_is_surfaced() {
        let mut strategy = MockStrategy::new();
        strategy
            .expect_fetch_local()
            .returning(|| Err(CacheError::DecryptionFailed("tag".to_string())));

        let err = no_retry()
            .fetch(CachePolicy::CacheOnly, &strategy, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_cryptographic());
    }

    #[tokio::test]
    async fn test_save_failure_still_returns_fresh() {
        let mut strategy = MockStrategy::new();
        strategy
            .expect_fetch_remote()
            .returning(|_| Ok(items(&["x"])));
        strategy
            .expect_save_to_cache()
            .returning(|_| Err(CacheError::Storage("read-only fs".to_string())));

        let result = no_retry()
            .fetch(CachePolicy::CacheFallback, &strategy, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result, OfflineDataResult::Fresh(items(&["x"])));
    }

    #[tokio::test]
    async fn test_cancellation_is_not_absorbed() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut strategy = MockStrategy::new();
        strategy.expect_fetch_remote().never();
        strategy.expect_fetch_local().never();

        let err = no_retry()
            .fetch(CachePolicy::CacheFallback, &strategy, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_remote_errors_are_retried() {
        let mut seq = mockall::Sequence::new();
        let mut strategy = MockStrategy::new();
        strategy
            .expect_fetch_remote()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Err(CacheError::Transient("503".to_string())));
        strategy
            .expect_fetch_remote()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(items(&["x"])));
        strategy.expect_save_to_cache().returning(|_| Ok(()));

        let orchestrator = Orchestrator::new().with_retry_policy(
            RetryPolicy::new(3, std::time::Duration::from_millis(50)).with_jitter(0.0),
        );
        let result = orchestrator
            .fetch(CachePolicy::CacheFallback, &strategy, &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.is_fresh());
    }

    #[tokio::test]
    async fn test_policy_follows_network_monitor() {
        let mut monitor = MockMonitor::new();
        monitor
            .expect_get_network_info()
            .times(1)
            .returning(|| Ok(NetworkInfo::offline()));
        let orchestrator = no_retry().with_network_monitor(Arc::new(monitor));
        assert_eq!(orchestrator.current_policy().await, CachePolicy::CacheOnly);

        let mut monitor = MockMonitor::new();
        monitor
            .expect_get_network_info()
            .returning(|| Ok(NetworkInfo::online(NetworkType::WiFi)));
        let orchestrator = no_retry().with_network_monitor(Arc::new(monitor));
        assert_eq!(
            orchestrator.current_policy().await,
            CachePolicy::CacheFallback
        );

        let mut monitor = MockMonitor::new();
        monitor.expect_get_network_info().returning(|| {
            Err(bridge_traits::BridgeError::NotAvailable(
                "no permission".to_string(),
            ))
        });
        let orchestrator = no_retry().with_network_monitor(Arc::new(monitor));
        assert_eq!(orchestrator.current_policy().await, CachePolicy::CacheFirst);

        assert_eq!(no_retry().current_policy().await, CachePolicy::CacheFallback);
    }

    #[tokio::test]
    async fn test_fetch_auto_offline_uses_cache_only() {
        let mut monitor = MockMonitor::new();
        monitor
            .expect_get_network_info()
            .returning(|| Ok(NetworkInfo::offline()));

        let mut strategy = MockStrategy::new();
        strategy
            .expect_fetch_local()
            .returning(|| Ok(LocalSnapshot::empty()));
        strategy.expect_fetch_remote().never();

        let result = no_retry()
            .with_network_monitor(Arc::new(monitor))
            .fetch_auto(&strategy, &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.is_empty());
    }
}
