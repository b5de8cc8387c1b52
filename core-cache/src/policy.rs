//! Cache policy selection

use bridge_traits::NetworkState;
use serde::{Deserialize, Serialize};

/// How a fetch combines the local cache and the remote source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Never call remote; cached value or empty
    CacheOnly,
    /// Cached value if present and unexpired; remote only on a miss
    CacheFirst,
    /// Remote first; cache on failure
    CacheFallback,
    /// Remote only; failures are surfaced and the cache is untouched
    RemoteOnly,
}

impl CachePolicy {
    pub fn uses_remote(&self) -> bool {
        !matches!(self, CachePolicy::CacheOnly)
    }

    pub fn uses_cache(&self) -> bool {
        !matches!(self, CachePolicy::RemoteOnly)
    }
}

/// Maps network quality onto the default policy.
///
/// Call sites may override the result per request, e.g. forcing
/// [`CachePolicy::RemoteOnly`] for a pull-to-refresh.
#[derive(Debug, Clone, Copy, Default)]
pub struct CachePolicySelector;

impl CachePolicySelector {
    pub fn select(state: NetworkState) -> CachePolicy {
        match state {
            NetworkState::Offline => CachePolicy::CacheOnly,
            NetworkState::Constrained => CachePolicy::CacheFirst,
            NetworkState::Online => CachePolicy::CacheFallback,
        }
    }
}
