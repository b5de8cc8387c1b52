//! Facade crate for the Foodshare offline cache engine.
//!
//! Host applications depend on `foodshare-core` and pick a feature set
//! instead of wiring each workspace crate by hand:
//!
//! - `engine`: the cache tiers, orchestrator and runtime config
//!   (`core-cache`, `core-runtime`)
//! - `desktop-shims` (default): `engine` plus the OS keychain and a TCP
//!   reachability monitor from `bridge-desktop`
//!
//! Mobile hosts disable default features, enable `engine`, and inject their
//! own [`bridges::SecureKeystore`] and [`bridges::NetworkMonitor`].

pub use bridge_traits as bridges;

#[cfg(feature = "engine")]
pub use core_cache as cache;

#[cfg(feature = "engine")]
pub use core_runtime as runtime;

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop as desktop;

#[cfg(feature = "engine")]
pub use core_cache::{CacheEngine, CachePolicy, OfflineDataResult};

#[cfg(feature = "engine")]
pub use core_runtime::CoreConfig;
