//! Network Monitoring Abstraction
//!
//! Provides network connectivity information. The engine never infers
//! connectivity itself; it asks the host through [`NetworkMonitor`].

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Network connection type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkType {
    /// Cellular/mobile data connection
    Cellular,
    /// WiFi connection
    WiFi,
    /// Ethernet connection
    Ethernet,
    /// Other or unknown connection type
    Other,
}

/// Network connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    /// Connected to network
    Connected,
    /// Not connected to any network
    Disconnected,
    /// Connection status unknown or indeterminate
    Indeterminate,
}

/// Network information
#[derive(Debug, Clone)]
pub struct NetworkInfo {
    pub status: NetworkStatus,
    pub network_type: Option<NetworkType>,
    /// Whether the connection is metered (has data limits/costs)
    pub is_metered: bool,
    /// Whether the connection is considered expensive by the OS
    pub is_expensive: bool,
}

impl NetworkInfo {
    /// Unmetered, connected network
    pub fn online(network_type: NetworkType) -> Self {
        Self {
            status: NetworkStatus::Connected,
            network_type: Some(network_type),
            is_metered: false,
            is_expensive: false,
        }
    }

    /// No connectivity
    pub fn offline() -> Self {
        Self {
            status: NetworkStatus::Disconnected,
            network_type: None,
            is_metered: false,
            is_expensive: false,
        }
    }

    /// Collapse the detailed info into the three-level quality signal.
    pub fn state(&self) -> NetworkState {
        NetworkState::from(self)
    }
}

/// Coarse network quality signal consumed by the cache policy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkState {
    /// Connected over an unmetered link
    Online,
    /// Connected, but metered, expensive, or of unknown quality
    Constrained,
    /// No connectivity
    Offline,
}

impl From<&NetworkInfo> for NetworkState {
    fn from(info: &NetworkInfo) -> Self {
        match info.status {
            NetworkStatus::Disconnected => NetworkState::Offline,
            NetworkStatus::Indeterminate => NetworkState::Constrained,
            NetworkStatus::Connected if info.is_metered || info.is_expensive => {
                NetworkState::Constrained
            }
            NetworkStatus::Connected => NetworkState::Online,
        }
    }
}

/// Network monitor trait
///
/// Provides network connectivity information to allow the core to:
/// - Serve from cache when offline
/// - Prefer cached data on metered connections
///
/// # Platform Support
///
/// - **Desktop**: TCP reachability probe
/// - **iOS**: Network framework, Reachability
/// - **Android**: ConnectivityManager
///
/// # Example
///
/// ```ignore
/// use bridge_traits::network::{NetworkMonitor, NetworkState};
///
/// async fn is_offline(monitor: &dyn NetworkMonitor) -> bool {
///     monitor.network_state().await == NetworkState::Offline
/// }
/// ```
#[async_trait::async_trait]
pub trait NetworkMonitor: Send + Sync {
    /// Get current network information
    async fn get_network_info(&self) -> Result<NetworkInfo>;

    /// Current coarse network state.
    ///
    /// A monitor failure is reported as `Constrained`: the caller can still
    /// try the network, but prefers what is cached.
    async fn network_state(&self) -> NetworkState {
        match self.get_network_info().await {
            Ok(info) => info.state(),
            Err(_) => NetworkState::Constrained,
        }
    }

    /// Check if currently connected to any network
    async fn is_connected(&self) -> bool {
        matches!(
            self.get_network_info().await,
            Ok(NetworkInfo {
                status: NetworkStatus::Connected,
                ..
            })
        )
    }
}
