//! Network Monitoring Implementations

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    network::{NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType},
};
use parking_lot::RwLock;
use std::time::Duration;
use tracing::debug;

/// Endpoint used for the reachability probe
const PROBE_ADDR: &str = "8.8.8.8:53";
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Desktop network monitor implementation
///
/// Detects connectivity with a TCP connect to a well-known resolver. Desktop
/// links are reported as unmetered.
pub struct DesktopNetworkMonitor {
    probe_addr: String,
    probe_timeout: Duration,
}

impl DesktopNetworkMonitor {
    pub fn new() -> Self {
        Self {
            probe_addr: PROBE_ADDR.to_string(),
            probe_timeout: PROBE_TIMEOUT,
        }
    }

    /// Probe a different endpoint (e.g. the marketplace API host)
    pub fn with_probe(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            probe_addr: addr.into(),
            probe_timeout: timeout,
        }
    }

    async fn check_connectivity(&self) -> NetworkStatus {
        match tokio::time::timeout(
            self.probe_timeout,
            tokio::net::TcpStream::connect(self.probe_addr.as_str()),
        )
        .await
        {
            Ok(Ok(_)) => NetworkStatus::Connected,
            Ok(Err(_)) | Err(_) => NetworkStatus::Disconnected,
        }
    }
}

impl Default for DesktopNetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkMonitor for DesktopNetworkMonitor {
    async fn get_network_info(&self) -> Result<NetworkInfo> {
        let status = self.check_connectivity().await;
        debug!(status = ?status, "Network probe finished");

        Ok(NetworkInfo {
            status,
            network_type: (status == NetworkStatus::Connected).then_some(NetworkType::Other),
            is_metered: false,
            is_expensive: false,
        })
    }
}

/// Monitor whose state is pushed by the host.
///
/// Mobile hosts already receive connectivity callbacks from the OS; they
/// forward each change with [`StaticNetworkMonitor::update`] and the engine
/// polls the last value.
#[derive(Debug)]
pub struct StaticNetworkMonitor {
    info: RwLock<NetworkInfo>,
}

impl StaticNetworkMonitor {
    pub fn new(info: NetworkInfo) -> Self {
        Self {
            info: RwLock::new(info),
        }
    }

    pub fn update(&self, info: NetworkInfo) {
        debug!(status = ?info.status, metered = info.is_metered, "Network state pushed by host");
        *self.info.write() = info;
    }
}

#[async_trait]
impl NetworkMonitor for StaticNetworkMonitor {
    async fn get_network_info(&self) -> Result<NetworkInfo> {
        Ok(self.info.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::network::NetworkState;

    #[tokio::test]
    async fn test_static_monitor_reflects_updates() {
        let monitor = StaticNetworkMonitor::new(NetworkInfo::online(NetworkType::WiFi));
        assert_eq!(monitor.network_state().await, NetworkState::Online);

        monitor.update(NetworkInfo::offline());
        assert_eq!(monitor.network_state().await, NetworkState::Offline);
        assert!(!monitor.is_connected().await);

        monitor.update(NetworkInfo {
            is_metered: true,
            ..NetworkInfo::online(NetworkType::Cellular)
        });
        assert_eq!(monitor.network_state().await, NetworkState::Constrained);
    }

    #[tokio::test]
    async fn test_probe_to_unroutable_address_is_disconnected() {
        // TEST-NET-1 is never routable; the short timeout keeps the test fast.
        let monitor =
            DesktopNetworkMonitor::with_probe("192.0.2.1:9", Duration::from_millis(50));
        let info = monitor.get_network_info().await.unwrap();
        assert_eq!(info.status, NetworkStatus::Disconnected);
        assert_eq!(info.network_type, None);
    }
}
