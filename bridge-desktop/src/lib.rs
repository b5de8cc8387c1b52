//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `SecureKeystore` using the `keyring` crate
//! - `NetworkMonitor` using a TCP reachability probe, or a host-driven
//!   static monitor when the platform pushes connectivity changes itself
//!
//! ## Feature Flags
//!
//! - `secure-store`: Enable OS keychain integration (default)
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{DesktopNetworkMonitor, KeyringKeystore};
//! use std::sync::Arc;
//!
//! let keystore = Arc::new(KeyringKeystore::new());
//! let monitor = Arc::new(DesktopNetworkMonitor::new());
//! // Hand both to CoreConfig::builder()
//! ```

mod network;

#[cfg(feature = "secure-store")]
mod secure_store;

pub use network::{DesktopNetworkMonitor, StaticNetworkMonitor};

#[cfg(feature = "secure-store")]
pub use secure_store::KeyringKeystore;
