//! # Host Bridge Traits
//!
//! Contracts for the collaborators the cache engine consumes but does not own.
//!
//! ## Overview
//!
//! Each trait represents a capability that must be implemented differently per
//! platform (desktop, iOS, Android). The engine only ever talks to these traits,
//! so hosts inject their own adapters and tests inject doubles.
//!
//! ## Traits
//!
//! - [`SecureKeystore`](storage::SecureKeystore) - Encryption key persistence (Keychain/Keystore)
//! - [`NetworkMonitor`](network::NetworkMonitor) - Connectivity and metered network detection
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Status |
//! |----------|---------------------|--------|
//! | Desktop  | `bridge-desktop`    | ✅ Available |
//! | iOS      | Host app            | 📋 Injected |
//! | Android  | Host app            | 📋 Injected |
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Platform
//! implementations should convert platform-specific errors into it and keep
//! secret material out of the message.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so one adapter instance can be shared
//! across async tasks.

pub mod error;
pub mod network;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use network::{NetworkInfo, NetworkMonitor, NetworkState, NetworkStatus, NetworkType};
pub use storage::{InMemoryKeystore, SecureKeystore};
pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
