//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by the cache engine:
//! - Logging and tracing bootstrap
//! - Configuration management with fail-fast capability checks
//!
//! ## Overview
//!
//! Hosts build one [`CoreConfig`](config::CoreConfig), optionally call
//! [`init_logging`](logging::init_logging), and hand the config to the engine
//! constructor. Nothing here is a process-wide singleton except the tracing
//! subscriber itself.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{CoreConfig, CoreConfigBuilder, RemoteCallConfig, TierConfig};
pub use error::{Error, Result};
pub use logging::{init_logging, LogFormat, LoggingConfig};
