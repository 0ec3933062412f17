//! # Magplane
//!
//! Control plane for a fleet of Envoy proxies running maglev consistent-hash
//! TCP load balancing. Operators describe listeners, clusters and backends;
//! every accepted change is rebuilt into a complete, versioned snapshot of
//! Envoy resources and handed to a discovery cache for the proxies of one
//! node.
//!
//! ```text
//! REST API → ControlPlane (single lock) → ConfigStore
//!                  ↓
//!          SnapshotPublisher → DiscoveryCache → Envoy proxies
//! ```

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod domain;
pub mod errors;
pub mod observability;
pub mod services;
pub mod storage;
pub mod xds;

pub use config::Config;
pub use errors::{MagplaneError, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
