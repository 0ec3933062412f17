//! # Storage
//!
//! In-memory configuration state. Nothing is persisted across restarts; the
//! store is rebuilt from the bootstrap description on startup.

pub mod config_store;

pub use config_store::ConfigStore;
