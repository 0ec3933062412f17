//! # Error Handling
//!
//! Error types shared by every layer of the control plane.

pub mod types;

pub use types::{ErrorKind, MagplaneError, Result};
