//! # Structured Logging
//!
//! Subscriber setup plus span macros used across the control plane.
//! `RUST_LOG` takes precedence over the configured level when set.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{Config, ObservabilityConfig};
use crate::errors::{MagplaneError, Result};

/// Create a tracing span for request tracking
#[macro_export]
macro_rules! request_span {
    ($method:expr, $path:expr) => {
        tracing::info_span!(
            "http_request",
            method = %$method,
            path = %$path,
            request_id = %uuid::Uuid::new_v4()
        )
    };
    ($method:expr, $path:expr, $($field:tt)*) => {
        tracing::info_span!(
            "http_request",
            method = %$method,
            path = %$path,
            request_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Create a tracing span for xDS operations
#[macro_export]
macro_rules! xds_span {
    ($operation:expr, $node_id:expr) => {
        tracing::info_span!(
            "xds_operation",
            operation = %$operation,
            node_id = %$node_id,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
    ($operation:expr, $node_id:expr, $($field:tt)*) => {
        tracing::info_span!(
            "xds_operation",
            operation = %$operation,
            node_id = %$node_id,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| {
            MagplaneError::config(format!("Invalid log level '{}': {}", config.log_level, e))
        })?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json_logging {
        registry.with(fmt::layer().json().with_current_span(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    installed.map_err(|e| MagplaneError::config(format!("Failed to install logger: {}", e)))
}

/// Log configuration at startup
pub fn log_config_info(config: &Config) {
    tracing::info!(
        node_id = %config.node_id,
        api_address = %config.api.bind_address(),
        bootstrap = config.bootstrap_path.as_deref().unwrap_or("<none>"),
        metrics_enabled = config.observability.metrics_bind_address().is_some(),
        json_logging = config.observability.json_logging,
        "magplane control plane configuration"
    );
}
