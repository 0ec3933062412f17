//! # Configuration Management
//!
//! Settings are layered: built-in defaults, then an optional YAML/TOML/JSON
//! file, then `MAGPLANE_*` environment variables (nested keys separated by
//! `__`, e.g. `MAGPLANE_API__PORT`), then command line overrides.

pub mod settings;

use std::path::Path;

use config::{Environment, File};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::{MagplaneError, Result};

pub use settings::{ApiServerConfig, ObservabilityConfig};

/// Default node id snapshots are published under.
pub const DEFAULT_NODE_ID: &str = "test-id";

/// Default location of the settings file.
pub const DEFAULT_CONFIG_FILE: &str = "config/config.yaml";

const ENV_PREFIX: &str = "MAGPLANE";

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Config {
    /// Node id of the proxy fleet served by this control plane
    #[validate(length(min = 1, message = "Node id cannot be empty"))]
    pub node_id: String,

    /// Bootstrap description loaded at startup; `None` starts empty
    pub bootstrap_path: Option<String>,

    #[validate(nested)]
    pub api: ApiServerConfig,

    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: DEFAULT_NODE_ID.to_string(),
            bootstrap_path: None,
            api: ApiServerConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Values supplied on the command line; `None` keeps the layered value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub node_id: Option<String>,
    pub bootstrap_path: Option<String>,
    pub api_host: Option<String>,
    pub api_port: Option<u16>,
    pub log_level: Option<String>,
    pub json_logging: Option<bool>,
    pub metrics_port: Option<u16>,
}

impl Config {
    /// Load settings from `path` (missing file tolerated) and the environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate_all()?;
        Ok(config)
    }

    /// Apply command line overrides, then re-validate.
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Result<Self> {
        if let Some(node_id) = overrides.node_id {
            self.node_id = node_id;
        }
        if let Some(path) = overrides.bootstrap_path {
            self.bootstrap_path = Some(path);
        }
        if let Some(host) = overrides.api_host {
            self.api.host = host;
        }
        if let Some(port) = overrides.api_port {
            self.api.port = port;
        }
        if let Some(level) = overrides.log_level {
            self.observability.log_level = level;
        }
        if let Some(json) = overrides.json_logging {
            self.observability.json_logging = json;
        }
        if let Some(port) = overrides.metrics_port {
            self.observability.metrics_port = port;
        }

        // An empty path on the command line means "no bootstrap".
        if self.bootstrap_path.as_deref().is_some_and(|p| p.trim().is_empty()) {
            self.bootstrap_path = None;
        }

        self.validate_all()?;
        Ok(self)
    }

    fn validate_all(&self) -> Result<()> {
        Validate::validate(self).map_err(MagplaneError::from)?;

        if self.observability.metrics_port != 0 && self.observability.metrics_port == self.api.port
        {
            return Err(MagplaneError::validation_field(
                "API and metrics ports cannot be the same",
                "observability.metrics_port",
            ));
        }
        Ok(())
    }
}
