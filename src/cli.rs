//! # Command Line Interface
//!
//! Flags layered on top of the settings file and `MAGPLANE_*` environment.

use clap::Parser;

use crate::config::{ConfigOverrides, DEFAULT_CONFIG_FILE};

#[derive(Parser, Debug, Clone)]
#[command(name = "magplane")]
#[command(about = "Control plane for an Envoy maglev TCP proxy fleet")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Settings file path (YAML, TOML or JSON); missing file is tolerated
    #[arg(long, env = "MAGPLANE_CONFIG_FILE", default_value = DEFAULT_CONFIG_FILE)]
    pub config_file: String,

    /// Node id snapshots are published under (settings default: test-id)
    #[arg(long)]
    pub node_name: Option<String>,

    /// Management API port
    #[arg(long)]
    pub rest_port: Option<u16>,

    /// Management API bind address
    #[arg(long)]
    pub bind_address: Option<String>,

    /// Bootstrap description of listeners and clusters; empty starts with no configuration
    #[arg(long)]
    pub envoy_config: Option<String>,

    /// Log level or filter directives
    #[arg(long)]
    pub log_level: Option<String>,

    /// Emit JSON formatted logs
    #[arg(long)]
    pub json_logs: bool,

    /// Prometheus exporter port (0 disables it)
    #[arg(long)]
    pub metrics_port: Option<u16>,
}

impl Cli {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            node_id: self.node_name.clone(),
            bootstrap_path: self.envoy_config.clone(),
            api_host: self.bind_address.clone(),
            api_port: self.rest_port,
            log_level: self.log_level.clone(),
            json_logging: self.json_logs.then_some(true),
            metrics_port: self.metrics_port,
        }
    }
}
