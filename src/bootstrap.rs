//! # Bootstrap description
//!
//! Startup YAML document laid out like Envoy's static configuration. It is
//! parsed into typed entries, translated into domain entities and applied to
//! the store before the management API starts accepting requests.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::{
    Cluster, ClusterSpec, Endpoint, FilterChain, HealthCheckPolicy, Listener, NetworkFilter,
    DEFAULT_ACCESS_LOG_PATH,
};
use crate::errors::{MagplaneError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub spec: BootstrapSpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BootstrapSpec {
    #[serde(default)]
    pub listeners: Vec<ListenerEntry>,
    #[serde(default)]
    pub clusters: Vec<ClusterEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerEntry {
    pub name: String,
    pub address: AddressEntry,
    #[serde(default)]
    pub access_log_path: Option<String>,
    #[serde(default)]
    pub filter_chains: Vec<FilterChainEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressEntry {
    pub socket_address: SocketAddressEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketAddressEntry {
    pub address: String,
    pub port_value: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterChainEntry {
    #[serde(default)]
    pub filters: Vec<FilterEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterEntry {
    pub name: String,
    pub typed_config: TypedConfigEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypedConfigEntry {
    #[serde(rename = "@type")]
    pub type_url: String,
    pub stat_prefix: String,
    pub cluster: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterEntry {
    pub name: String,
    /// Human readable duration such as `5s` or `250ms`.
    #[serde(default)]
    pub connect_timeout: Option<String>,
    #[serde(default)]
    pub maglev_lb_config: Option<MaglevEntry>,
    #[serde(default)]
    pub health_checks: Vec<HealthCheckEntry>,
    #[serde(default)]
    pub common_lb_config: Option<CommonLbEntry>,
    #[serde(default)]
    pub endpoints: Vec<SocketAddressEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaglevEntry {
    pub table_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommonLbEntry {
    pub health_panic_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckEntry {
    pub timeout: String,
    pub interval: String,
    pub unhealthy_threshold: u32,
    pub healthy_threshold: u32,
    pub http_health_check: HttpHealthCheckEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpHealthCheckEntry {
    pub path: String,
}

/// Entities ready to be stored.
#[derive(Debug, Clone, Default)]
pub struct BootstrapEntities {
    pub listeners: Vec<Listener>,
    pub clusters: Vec<Cluster>,
}

/// Read and parse the bootstrap file at `path`.
pub fn load_bootstrap(path: impl AsRef<Path>) -> Result<BootstrapConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| {
        MagplaneError::io(e, format!("Failed to read bootstrap file '{}'", path.display()))
    })?;

    let config = parse_bootstrap(&contents).map_err(|err| match err {
        MagplaneError::Bootstrap { source, .. } => MagplaneError::Bootstrap {
            source,
            context: format!("Failed to parse bootstrap file '{}'", path.display()),
        },
        other => other,
    })?;

    info!(
        path = %path.display(),
        name = %config.name,
        listeners = config.spec.listeners.len(),
        clusters = config.spec.clusters.len(),
        "Loaded bootstrap description"
    );
    Ok(config)
}

pub fn parse_bootstrap(contents: &str) -> Result<BootstrapConfig> {
    Ok(serde_yaml::from_str(contents)?)
}

impl BootstrapConfig {
    /// Translate into validated domain entities.
    ///
    /// Every cluster must be the target of exactly one listener and every
    /// listener must target a declared cluster.
    pub fn into_entities(self) -> Result<BootstrapEntities> {
        let mut listener_names = HashSet::new();
        let mut bindings: HashMap<String, String> = HashMap::new();
        let mut listeners = Vec::with_capacity(self.spec.listeners.len());

        for entry in self.spec.listeners {
            if !listener_names.insert(entry.name.clone()) {
                return Err(MagplaneError::validation_field(
                    format!("duplicate listener '{}'", entry.name),
                    "spec.listeners",
                ));
            }

            let listener = listener_from_entry(entry);
            listener.validate()?;

            let target = listener.target_cluster().unwrap_or_default().to_string();
            if let Some(previous) = bindings.insert(target.clone(), listener.name.clone()) {
                return Err(MagplaneError::validation_field(
                    format!(
                        "cluster '{}' is targeted by both '{}' and '{}'",
                        target, previous, listener.name
                    ),
                    "spec.listeners",
                ));
            }
            listeners.push(listener);
        }

        let mut cluster_names = HashSet::new();
        let mut clusters = Vec::with_capacity(self.spec.clusters.len());

        for entry in self.spec.clusters {
            if !cluster_names.insert(entry.name.clone()) {
                return Err(MagplaneError::validation_field(
                    format!("duplicate cluster '{}'", entry.name),
                    "spec.clusters",
                ));
            }

            let listener_name = bindings.get(&entry.name).cloned().ok_or_else(|| {
                MagplaneError::validation_field(
                    format!("cluster '{}' is not referenced by any listener", entry.name),
                    "spec.clusters",
                )
            })?;
            clusters.push(cluster_from_entry(entry, listener_name)?);
        }

        for (target, listener) in &bindings {
            if !cluster_names.contains(target) {
                return Err(MagplaneError::validation_field(
                    format!("listener '{}' targets unknown cluster '{}'", listener, target),
                    "spec.listeners",
                ));
            }
        }

        debug!(listeners = listeners.len(), clusters = clusters.len(), "Bootstrap entities ready");
        Ok(BootstrapEntities { listeners, clusters })
    }
}

fn listener_from_entry(entry: ListenerEntry) -> Listener {
    Listener {
        name: entry.name,
        address: entry.address.socket_address.address,
        port: entry.address.socket_address.port_value,
        access_log_path: entry
            .access_log_path
            .unwrap_or_else(|| DEFAULT_ACCESS_LOG_PATH.to_string()),
        filter_chains: entry
            .filter_chains
            .into_iter()
            .map(|chain| FilterChain {
                filters: chain
                    .filters
                    .into_iter()
                    .map(|filter| NetworkFilter {
                        name: filter.name,
                        type_url: filter.typed_config.type_url,
                        stat_prefix: filter.typed_config.stat_prefix,
                        cluster: filter.typed_config.cluster,
                    })
                    .collect(),
            })
            .collect(),
    }
}

fn cluster_from_entry(entry: ClusterEntry, listener_name: String) -> Result<Cluster> {
    let field = |name: &str| format!("spec.clusters.{}.{}", entry.name, name);

    let check = entry.health_checks.first().ok_or_else(|| {
        MagplaneError::validation_field(
            format!("cluster '{}' needs an HTTP health check", entry.name),
            field("health_checks"),
        )
    })?;

    let health_check = HealthCheckPolicy {
        timeout: parse_duration(&check.timeout, &field("health_checks.timeout"))?,
        interval: parse_duration(&check.interval, &field("health_checks.interval"))?,
        unhealthy_threshold: check.unhealthy_threshold,
        healthy_threshold: check.healthy_threshold,
        path: check.http_health_check.path.clone(),
    };

    let mut spec = ClusterSpec::new(entry.name.clone(), listener_name, health_check);
    if let Some(timeout) = entry.connect_timeout.as_deref() {
        spec.connect_timeout = parse_duration(timeout, &field("connect_timeout"))?;
    }
    if let Some(maglev) = &entry.maglev_lb_config {
        spec.lb_table_size = maglev.table_size;
    }
    if let Some(common) = &entry.common_lb_config {
        spec.health_panic_threshold = common.health_panic_threshold;
    }

    let spec = spec.normalized();
    spec.validate()?;

    let mut cluster = Cluster::from_spec(spec);
    for endpoint in &entry.endpoints {
        if cluster.has_endpoint(&endpoint.address, endpoint.port_value) {
            return Err(MagplaneError::validation_field(
                format!(
                    "duplicate endpoint {}:{} in cluster '{}'",
                    endpoint.address, endpoint.port_value, entry.name
                ),
                field("endpoints"),
            ));
        }
        cluster.endpoints.push(Endpoint::new(endpoint.address.clone(), endpoint.port_value));
    }
    Ok(cluster)
}

fn parse_duration(value: &str, field: &str) -> Result<Duration> {
    humantime::parse_duration(value.trim()).map_err(|e| {
        MagplaneError::validation_field(format!("invalid duration '{}': {}", value, e), field)
    })
}
