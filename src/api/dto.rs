//! Request and response bodies of the management API.
//!
//! Durations travel as whole seconds. Zero (or an omitted field) selects the
//! default for connect timeout and maglev table size.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::{Cluster, ClusterSpec, HealthCheckPolicy, ListenerSpec};
use crate::xds::Snapshot;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct HealthCheckBody {
    #[validate(length(min = 1, message = "health check path is required"))]
    pub path: String,

    /// Seconds.
    #[validate(range(min = 1, message = "health check timeout must be positive"))]
    pub timeout: u32,

    /// Seconds.
    #[validate(range(min = 1, message = "health check interval must be positive"))]
    pub interval: u32,

    #[validate(range(min = 1, message = "unhealthy threshold must be positive"))]
    pub unhealthy_threshold: u32,

    #[validate(range(min = 1, message = "healthy threshold must be positive"))]
    pub healthy_threshold: u32,
}

impl From<HealthCheckBody> for HealthCheckPolicy {
    fn from(body: HealthCheckBody) -> Self {
        HealthCheckPolicy {
            timeout: Duration::from_secs(u64::from(body.timeout)),
            interval: Duration::from_secs(u64::from(body.interval)),
            unhealthy_threshold: body.unhealthy_threshold,
            healthy_threshold: body.healthy_threshold,
            path: body.path,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ClusterBody {
    #[validate(length(min = 1, message = "cluster name is required"))]
    pub name: String,

    /// Seconds; 0 selects the default.
    #[serde(default)]
    pub connect_timeout: u32,

    #[validate(nested)]
    pub health_check: HealthCheckBody,

    /// Percent; omitted selects the default.
    #[serde(default)]
    #[validate(range(min = 0.0, max = 100.0, message = "panic threshold must be within 0..=100"))]
    pub healthy_panic_threshold: Option<f64>,

    /// 0 selects the default.
    #[serde(default)]
    pub maglev_table_size: u64,
}

impl ClusterBody {
    /// Domain spec for this body. `listener_name` is filled in by the caller.
    pub fn into_spec(self, listener_name: impl Into<String>) -> ClusterSpec {
        let mut spec = ClusterSpec::new(self.name, listener_name, self.health_check.into())
            .with_connect_timeout(Duration::from_secs(u64::from(self.connect_timeout)))
            .with_table_size(self.maglev_table_size);
        if let Some(threshold) = self.healthy_panic_threshold {
            spec = spec.with_panic_threshold(threshold);
        }
        spec.normalized()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ListenerBody {
    #[validate(length(min = 1, message = "listener name is required"))]
    pub name: String,

    #[serde(rename = "ip")]
    #[validate(length(min = 1, message = "listener address is required"))]
    pub address: String,

    #[validate(range(min = 1, max = 65535, message = "listener port must be between 1 and 65535"))]
    pub port: u32,

    #[validate(length(min = 1, message = "access log path is required"))]
    pub access_log_path: String,
}

impl From<ListenerBody> for ListenerSpec {
    fn from(body: ListenerBody) -> Self {
        ListenerSpec::new(body.name, body.address, body.port)
            .with_access_log_path(body.access_log_path)
    }
}

/// `POST /cluster`
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ClusterRequest {
    #[validate(nested)]
    pub cluster: ClusterBody,

    #[validate(nested)]
    pub listener: ListenerBody,
}

/// `PUT /cluster`
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ClusterModificationRequest {
    #[validate(nested)]
    pub cluster: ClusterBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterNameQuery {
    #[serde(default)]
    pub name: String,
}

/// `POST /backend` and `DELETE /backend`
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BackendRequest {
    #[validate(length(min = 1, message = "cluster name is required"))]
    pub cluster_name: String,

    #[validate(length(min = 1, message = "backend address is required"))]
    pub ip: String,

    #[validate(range(min = 1, max = 65535, message = "backend port must be between 1 and 65535"))]
    pub port: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommonResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendView {
    pub ip: String,
    pub port: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterView {
    pub name: String,
    pub listener: String,
    pub connect_timeout: u64,
    pub healthy_panic_threshold: f64,
    pub maglev_table_size: u64,
    pub health_check: HealthCheckBody,
    pub backends: Vec<BackendView>,
}

impl From<Cluster> for ClusterView {
    fn from(cluster: Cluster) -> Self {
        let health_check = HealthCheckBody {
            path: cluster.health_check.path,
            timeout: duration_secs(cluster.health_check.timeout),
            interval: duration_secs(cluster.health_check.interval),
            unhealthy_threshold: cluster.health_check.unhealthy_threshold,
            healthy_threshold: cluster.health_check.healthy_threshold,
        };

        Self {
            name: cluster.name,
            listener: cluster.listener_name,
            connect_timeout: cluster.connect_timeout.as_secs(),
            healthy_panic_threshold: cluster.health_panic_threshold,
            maglev_table_size: cluster.lb_table_size,
            health_check,
            backends: cluster
                .endpoints
                .into_iter()
                .map(|endpoint| BackendView { ip: endpoint.upstream_host, port: endpoint.upstream_port })
                .collect(),
        }
    }
}

/// Summary of the snapshot currently held by the discovery cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotView {
    pub node_id: String,
    pub version: String,
    pub created_at: String,
    pub clusters: Vec<String>,
    pub listeners: Vec<String>,
    pub load_assignments: Vec<String>,
}

impl SnapshotView {
    pub fn new(node_id: impl Into<String>, snapshot: &Snapshot) -> Self {
        Self {
            node_id: node_id.into(),
            version: snapshot.version().to_string(),
            created_at: snapshot.created_at().to_rfc3339(),
            clusters: snapshot.clusters().iter().map(|c| c.name.clone()).collect(),
            listeners: snapshot.listeners().iter().map(|l| l.name.clone()).collect(),
            load_assignments: snapshot
                .load_assignments()
                .iter()
                .map(|assignment| assignment.cluster_name.clone())
                .collect(),
        }
    }
}

fn duration_secs(duration: Duration) -> u32 {
    u32::try_from(duration.as_secs()).unwrap_or(u32::MAX)
}
