//! Immutable, versioned bundle of every resource a proxy needs.
//!
//! A snapshot is built in full on every change and checked for internal
//! consistency before it may be handed to the discovery cache.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use envoy_types::pb::envoy::config::cluster::v3::cluster::{ClusterDiscoveryType, DiscoveryType};
use envoy_types::pb::envoy::config::cluster::v3::Cluster as EnvoyCluster;
use envoy_types::pb::envoy::config::endpoint::v3::ClusterLoadAssignment;
use envoy_types::pb::envoy::config::listener::v3::{filter, Listener as EnvoyListener};
use envoy_types::pb::envoy::extensions::filters::network::tcp_proxy::v3::{
    tcp_proxy::ClusterSpecifier, TcpProxy,
};
use prost::Message;

use crate::domain::TCP_PROXY_TYPE_URL;
use crate::errors::{MagplaneError, Result};
use crate::xds::resources::{BuiltResource, CLUSTER_TYPE_URL, ENDPOINT_TYPE_URL, LISTENER_TYPE_URL};
use crate::xds::version::SnapshotVersion;

#[derive(Debug, Clone)]
pub struct Snapshot {
    version: SnapshotVersion,
    clusters: Vec<EnvoyCluster>,
    listeners: Vec<EnvoyListener>,
    load_assignments: Vec<ClusterLoadAssignment>,
    created_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(
        version: SnapshotVersion,
        clusters: Vec<EnvoyCluster>,
        listeners: Vec<EnvoyListener>,
        load_assignments: Vec<ClusterLoadAssignment>,
    ) -> Self {
        Self { version, clusters, listeners, load_assignments, created_at: Utc::now() }
    }

    #[inline]
    pub fn version(&self) -> SnapshotVersion {
        self.version
    }

    #[inline]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn clusters(&self) -> &[EnvoyCluster] {
        &self.clusters
    }

    pub fn listeners(&self) -> &[EnvoyListener] {
        &self.listeners
    }

    pub fn load_assignments(&self) -> &[ClusterLoadAssignment] {
        &self.load_assignments
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty() && self.listeners.is_empty() && self.load_assignments.is_empty()
    }

    pub fn cluster(&self, name: &str) -> Option<&EnvoyCluster> {
        self.clusters.iter().find(|c| c.name == name)
    }

    pub fn listener(&self, name: &str) -> Option<&EnvoyListener> {
        self.listeners.iter().find(|l| l.name == name)
    }

    pub fn load_assignment(&self, cluster_name: &str) -> Option<&ClusterLoadAssignment> {
        self.load_assignments.iter().find(|a| a.cluster_name == cluster_name)
    }

    /// Resources encoded as `Any`, grouped by type URL as served to proxies.
    pub fn resources(&self, type_url: &str) -> Vec<BuiltResource> {
        match type_url {
            CLUSTER_TYPE_URL => self
                .clusters
                .iter()
                .map(|c| BuiltResource::encode(c.name.clone(), CLUSTER_TYPE_URL, c))
                .collect(),
            LISTENER_TYPE_URL => self
                .listeners
                .iter()
                .map(|l| BuiltResource::encode(l.name.clone(), LISTENER_TYPE_URL, l))
                .collect(),
            ENDPOINT_TYPE_URL => self
                .load_assignments
                .iter()
                .map(|a| BuiltResource::encode(a.cluster_name.clone(), ENDPOINT_TYPE_URL, a))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Verify that the snapshot references nothing it does not contain.
    ///
    /// Every problem found is reported in a single [`MagplaneError::Consistency`].
    pub fn check_consistency(&self) -> Result<()> {
        let mut problems = Vec::new();

        let cluster_names = unique_names(
            self.clusters.iter().map(|c| c.name.as_str()),
            "cluster",
            &mut problems,
        );
        unique_names(self.listeners.iter().map(|l| l.name.as_str()), "listener", &mut problems);
        let assigned = unique_names(
            self.load_assignments.iter().map(|a| a.cluster_name.as_str()),
            "load assignment",
            &mut problems,
        );

        for listener in &self.listeners {
            for target in tcp_proxy_targets(listener) {
                if !cluster_names.contains(target.as_str()) {
                    problems.push(format!(
                        "listener '{}' forwards to unknown cluster '{}'",
                        listener.name, target
                    ));
                }
            }
        }

        for assignment in &self.load_assignments {
            if !cluster_names.contains(assignment.cluster_name.as_str()) {
                problems.push(format!(
                    "load assignment references unknown cluster '{}'",
                    assignment.cluster_name
                ));
            }
        }

        for cluster in self.clusters.iter().filter(|c| is_eds(c)) {
            if !assigned.contains(cluster.name.as_str()) {
                problems.push(format!("cluster '{}' has no load assignment", cluster.name));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(MagplaneError::consistency(problems.join("; ")))
        }
    }
}

fn unique_names<'a>(
    names: impl Iterator<Item = &'a str>,
    kind: &str,
    problems: &mut Vec<String>,
) -> HashSet<&'a str> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            problems.push(format!("duplicate {} name '{}'", kind, name));
        }
    }
    seen
}

fn is_eds(cluster: &EnvoyCluster) -> bool {
    cluster.cluster_discovery_type == Some(ClusterDiscoveryType::Type(DiscoveryType::Eds as i32))
}

/// Clusters named by the TCP proxy filters of a listener.
pub(crate) fn tcp_proxy_targets(listener: &EnvoyListener) -> Vec<String> {
    listener
        .filter_chains
        .iter()
        .flat_map(|chain| chain.filters.iter())
        .filter_map(|f| match f.config_type.as_ref() {
            Some(filter::ConfigType::TypedConfig(any)) if any.type_url == TCP_PROXY_TYPE_URL => {
                TcpProxy::decode(any.value.as_slice()).ok()
            }
            _ => None,
        })
        .filter_map(|proxy| match proxy.cluster_specifier {
            Some(ClusterSpecifier::Cluster(name)) => Some(name),
            _ => None,
        })
        .collect()
}
