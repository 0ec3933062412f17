//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use envoy_types::pb::envoy::config::core::v3::{
    address::Address as AddressType, socket_address::PortSpecifier,
};
use envoy_types::pb::envoy::config::endpoint::v3::lb_endpoint::HostIdentifier;
use magplane::domain::{ClusterSpec, HealthCheckPolicy, ListenerSpec};
use magplane::services::ControlPlane;
use magplane::xds::{DiscoveryCache, Snapshot, SnapshotCache, SnapshotPublisher, VersionCounter};
use tokio_util::sync::CancellationToken;

pub const NODE_ID: &str = "test-id";

pub struct Harness {
    pub control_plane: Arc<ControlPlane>,
    pub cache: Arc<SnapshotCache>,
    pub shutdown: CancellationToken,
}

pub fn harness() -> Harness {
    harness_with_seed(1)
}

pub fn harness_with_seed(seed: u64) -> Harness {
    let cache = Arc::new(SnapshotCache::new());
    let dyn_cache: Arc<dyn DiscoveryCache> = cache.clone();
    let publisher =
        SnapshotPublisher::with_versions(NODE_ID, dyn_cache, VersionCounter::with_seed(seed));
    let shutdown = CancellationToken::new();
    let control_plane = Arc::new(ControlPlane::new(publisher, shutdown.clone()));
    Harness { control_plane, cache, shutdown }
}

pub fn web_cluster() -> ClusterSpec {
    ClusterSpec::new("web", "web-l", HealthCheckPolicy::http("/healthz"))
}

pub fn web_listener() -> ListenerSpec {
    ListenerSpec::new("web-l", "0.0.0.0", 9000)
}

/// `(host, port)` pairs of the load assignment for `cluster`, in order.
pub fn assignment_endpoints(snapshot: &Snapshot, cluster: &str) -> Vec<(String, u32)> {
    let Some(assignment) = snapshot.load_assignment(cluster) else {
        return Vec::new();
    };

    assignment
        .endpoints
        .iter()
        .flat_map(|locality| locality.lb_endpoints.iter())
        .filter_map(|lb| match lb.host_identifier.as_ref() {
            Some(HostIdentifier::Endpoint(endpoint)) => {
                match endpoint.address.as_ref().and_then(|a| a.address.as_ref()) {
                    Some(AddressType::SocketAddress(socket)) => match socket.port_specifier {
                        Some(PortSpecifier::PortValue(port)) => Some((socket.address.clone(), port)),
                        _ => None,
                    },
                    _ => None,
                }
            }
            _ => None,
        })
        .collect()
}
