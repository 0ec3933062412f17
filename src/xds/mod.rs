//! # Envoy xDS resources and snapshot publication
//!
//! - `resources` and `access_log` translate the domain model into Envoy protobufs
//! - `snapshot` bundles one full resource set and checks it for consistency
//! - `version` orders snapshots
//! - `cache` is the boundary to the discovery service serving proxies
//! - `publisher` drives rebuild, versioning, checking and publication

pub mod access_log;
pub mod cache;
pub mod publisher;
pub mod resources;
pub mod snapshot;
pub mod version;

pub use cache::{DiscoveryCache, SnapshotCache, SnapshotUpdate};
pub use publisher::SnapshotPublisher;
pub use resources::{
    build_cluster, build_listener, build_load_assignment, BuiltResource, CLUSTER_TYPE_URL,
    ENDPOINT_TYPE_URL, LISTENER_TYPE_URL,
};
pub use snapshot::Snapshot;
pub use version::{SnapshotVersion, VersionCounter};
