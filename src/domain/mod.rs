//! Domain layer
//!
//! Pure entities of the control plane: listeners, clusters, endpoints and
//! health check policies, with their structural validation. Nothing here
//! knows about Envoy protobufs, HTTP or locking.

pub mod cluster;
pub mod listener;

pub use cluster::{
    Cluster, ClusterSpec, ClusterValidationError, Endpoint, HealthCheckPolicy,
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAGLEV_TABLE_SIZE, MAX_DURATION, MAX_MAGLEV_TABLE_SIZE,
};
pub use listener::{
    FilterChain, Listener, ListenerSpec, ListenerValidationError, NetworkFilter,
    DEFAULT_ACCESS_LOG_PATH, TCP_PROXY_FILTER_NAME, TCP_PROXY_STAT_PREFIX, TCP_PROXY_TYPE_URL,
};
