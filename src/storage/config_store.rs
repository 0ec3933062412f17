//! # Configuration Store
//!
//! Authoritative in-memory model of listeners and clusters. The store holds
//! no lock of its own: mutators take `&mut self`, and the single instance
//! lives behind the control plane's critical section.

use std::collections::HashMap;

use tracing::debug;

use crate::domain::{Cluster, ClusterSpec, Endpoint, Listener};
use crate::errors::{MagplaneError, Result};

#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    listeners: HashMap<String, Listener>,
    clusters: HashMap<String, Cluster>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exists_listener(&self, name: &str) -> bool {
        self.listeners.contains_key(name)
    }

    pub fn exists_cluster(&self, name: &str) -> bool {
        self.clusters.contains_key(name)
    }

    /// False when the cluster itself is absent.
    pub fn exists_endpoint(&self, cluster: &str, host: &str, port: u32) -> bool {
        self.clusters.get(cluster).is_some_and(|c| c.has_endpoint(host, port))
    }

    /// Insert or overwrite a listener.
    pub fn add_listener(&mut self, listener: Listener) -> Result<()> {
        listener.validate()?;
        debug!(listener = %listener.name, port = listener.port, "Storing listener");
        self.listeners.insert(listener.name.clone(), listener);
        Ok(())
    }

    /// Upsert: inserts the cluster or replaces an existing one wholesale,
    /// endpoint set included.
    pub fn add_cluster(&mut self, spec: ClusterSpec) -> Result<()> {
        spec.validate()?;
        debug!(cluster = %spec.name, listener = %spec.listener_name, "Storing cluster");
        self.clusters.insert(spec.name.clone(), Cluster::from_spec(spec));
        Ok(())
    }

    /// Update: the cluster must already exist. Tunables are overwritten while
    /// the listener binding and endpoints are preserved.
    pub fn update_cluster(&mut self, spec: ClusterSpec) -> Result<()> {
        spec.validate()?;
        let cluster = self
            .clusters
            .get_mut(&spec.name)
            .ok_or_else(|| MagplaneError::not_found("cluster", spec.name.clone()))?;
        cluster.apply_tunables(spec);
        Ok(())
    }

    /// Idempotent.
    pub fn remove_cluster(&mut self, name: &str) {
        self.clusters.remove(name);
    }

    /// Remove the listener bound to `cluster_name`, if any.
    pub fn remove_listener(&mut self, cluster_name: &str) {
        let listener_name = self.find_listener_name_by_cluster(cluster_name);
        if !listener_name.is_empty() {
            self.listeners.remove(&listener_name);
        }
    }

    /// Append an endpoint. Duplicate detection is the caller's job; a missing
    /// cluster is a no-op.
    pub fn add_endpoint(&mut self, cluster: &str, host: &str, port: u32) {
        if let Some(cluster) = self.clusters.get_mut(cluster) {
            cluster.endpoints.push(Endpoint::new(host, port));
        }
    }

    /// Drop every endpoint with the given identity. No match leaves the set
    /// unchanged.
    pub fn remove_endpoint(&mut self, cluster: &str, host: &str, port: u32) {
        if let Some(cluster) = self.clusters.get_mut(cluster) {
            cluster.endpoints.retain(|endpoint| !endpoint.matches(host, port));
        }
    }

    /// Name of the listener bound to `cluster_name`; empty when there is none.
    pub fn find_listener_name_by_cluster(&self, cluster_name: &str) -> String {
        if let Some(cluster) = self.clusters.get(cluster_name) {
            if self.listeners.contains_key(&cluster.listener_name) {
                return cluster.listener_name.clone();
            }
        }

        self.listeners
            .values()
            .find(|listener| listener.target_cluster() == Some(cluster_name))
            .map(|listener| listener.name.clone())
            .unwrap_or_default()
    }

    pub fn listener(&self, name: &str) -> Option<&Listener> {
        self.listeners.get(name)
    }

    pub fn cluster(&self, name: &str) -> Option<&Cluster> {
        self.clusters.get(name)
    }

    /// All listeners ordered by name.
    pub fn listeners(&self) -> Vec<&Listener> {
        let mut listeners: Vec<_> = self.listeners.values().collect();
        listeners.sort_by(|a, b| a.name.cmp(&b.name));
        listeners
    }

    /// All clusters ordered by name.
    pub fn clusters(&self) -> Vec<&Cluster> {
        let mut clusters: Vec<_> = self.clusters.values().collect();
        clusters.sort_by(|a, b| a.name.cmp(&b.name));
        clusters
    }

    pub fn endpoint_count(&self, cluster: &str) -> usize {
        self.clusters.get(cluster).map_or(0, |c| c.endpoints.len())
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty() && self.clusters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{HealthCheckPolicy, ListenerSpec};
    use proptest::prelude::*;

    fn spec(name: &str, listener: &str) -> ClusterSpec {
        ClusterSpec::new(name, listener, HealthCheckPolicy::http("/healthz"))
    }

    fn seeded() -> ConfigStore {
        let mut store = ConfigStore::new();
        store
            .add_listener(Listener::tcp_proxy(ListenerSpec::new("web-l", "0.0.0.0", 9000), "web"))
            .expect("add listener");
        store.add_cluster(spec("web", "web-l")).expect("add cluster");
        store
    }

    #[test]
    fn existence_checks() {
        let mut store = seeded();
        store.add_endpoint("web", "10.0.0.1", 8080);

        assert!(store.exists_listener("web-l"));
        assert!(store.exists_cluster("web"));
        assert!(store.exists_endpoint("web", "10.0.0.1", 8080));
        assert!(!store.exists_endpoint("web", "10.0.0.1", 8081));
        assert!(!store.exists_endpoint("missing", "10.0.0.1", 8080));
    }

    #[test]
    fn add_cluster_is_an_upsert_that_resets_endpoints() {
        let mut store = seeded();
        store.add_endpoint("web", "10.0.0.1", 8080);

        store.add_cluster(spec("web", "web-l").with_table_size(251)).expect("upsert");

        assert_eq!(store.cluster_count(), 1);
        assert_eq!(store.cluster("web").map(|c| c.lb_table_size), Some(251));
        assert_eq!(store.endpoint_count("web"), 0);
    }

    #[test]
    fn update_cluster_requires_existence_and_keeps_endpoints() {
        let mut store = seeded();
        store.add_endpoint("web", "10.0.0.1", 8080);

        let error = store.update_cluster(spec("api", "web-l")).unwrap_err();
        assert!(matches!(error, MagplaneError::NotFound { .. }));

        store.update_cluster(spec("web", "web-l").with_panic_threshold(10.0)).expect("update");
        let cluster = store.cluster("web").expect("cluster");
        assert_eq!(cluster.health_panic_threshold, 10.0);
        assert_eq!(cluster.endpoints, vec![Endpoint::new("10.0.0.1", 8080)]);
    }

    #[test]
    fn add_cluster_rejects_invalid_spec() {
        let mut store = ConfigStore::new();
        let error = store.add_cluster(spec("web", "web-l").with_table_size(100)).unwrap_err();
        assert!(matches!(error, MagplaneError::Validation { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn remove_listener_by_cluster_name() {
        let mut store = seeded();
        assert_eq!(store.find_listener_name_by_cluster("web"), "web-l");

        store.remove_listener("web");
        assert!(!store.exists_listener("web-l"));
        assert_eq!(store.find_listener_name_by_cluster("web"), "");

        store.remove_listener("web");
        store.remove_cluster("web");
        store.remove_cluster("web");
        assert!(store.is_empty());
    }

    #[test]
    fn remove_endpoint_without_match_is_a_no_op() {
        let mut store = seeded();
        store.add_endpoint("web", "10.0.0.1", 8080);

        store.remove_endpoint("web", "10.0.0.9", 8080);
        store.remove_endpoint("missing", "10.0.0.1", 8080);

        assert_eq!(store.endpoint_count("web"), 1);
    }

    #[test]
    fn listings_are_sorted_by_name() {
        let mut store = seeded();
        store
            .add_listener(Listener::tcp_proxy(ListenerSpec::new("api-l", "0.0.0.0", 9001), "api"))
            .expect("listener");
        store.add_cluster(spec("api", "api-l")).expect("cluster");

        let names: Vec<_> = store.clusters().iter().map(|c| c.name.clone()).collect();
        assert_eq!(names, vec!["api", "web"]);
        let names: Vec<_> = store.listeners().iter().map(|l| l.name.clone()).collect();
        assert_eq!(names, vec!["api-l", "web-l"]);
    }

    proptest! {
        #[test]
        fn removal_keeps_survivors_in_order(
            ports in proptest::collection::btree_set(1u32..65535, 1..16),
            pick in any::<prop::sample::Index>(),
        ) {
            let mut store = seeded();
            let ports: Vec<u32> = ports.into_iter().collect();
            for port in &ports {
                store.add_endpoint("web", "10.0.0.1", *port);
            }

            let removed = ports[pick.index(ports.len())];
            store.remove_endpoint("web", "10.0.0.1", removed);

            let expected: Vec<Endpoint> = ports
                .iter()
                .filter(|port| **port != removed)
                .map(|port| Endpoint::new("10.0.0.1", *port))
                .collect();
            let cluster = store.cluster("web").expect("cluster");
            prop_assert_eq!(&cluster.endpoints, &expected);
            prop_assert!(!store.exists_endpoint("web", "10.0.0.1", removed));
        }

        #[test]
        fn names_stay_unique_under_repeated_upserts(
            names in proptest::collection::vec("[a-c]{1,2}", 1..20),
        ) {
            let mut store = ConfigStore::new();
            for name in &names {
                store.add_cluster(spec(name, "shared-l")).expect("upsert");
            }
            let distinct: std::collections::HashSet<_> = names.iter().collect();
            prop_assert_eq!(store.cluster_count(), distinct.len());
        }
    }
}
