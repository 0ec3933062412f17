//! Rebuild-and-publish pipeline.
//!
//! Every mutation rebuilds the complete resource set from the store, assigns
//! the next version, checks the result for consistency and hands it to the
//! discovery cache. There is no incremental diffing.

use std::sync::Arc;

use tracing::{error, info};

use crate::errors::{MagplaneError, Result};
use crate::observability::metrics;
use crate::storage::ConfigStore;
use crate::xds::cache::DiscoveryCache;
use crate::xds::resources::{build_cluster, build_listener, build_load_assignment};
use crate::xds::snapshot::Snapshot;
use crate::xds::version::{SnapshotVersion, VersionCounter};
use crate::xds_span;

pub struct SnapshotPublisher {
    node_id: String,
    cache: Arc<dyn DiscoveryCache>,
    versions: VersionCounter,
}

impl std::fmt::Debug for SnapshotPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotPublisher")
            .field("node_id", &self.node_id)
            .field("versions", &self.versions)
            .finish()
    }
}

impl SnapshotPublisher {
    pub fn new(node_id: impl Into<String>, cache: Arc<dyn DiscoveryCache>) -> Self {
        Self::with_versions(node_id, cache, VersionCounter::random())
    }

    pub fn with_versions(
        node_id: impl Into<String>,
        cache: Arc<dyn DiscoveryCache>,
        versions: VersionCounter,
    ) -> Self {
        Self { node_id: node_id.into(), cache, versions }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Version of the last successfully published snapshot, or the seed.
    pub fn last_version(&self) -> SnapshotVersion {
        self.versions.last()
    }

    pub fn cache(&self) -> &Arc<dyn DiscoveryCache> {
        &self.cache
    }

    /// Build a snapshot from `store` and publish it.
    ///
    /// A consistency failure leaves the previous snapshot in effect and does
    /// not consume a version. A cache rejection is returned as
    /// [`MagplaneError::Publish`], which callers must treat as fatal. So is
    /// running out of versions after [`SnapshotVersion::LAST`].
    pub fn sync(&mut self, store: &ConfigStore) -> Result<Arc<Snapshot>> {
        let Some(version) = self.versions.peek_next() else {
            error!(last = %self.versions.last(), "Snapshot version space is exhausted");
            metrics::record_publish_failure("versions_exhausted");
            return Err(MagplaneError::publish(
                format!("no snapshot version follows {}", self.versions.last()),
                self.node_id.clone(),
            ));
        };
        let span = xds_span!("publish_snapshot", self.node_id, version = %version);
        let _guard = span.enter();

        let snapshot = build_snapshot(store, version);

        if let Err(err) = check_bindings(store).and_then(|_| snapshot.check_consistency()) {
            error!(
                error = %err,
                clusters = ?snapshot.clusters().iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
                listeners = ?snapshot.listeners().iter().map(|l| l.name.as_str()).collect::<Vec<_>>(),
                load_assignments = ?snapshot
                    .load_assignments()
                    .iter()
                    .map(|a| a.cluster_name.as_str())
                    .collect::<Vec<_>>(),
                "Snapshot failed consistency check; keeping previous snapshot"
            );
            metrics::record_publish_failure("consistency");
            return Err(err);
        }

        let published = self.cache.set_snapshot(&self.node_id, snapshot).map_err(|err| {
            error!(error = %err, "Discovery cache rejected snapshot");
            metrics::record_publish_failure("cache_rejected");
            match err {
                MagplaneError::Publish { .. } => err,
                other => MagplaneError::publish(other.to_string(), self.node_id.clone()),
            }
        })?;

        self.versions.commit(version);
        metrics::record_snapshot_published(version, store);

        info!(
            phase = "publish",
            version = %version,
            clusters = published.clusters().len(),
            listeners = published.listeners().len(),
            endpoints = store.clusters().iter().map(|c| c.endpoints.len()).sum::<usize>(),
            "Published snapshot"
        );

        Ok(published)
    }
}

fn build_snapshot(store: &ConfigStore, version: SnapshotVersion) -> Snapshot {
    let clusters = store.clusters();
    let listeners = store.listeners();

    Snapshot::new(
        version,
        clusters.iter().map(|c| build_cluster(c)).collect(),
        listeners.iter().map(|l| build_listener(l)).collect(),
        clusters.iter().map(|c| build_load_assignment(&c.name, &c.endpoints)).collect(),
    )
}

/// Every cluster must be bound to a listener present in the store.
fn check_bindings(store: &ConfigStore) -> Result<()> {
    let dangling: Vec<String> = store
        .clusters()
        .iter()
        .filter(|c| !store.exists_listener(&c.listener_name))
        .map(|c| format!("cluster '{}' is bound to unknown listener '{}'", c.name, c.listener_name))
        .collect();

    if dangling.is_empty() {
        Ok(())
    } else {
        Err(MagplaneError::consistency(dangling.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ClusterSpec, HealthCheckPolicy, Listener, ListenerSpec};
    use crate::xds::cache::SnapshotCache;
    use tokio::sync::broadcast;

    fn web_store() -> ConfigStore {
        let mut store = ConfigStore::new();
        store
            .add_listener(Listener::tcp_proxy(ListenerSpec::new("web-l", "0.0.0.0", 9000), "web"))
            .expect("listener");
        store
            .add_cluster(ClusterSpec::new("web", "web-l", HealthCheckPolicy::http("/healthz")))
            .expect("cluster");
        store.add_endpoint("web", "10.0.0.1", 8080);
        store
    }

    fn publisher(cache: Arc<dyn DiscoveryCache>) -> SnapshotPublisher {
        SnapshotPublisher::with_versions("test-id", cache, VersionCounter::with_seed(100))
    }

    #[test]
    fn publishes_complete_snapshot() {
        let cache = Arc::new(SnapshotCache::new());
        let mut publisher = publisher(cache.clone());

        let snapshot = publisher.sync(&web_store()).expect("sync");

        assert_eq!(snapshot.version(), SnapshotVersion::new(0, 101));
        assert!(snapshot.cluster("web").is_some());
        assert!(snapshot.listener("web-l").is_some());
        assert_eq!(snapshot.load_assignment("web").map(|a| a.endpoints[0].lb_endpoints.len()), Some(1));
        assert_eq!(publisher.last_version(), SnapshotVersion::new(0, 101));
        assert!(cache.snapshot("test-id").is_some());
    }

    #[test]
    fn versions_strictly_increase() {
        let cache = Arc::new(SnapshotCache::new());
        let mut publisher = publisher(cache);
        let store = web_store();

        let first = publisher.sync(&store).expect("first").version();
        let second = publisher.sync(&store).expect("second").version();
        assert!(second > first);
    }

    #[test]
    fn unbound_cluster_fails_consistency_without_consuming_version() {
        let cache = Arc::new(SnapshotCache::new());
        let mut publisher = publisher(cache.clone());
        let mut store = ConfigStore::new();
        store
            .add_cluster(ClusterSpec::new("web", "missing-l", HealthCheckPolicy::http("/")))
            .expect("cluster");

        let error = publisher.sync(&store).unwrap_err();
        assert!(matches!(error, MagplaneError::Consistency { .. }));
        assert!(error.to_string().contains("unknown listener 'missing-l'"));
        assert_eq!(publisher.last_version(), SnapshotVersion::new(0, 100));
        assert!(cache.snapshot("test-id").is_none());
    }

    struct RejectingCache;

    impl DiscoveryCache for RejectingCache {
        fn set_snapshot(&self, _node_id: &str, _snapshot: Snapshot) -> Result<Arc<Snapshot>> {
            Err(MagplaneError::internal("cache unavailable"))
        }

        fn snapshot(&self, _node_id: &str) -> Option<Arc<Snapshot>> {
            None
        }

        fn subscribe(&self) -> broadcast::Receiver<crate::xds::cache::SnapshotUpdate> {
            broadcast::channel(1).1
        }
    }

    #[test]
    fn cache_rejection_is_a_fatal_publish_error() {
        let mut publisher = publisher(Arc::new(RejectingCache));

        let error = publisher.sync(&web_store()).unwrap_err();
        assert!(matches!(error, MagplaneError::Publish { .. }));
        assert!(error.is_fatal());
        assert_eq!(publisher.last_version(), SnapshotVersion::new(0, 100));
    }

    #[test]
    fn exhausted_versions_are_a_fatal_publish_error() {
        let cache = Arc::new(SnapshotCache::new());
        let mut publisher = SnapshotPublisher::with_versions(
            "test-id",
            cache.clone(),
            VersionCounter::starting_at(SnapshotVersion::LAST),
        );

        let error = publisher.sync(&web_store()).unwrap_err();
        assert!(matches!(error, MagplaneError::Publish { .. }));
        assert!(error.is_fatal());
        assert_eq!(publisher.last_version(), SnapshotVersion::LAST);
        assert!(cache.snapshot("test-id").is_none());
    }

    #[test]
    fn empty_store_publishes_empty_snapshot() {
        let mut publisher = publisher(Arc::new(SnapshotCache::new()));
        let snapshot = publisher.sync(&ConfigStore::new()).expect("sync");
        assert!(snapshot.is_empty());
    }
}
