//! Mutation protocol of the control plane.
//!
//! Each operation runs inside one critical section: existence checks, staged
//! writes, snapshot rebuild and publication all happen while the lock is held.
//! Writes are applied to a copy of the store and committed only when the
//! snapshot was published, so a failed operation leaves no trace.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::bootstrap::BootstrapEntities;
use crate::domain::{Cluster, ClusterSpec, Listener, ListenerSpec};
use crate::errors::{MagplaneError, Result};
use crate::observability::metrics;
use crate::storage::ConfigStore;
use crate::xds::{DiscoveryCache, Snapshot, SnapshotPublisher, SnapshotVersion};

/// Result of a successful mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationOutcome {
    pub message: String,
    pub entity: String,
    pub version: SnapshotVersion,
}

#[derive(Debug)]
struct State {
    store: ConfigStore,
    publisher: SnapshotPublisher,
}

/// Owner of the configuration store and the snapshot publisher.
pub struct ControlPlane {
    state: Mutex<State>,
    cache: Arc<dyn DiscoveryCache>,
    node_id: String,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for ControlPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlPlane").field("node_id", &self.node_id).finish_non_exhaustive()
    }
}

impl ControlPlane {
    pub fn new(publisher: SnapshotPublisher, shutdown: CancellationToken) -> Self {
        let cache = Arc::clone(publisher.cache());
        let node_id = publisher.node_id().to_string();
        Self {
            state: Mutex::new(State { store: ConfigStore::new(), publisher }),
            cache,
            node_id,
            shutdown,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Token cancelled when a fatal publish error occurs.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Snapshot currently served to the proxies of this node.
    pub fn current_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.cache.snapshot(&self.node_id)
    }

    pub async fn current_version(&self) -> SnapshotVersion {
        self.state.lock().await.publisher.last_version()
    }

    /// Populate the empty store from a bootstrap description and publish the
    /// first snapshot.
    #[instrument(skip(self, entities), fields(listeners = entities.listeners.len(), clusters = entities.clusters.len()))]
    pub async fn bootstrap(&self, entities: BootstrapEntities) -> Result<MutationOutcome> {
        self.mutate("bootstrap", move |store| {
            if !store.is_empty() {
                return Err(MagplaneError::conflict(
                    "bootstrap requires an empty configuration store",
                    "store",
                ));
            }

            let count = entities.clusters.len();
            for listener in entities.listeners {
                store.add_listener(listener)?;
            }
            for cluster in entities.clusters {
                let name = cluster.name.clone();
                let endpoints = cluster.endpoints.clone();
                store.add_cluster(cluster.spec())?;
                for endpoint in endpoints {
                    store.add_endpoint(&name, &endpoint.upstream_host, endpoint.upstream_port);
                }
            }
            Ok(("bootstrap".to_string(), format!("bootstrap : {} clusters loaded.", count)))
        })
        .await
    }

    /// Publish the current store contents again.
    pub async fn sync(&self) -> Result<MutationOutcome> {
        self.mutate("sync", |_| Ok(("snapshot".to_string(), "snapshot is synchronized.".to_string())))
            .await
    }

    /// Create the listener and cluster when absent and bind them together.
    ///
    /// Repeating a request for an existing, identically bound pair succeeds
    /// without changing anything but the snapshot version.
    #[instrument(skip(self, cluster, listener), fields(cluster_name = %cluster.name, listener_name = %listener.name))]
    pub async fn create_or_attach_cluster(
        &self,
        cluster: ClusterSpec,
        listener: ListenerSpec,
    ) -> Result<MutationOutcome> {
        let mut cluster = cluster.normalized();
        cluster.listener_name = listener.name.clone();
        cluster.validate()?;

        let listener = Listener::tcp_proxy(listener, cluster.name.clone());
        listener.validate()?;

        self.mutate("create_or_attach_cluster", move |store| {
            let cluster_name = cluster.name.clone();

            match store.listener(&listener.name) {
                Some(existing) if existing.target_cluster() != Some(cluster_name.as_str()) => {
                    return Err(MagplaneError::conflict(
                        format!(
                            "listener '{}' already forwards to cluster '{}'",
                            existing.name,
                            existing.target_cluster().unwrap_or_default()
                        ),
                        "listener",
                    ));
                }
                Some(_) => {}
                None => store.add_listener(listener)?,
            }

            match store.cluster(&cluster_name) {
                Some(existing) if existing.listener_name != cluster.listener_name => {
                    return Err(MagplaneError::conflict(
                        format!(
                            "cluster '{}' is already bound to listener '{}'",
                            cluster_name, existing.listener_name
                        ),
                        "cluster",
                    ));
                }
                Some(_) => {}
                None => store.add_cluster(cluster)?,
            }

            Ok((cluster_name.clone(), format!("cluster : {} is created.", cluster_name)))
        })
        .await
    }

    /// Overwrite the tunables of an existing cluster.
    #[instrument(skip(self, cluster), fields(cluster_name = %cluster.name))]
    pub async fn modify_cluster(&self, cluster: ClusterSpec) -> Result<MutationOutcome> {
        let cluster = cluster.normalized();
        if cluster.name.trim().is_empty() {
            return Err(MagplaneError::validation_field("cluster name is required", "name"));
        }

        self.mutate("modify_cluster", move |store| {
            let mut cluster = cluster;
            let current = store
                .cluster(&cluster.name)
                .ok_or_else(|| MagplaneError::not_found("cluster", cluster.name.clone()))?;
            cluster.listener_name = current.listener_name.clone();

            let name = cluster.name.clone();
            store.update_cluster(cluster)?;
            Ok((name.clone(), format!("cluster : {} is modified.", name)))
        })
        .await
    }

    /// Remove a cluster together with its listener.
    #[instrument(skip(self))]
    pub async fn remove_cluster(&self, name: &str) -> Result<MutationOutcome> {
        if name.trim().is_empty() {
            return Err(MagplaneError::validation_field("cluster name is required", "name"));
        }
        let name = name.to_string();

        self.mutate("remove_cluster", move |store| {
            if !store.exists_cluster(&name) {
                return Err(MagplaneError::not_found("cluster", name.clone()));
            }
            store.remove_listener(&name);
            store.remove_cluster(&name);
            Ok((name.clone(), format!("cluster : {} is deleted.", name)))
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn add_backend(&self, cluster: &str, host: &str, port: u32) -> Result<MutationOutcome> {
        validate_backend(cluster, host, port)?;
        let (cluster, host) = (cluster.to_string(), host.to_string());

        self.mutate("add_backend", move |store| {
            if !store.exists_cluster(&cluster) {
                return Err(MagplaneError::not_found("cluster", cluster.clone()));
            }
            if store.exists_endpoint(&cluster, &host, port) {
                return Err(MagplaneError::conflict(
                    format!("endpoint {}:{} already exists in cluster '{}'", host, port, cluster),
                    "endpoint",
                ));
            }
            store.add_endpoint(&cluster, &host, port);
            Ok((format!("{}:{}", host, port), format!("Backend : {}:{} is added.", host, port)))
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn remove_backend(
        &self,
        cluster: &str,
        host: &str,
        port: u32,
    ) -> Result<MutationOutcome> {
        validate_backend(cluster, host, port)?;
        let (cluster, host) = (cluster.to_string(), host.to_string());

        self.mutate("remove_backend", move |store| {
            if !store.exists_cluster(&cluster) {
                return Err(MagplaneError::not_found("cluster", cluster.clone()));
            }
            if !store.exists_endpoint(&cluster, &host, port) {
                return Err(MagplaneError::not_found("endpoint", format!("{}:{}", host, port)));
            }
            store.remove_endpoint(&cluster, &host, port);
            Ok((format!("{}:{}", host, port), format!("Backend : {}:{} is removed.", host, port)))
        })
        .await
    }

    pub async fn cluster_view(&self, name: &str) -> Option<Cluster> {
        self.state.lock().await.store.cluster(name).cloned()
    }

    pub async fn list_clusters(&self) -> Vec<Cluster> {
        self.state.lock().await.store.clusters().into_iter().cloned().collect()
    }

    pub async fn list_listeners(&self) -> Vec<Listener> {
        self.state.lock().await.store.listeners().into_iter().cloned().collect()
    }

    pub async fn exists_cluster(&self, name: &str) -> bool {
        self.state.lock().await.store.exists_cluster(name)
    }

    pub async fn exists_listener(&self, name: &str) -> bool {
        self.state.lock().await.store.exists_listener(name)
    }

    pub async fn exists_endpoint(&self, cluster: &str, host: &str, port: u32) -> bool {
        self.state.lock().await.store.exists_endpoint(cluster, host, port)
    }

    /// Run `apply` against a staged copy of the store, publish the result and
    /// commit it. Returns `(entity, message)` from `apply` with the version.
    async fn mutate<F>(&self, operation: &'static str, apply: F) -> Result<MutationOutcome>
    where
        F: FnOnce(&mut ConfigStore) -> Result<(String, String)>,
    {
        let mut state = self.state.lock().await;
        let mut staged = state.store.clone();

        let outcome = match apply(&mut staged) {
            Ok((entity, message)) => match state.publisher.sync(&staged) {
                Ok(snapshot) => Ok(MutationOutcome { message, entity, version: snapshot.version() }),
                Err(err) => Err(err),
            },
            Err(err) => Err(err),
        };

        match outcome {
            Ok(outcome) => {
                state.store = staged;
                metrics::record_mutation(operation, true);
                info!(operation, entity = %outcome.entity, version = %outcome.version, "Mutation applied");
                Ok(outcome)
            }
            Err(err) => {
                metrics::record_mutation(operation, false);
                if err.is_fatal() {
                    error!(operation, error = %err, "Fatal publish failure; shutting down");
                    self.shutdown.cancel();
                } else {
                    warn!(operation, error = %err, kind = %err.kind(), "Mutation rejected");
                }
                Err(err)
            }
        }
    }
}

fn validate_backend(cluster: &str, host: &str, port: u32) -> Result<()> {
    if cluster.trim().is_empty() {
        return Err(MagplaneError::validation_field("cluster name is required", "cluster_name"));
    }
    if host.trim().is_empty() {
        return Err(MagplaneError::validation_field("backend address is required", "ip"));
    }
    if port == 0 || port > u32::from(u16::MAX) {
        return Err(MagplaneError::validation_field(
            format!("backend port {} must be between 1 and 65535", port),
            "port",
        ));
    }
    Ok(())
}
