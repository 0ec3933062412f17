//! Discovery cache boundary.
//!
//! The publisher hands each finished snapshot to a [`DiscoveryCache`], which
//! serves it to the proxies of a node. [`SnapshotCache`] is the in-process
//! implementation: a `DashMap` of the latest snapshot per node plus a
//! broadcast channel that notifies subscribers of every accepted update.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::errors::{MagplaneError, Result};
use crate::xds::snapshot::Snapshot;

const UPDATE_CHANNEL_CAPACITY: usize = 128;

/// Notification emitted after a snapshot is accepted.
#[derive(Debug, Clone)]
pub struct SnapshotUpdate {
    pub node_id: String,
    pub snapshot: Arc<Snapshot>,
}

pub trait DiscoveryCache: Send + Sync {
    /// Store `snapshot` as the current view for `node_id`.
    ///
    /// Fails with [`MagplaneError::Publish`] when the snapshot cannot be
    /// accepted, for example because its version does not advance.
    fn set_snapshot(&self, node_id: &str, snapshot: Snapshot) -> Result<Arc<Snapshot>>;

    fn snapshot(&self, node_id: &str) -> Option<Arc<Snapshot>>;

    fn subscribe(&self) -> broadcast::Receiver<SnapshotUpdate>;
}

#[derive(Debug)]
pub struct SnapshotCache {
    snapshots: DashMap<String, Arc<Snapshot>>,
    updates: broadcast::Sender<SnapshotUpdate>,
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotCache {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self { snapshots: DashMap::new(), updates }
    }

    pub fn nodes(&self) -> Vec<String> {
        self.snapshots.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }
}

impl DiscoveryCache for SnapshotCache {
    fn set_snapshot(&self, node_id: &str, snapshot: Snapshot) -> Result<Arc<Snapshot>> {
        if node_id.trim().is_empty() {
            return Err(MagplaneError::publish("node id cannot be empty", node_id));
        }

        let snapshot = Arc::new(snapshot);

        // The entry guard is released at the end of this match, before notifying.
        match self.snapshots.entry(node_id.to_string()) {
            Entry::Occupied(mut current) => {
                let current_version = current.get().version();
                if snapshot.version() <= current_version {
                    warn!(
                        node_id,
                        current = %current_version,
                        rejected = %snapshot.version(),
                        "Rejected snapshot that does not advance the version"
                    );
                    return Err(MagplaneError::publish(
                        format!(
                            "snapshot version {} does not advance past {}",
                            snapshot.version(),
                            current_version
                        ),
                        node_id,
                    ));
                }
                current.insert(Arc::clone(&snapshot));
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&snapshot));
            }
        }

        debug!(
            node_id,
            version = %snapshot.version(),
            clusters = snapshot.clusters().len(),
            listeners = snapshot.listeners().len(),
            "Stored snapshot"
        );

        if self
            .updates
            .send(SnapshotUpdate { node_id: node_id.to_string(), snapshot: Arc::clone(&snapshot) })
            .is_err()
        {
            trace!(node_id, "No snapshot subscribers");
        }

        Ok(snapshot)
    }

    fn snapshot(&self, node_id: &str) -> Option<Arc<Snapshot>> {
        self.snapshots.get(node_id).map(|entry| Arc::clone(entry.value()))
    }

    fn subscribe(&self) -> broadcast::Receiver<SnapshotUpdate> {
        self.updates.subscribe()
    }
}
