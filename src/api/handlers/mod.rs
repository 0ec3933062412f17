pub mod backends;
pub mod clusters;
pub mod health;

pub use backends::{add_backend_handler, remove_backend_handler};
pub use clusters::{
    create_cluster_handler, delete_cluster_handler, list_clusters_handler, modify_cluster_handler,
    snapshot_handler,
};
pub use health::health_handler;
