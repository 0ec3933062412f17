use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::observability::trace_http_requests;
use crate::services::ControlPlane;

use super::handlers::{
    add_backend_handler, create_cluster_handler, delete_cluster_handler, health_handler,
    list_clusters_handler, modify_cluster_handler, remove_backend_handler, snapshot_handler,
};

#[derive(Clone)]
pub struct ApiState {
    pub control_plane: Arc<ControlPlane>,
}

pub fn build_router(control_plane: Arc<ControlPlane>) -> Router {
    let api_state = ApiState { control_plane };

    Router::new()
        .route(
            "/cluster",
            post(create_cluster_handler).put(modify_cluster_handler).delete(delete_cluster_handler),
        )
        .route("/backend", post(add_backend_handler).delete(remove_backend_handler))
        .route("/clusters", get(list_clusters_handler))
        .route("/snapshot", get(snapshot_handler))
        .route("/health", get(health_handler))
        .with_state(api_state)
        .layer(middleware::from_fn(trace_http_requests))
}
