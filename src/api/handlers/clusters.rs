//! Cluster handlers
//!
//! Each mutation handler validates its body, converts it into domain specs and
//! hands it to the control plane, which owns locking and publication.

use axum::{
    extract::{Query, State},
    Json,
};
use tracing::instrument;
use validator::Validate;

use crate::api::{
    dto::{
        ClusterModificationRequest, ClusterNameQuery, ClusterRequest, ClusterView, CommonResponse,
        SnapshotView,
    },
    error::ApiError,
    routes::ApiState,
};
use crate::domain::ListenerSpec;
use crate::errors::MagplaneError;

#[instrument(skip(state, payload), fields(cluster_name = %payload.cluster.name, listener_name = %payload.listener.name))]
pub async fn create_cluster_handler(
    State(state): State<ApiState>,
    Json(payload): Json<ClusterRequest>,
) -> Result<Json<CommonResponse>, ApiError> {
    payload.validate()?;

    let listener = ListenerSpec::from(payload.listener);
    let cluster = payload.cluster.into_spec(listener.name.clone());

    let outcome = state.control_plane.create_or_attach_cluster(cluster, listener).await?;
    Ok(Json(CommonResponse { message: outcome.message }))
}

#[instrument(skip(state, payload), fields(cluster_name = %payload.cluster.name))]
pub async fn modify_cluster_handler(
    State(state): State<ApiState>,
    Json(payload): Json<ClusterModificationRequest>,
) -> Result<Json<CommonResponse>, ApiError> {
    payload.validate()?;

    // The binding is preserved by the control plane; the placeholder is replaced.
    let cluster = payload.cluster.into_spec(String::new());

    let outcome = state.control_plane.modify_cluster(cluster).await?;
    Ok(Json(CommonResponse { message: outcome.message }))
}

#[instrument(skip(state))]
pub async fn delete_cluster_handler(
    State(state): State<ApiState>,
    Query(query): Query<ClusterNameQuery>,
) -> Result<Json<CommonResponse>, ApiError> {
    if query.name.trim().is_empty() {
        return Err(ApiError::bad_request("cluster name is required"));
    }

    let outcome = state.control_plane.remove_cluster(&query.name).await?;
    Ok(Json(CommonResponse { message: outcome.message }))
}

pub async fn list_clusters_handler(State(state): State<ApiState>) -> Json<Vec<ClusterView>> {
    let clusters = state.control_plane.list_clusters().await;
    Json(clusters.into_iter().map(ClusterView::from).collect())
}

pub async fn snapshot_handler(
    State(state): State<ApiState>,
) -> Result<Json<SnapshotView>, ApiError> {
    let control_plane = &state.control_plane;
    let snapshot = control_plane
        .current_snapshot()
        .ok_or_else(|| MagplaneError::not_found("snapshot", control_plane.node_id()))?;

    Ok(Json(SnapshotView::new(control_plane.node_id(), &snapshot)))
}
