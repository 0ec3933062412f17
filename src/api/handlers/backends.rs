use axum::{extract::State, Json};
use tracing::instrument;
use validator::Validate;

use crate::api::{
    dto::{BackendRequest, CommonResponse},
    error::ApiError,
    routes::ApiState,
};

#[instrument(skip(state, payload), fields(cluster_name = %payload.cluster_name, ip = %payload.ip, port = payload.port))]
pub async fn add_backend_handler(
    State(state): State<ApiState>,
    Json(payload): Json<BackendRequest>,
) -> Result<Json<CommonResponse>, ApiError> {
    payload.validate()?;

    let outcome =
        state.control_plane.add_backend(&payload.cluster_name, &payload.ip, payload.port).await?;
    Ok(Json(CommonResponse { message: outcome.message }))
}

#[instrument(skip(state, payload), fields(cluster_name = %payload.cluster_name, ip = %payload.ip, port = payload.port))]
pub async fn remove_backend_handler(
    State(state): State<ApiState>,
    Json(payload): Json<BackendRequest>,
) -> Result<Json<CommonResponse>, ApiError> {
    payload.validate()?;

    let outcome = state
        .control_plane
        .remove_backend(&payload.cluster_name, &payload.ip, payload.port)
        .await?;
    Ok(Json(CommonResponse { message: outcome.message }))
}
