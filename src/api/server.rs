use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{config::ApiServerConfig, errors::MagplaneError, services::ControlPlane};

use super::routes::build_router;

/// Serve the management API until ctrl-c or until `shutdown` is cancelled.
pub async fn start_api_server(
    config: ApiServerConfig,
    control_plane: Arc<ControlPlane>,
    shutdown: CancellationToken,
) -> crate::Result<()> {
    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .map_err(|e| MagplaneError::config(format!("Invalid API address: {}", e)))?;

    let router = build_router(control_plane);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| MagplaneError::transport(format!("Failed to bind API server: {}", e)))?;

    info!(address = %addr, "Starting HTTP API server");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        warn!(error = %e, "API server shutdown listener failed");
                    }
                }
                _ = shutdown.cancelled() => {
                    warn!("Shutdown requested by the control plane");
                }
            }
        })
        .await
        .map_err(|e| MagplaneError::transport(format!("API server error: {}", e)))?;

    info!("API server shutdown completed");
    Ok(())
}
