use std::sync::Arc;

use clap::Parser;
use magplane::{
    api::start_api_server,
    bootstrap::load_bootstrap,
    cli::Cli,
    observability::{init_observability, log_config_info},
    services::ControlPlane,
    xds::{DiscoveryCache, SnapshotCache, SnapshotPublisher},
    Config, Result, APP_NAME, VERSION,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists; must happen before any config is read
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let cli = Cli::parse();
    let config = Config::load(&cli.config_file)?.with_overrides(cli.overrides())?;

    init_observability(&config.observability)?;
    info!(app_name = APP_NAME, version = VERSION, "Starting magplane control plane");
    log_config_info(&config);

    let shutdown = CancellationToken::new();
    let cache: Arc<dyn DiscoveryCache> = Arc::new(SnapshotCache::new());
    let publisher = SnapshotPublisher::new(config.node_id.clone(), cache);
    let control_plane = Arc::new(ControlPlane::new(publisher, shutdown.clone()));

    // The API only binds once the initial snapshot is published.
    let initial = match config.bootstrap_path.as_deref() {
        Some(path) => {
            info!(path, "Loading bootstrap configuration");
            match load_bootstrap(path).and_then(|bootstrap| bootstrap.into_entities()) {
                Ok(entities) => control_plane.bootstrap(entities).await,
                Err(e) => Err(e),
            }
        }
        None => {
            info!("No bootstrap configuration given; starting empty");
            control_plane.sync().await
        }
    };

    match initial {
        Ok(outcome) => info!(version = %outcome.version, "Initial snapshot published"),
        Err(e) => {
            error!(error = %e, "Failed to publish initial configuration");
            std::process::exit(1);
        }
    }

    if let Err(e) = start_api_server(config.api.clone(), control_plane, shutdown.clone()).await {
        error!("Management API terminated with error: {}", e);
        std::process::exit(1);
    }

    if shutdown.is_cancelled() {
        error!("Control plane stopped after a fatal publish failure");
        std::process::exit(1);
    }

    info!("Control plane shutdown completed");
    Ok(())
}
