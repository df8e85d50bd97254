use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::{load_config, ConfigError};
use crate::geocode::{GeocodeError, Geocoder, GoogleGeocoder};
use crate::quota::StoreError;
use crate::web::{run_server, AppState};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("quota store error: {0}")]
    Store(#[from] StoreError),

    #[error("geocoder error: {0}")]
    Geocoder(#[from] GeocodeError),

    #[error("web server error: {0}")]
    WebServer(#[from] std::io::Error),
}

pub async fn run(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = match config_path {
        Some(path) => path,
        None => {
            eprintln!("Error: config not found");
            eprintln!("Searched locations:");
            eprintln!("  ~/.config/bulkgeo/config.yml");
            eprintln!("  /etc/bulkgeo/config.yml");
            eprintln!("\nUse --config <path> to specify a config file, or run 'bulkgeo config init' to generate one.");
            std::process::exit(1);
        }
    };

    serve(&config_path).await.map_err(|e| e.into())
}

async fn serve(config_path: &Path) -> Result<(), RunError> {
    info!(config_path = %config_path.display(), "Loading configuration");
    let config = load_config(config_path)?;

    let gate = super::build_gate(&config)?;
    if config.geocoder.api_key.is_none() {
        warn!("no geocoder API key configured, proxy requests will fail");
    }
    let geocoder: Arc<dyn Geocoder> = Arc::new(GoogleGeocoder::new(&config.geocoder)?);

    let state = AppState { gate, geocoder };
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        let _ = signal::ctrl_c().await;
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    info!(listen = %config.listen, "Starting web server, press Ctrl+C to shutdown");
    run_server(state, config.listen.clone(), shutdown_rx).await?;
    info!("Web server stopped");

    Ok(())
}
