use axum::{middleware, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use crate::geocode::Geocoder;
use crate::quota::QuotaGate;

use super::api::{geocode_proxy, health_check, quota_check};
use super::limiter::quota_middleware;

/// Shared state for the web API
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<QuotaGate>,
    pub geocoder: Arc<dyn Geocoder>,
}

/// Builds the application router. The quota filter wraps only the
/// upstream-proxying routes; the quota endpoint itself stays un-gated.
pub fn router(state: AppState) -> Router {
    let proxied = Router::new()
        .route("/geocode-proxy", get(geocode_proxy))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            quota_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/quota-check", get(quota_check))
        .merge(proxied)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the web server with the given state and listen address
pub async fn run_server(
    state: AppState,
    listen: String,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), std::io::Error> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&listen).await?;
    tracing::info!(addr = %listener.local_addr()?, "web server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = shutdown_rx.wait_for(|&v| v).await;
        tracing::info!("Web server shutting down gracefully");
    })
    .await
}
