use axum::{
    extract::{ConnectInfo, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::net::SocketAddr;
use tracing::warn;

use crate::geocode::{GeocodeError, GeocodeResponse};
use crate::quota::QuotaSnapshot;

use super::limiter::resolve_identity;
use super::server::AppState;

/// GET /health
pub async fn health_check() -> &'static str {
    "OK"
}

#[derive(Debug, Deserialize)]
pub struct QuotaQuery {
    /// Accepted for protocol parity; unused beyond presence.
    #[serde(default)]
    pub count: Option<u64>,
    /// Cache-busting nonce sent by clients; ignored.
    #[serde(default)]
    pub t: Option<String>,
}

/// GET /api/quota?count=&t=
pub async fn quota_check(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(_query): Query<QuotaQuery>,
) -> Json<QuotaSnapshot> {
    let identity = resolve_identity(&headers, Some(addr));
    Json(state.gate.info(&identity).await)
}

#[derive(Debug, Deserialize)]
pub struct GeocodeQuery {
    #[serde(default)]
    pub address: Option<String>,
}

/// GET /api/geocode?address=
///
/// Passes the upstream response through unmodified on success; maps a
/// missing address or a non-OK upstream status to 400 and a missing API key
/// or transport failure to 500.
pub async fn geocode_proxy(
    State(state): State<AppState>,
    Query(query): Query<GeocodeQuery>,
) -> Result<Json<GeocodeResponse>, ApiError> {
    let address = match query.address.as_deref().map(str::trim) {
        Some(address) if !address.is_empty() => address.to_string(),
        _ => return Err(ApiError::BadRequest("Missing address parameter".to_string())),
    };

    match state.geocoder.geocode(&address).await {
        Ok(response) if response.status == "OK" => Ok(Json(response)),
        Ok(response) => Err(ApiError::BadRequest(
            response
                .error_message
                .unwrap_or_else(|| "Geocoding failed".to_string()),
        )),
        Err(GeocodeError::MissingApiKey) => Err(ApiError::InternalError(
            "Missing geocoding API key".to_string(),
        )),
        Err(error) => {
            warn!(%error, "geocoding proxy request failed");
            Err(ApiError::InternalError("Server error".to_string()))
        }
    }
}

// Error handling
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
