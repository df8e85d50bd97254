use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use tracing::info;

use crate::quota::UNKNOWN_IDENTITY;

use super::server::AppState;

/// Resolves the quota identity for a request: the first `x-forwarded-for`
/// entry, else the peer address, else the shared "unknown" sentinel. Never
/// fails the request.
pub fn resolve_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    match peer {
        Some(addr) => addr.ip().to_string(),
        None => UNKNOWN_IDENTITY.to_string(),
    }
}

/// Ingress filter for the upstream-proxying routes.
///
/// The admit-or-reject decision and the increment both happen before the
/// request reaches the upstream collaborator, so the counter reflects
/// attempted calls, not just successful ones.
pub async fn quota_middleware(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let identity = resolve_identity(request.headers(), Some(addr));

    let snapshot = state.gate.info(&identity).await;
    if snapshot.is_limited {
        info!(
            %identity,
            path = %request.uri().path(),
            reset_at = %snapshot.reset_at,
            "rejecting quota-limited request"
        );
        let body = serde_json::json!({
            "error": "Rate limit exceeded",
            "message": "Daily request limit reached. Please try again tomorrow.",
            "resetAt": snapshot.reset_at,
        });
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        apply_rate_headers(
            response.headers_mut(),
            snapshot.limit,
            0,
            snapshot.reset_at,
        );
        return response;
    }

    state.gate.increment(&identity).await;
    let snapshot = state.gate.info(&identity).await;

    let mut response = next.run(request).await;
    apply_rate_headers(
        response.headers_mut(),
        snapshot.limit,
        snapshot.remaining,
        snapshot.reset_at,
    );
    response
}

fn apply_rate_headers(
    headers: &mut HeaderMap,
    limit: u64,
    remaining: u64,
    reset_at: DateTime<Utc>,
) {
    let values = [
        ("x-ratelimit-limit", limit.to_string()),
        ("x-ratelimit-remaining", remaining.to_string()),
        ("x-ratelimit-reset", reset_at.timestamp().to_string()),
    ];
    for (name, value) in values {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        "10.0.0.9:55555".parse().unwrap()
    }

    #[test]
    fn test_identity_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        assert_eq!(resolve_identity(&headers, Some(peer())), "203.0.113.7");
    }

    #[test]
    fn test_identity_falls_back_to_peer_address() {
        let headers = HeaderMap::new();
        assert_eq!(resolve_identity(&headers, Some(peer())), "10.0.0.9");
    }

    #[test]
    fn test_identity_falls_back_to_unknown() {
        let headers = HeaderMap::new();
        assert_eq!(resolve_identity(&headers, None), UNKNOWN_IDENTITY);
    }

    #[test]
    fn test_blank_forwarded_header_is_skipped() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "   ".parse().unwrap());
        assert_eq!(resolve_identity(&headers, Some(peer())), "10.0.0.9");
    }

    #[test]
    fn test_rate_headers_are_applied() {
        let mut headers = HeaderMap::new();
        let reset_at = Utc::now();
        apply_rate_headers(&mut headers, 50, 12, reset_at);

        assert_eq!(headers["x-ratelimit-limit"], "50");
        assert_eq!(headers["x-ratelimit-remaining"], "12");
        assert_eq!(
            headers["x-ratelimit-reset"],
            reset_at.timestamp().to_string().as_str()
        );
    }
}
