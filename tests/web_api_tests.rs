use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bulkgeo::config::GeocoderConfig;
use bulkgeo::geocode::{
    AddressComponent, GeocodeCandidate, GeocodeError, GeocodeResponse, Geocoder, Geometry,
    GoogleGeocoder, Location,
};
use bulkgeo::quota::{MemoryStore, QuotaGate};
use bulkgeo::web::{router, AppState};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

struct StubGeocoder {
    response: GeocodeResponse,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Geocoder for StubGeocoder {
    async fn geocode(&self, _address: &str) -> Result<GeocodeResponse, GeocodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}

fn ok_response() -> GeocodeResponse {
    GeocodeResponse {
        status: "OK".to_string(),
        results: vec![GeocodeCandidate {
            place_id: "stub-place".to_string(),
            formatted_address: Some("Stub Street 1, Stubtown".to_string()),
            address_components: vec![AddressComponent {
                long_name: "Stub Street".to_string(),
                short_name: "SS".to_string(),
                types: vec!["route".to_string()],
            }],
            geometry: Geometry {
                location: Location {
                    lat: 48.0,
                    lng: 11.0,
                },
            },
        }],
        error_message: None,
    }
}

fn state_with(limit: u64, response: GeocodeResponse) -> (AppState, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let state = AppState {
        gate: Arc::new(QuotaGate::new(Arc::new(MemoryStore::new()), limit, DAY)),
        geocoder: Arc::new(StubGeocoder {
            response,
            calls: calls.clone(),
        }),
    };
    (state, calls)
}

async fn spawn_app(state: AppState) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(state);

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    addr
}

#[tokio::test]
async fn test_health_endpoint() {
    let (state, _) = state_with(5, ok_response());
    let addr = spawn_app(state).await;

    let response = reqwest::get(format!("http://{}/health", addr)).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_quota_endpoint_reports_fresh_window() {
    let (state, _) = state_with(5, ok_response());
    let addr = spawn_app(state).await;

    let response = reqwest::get(format!("http://{}/quota-check?count=1&t=12345", addr))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let json: serde_json::Value = response.json().await.unwrap();
    assert_eq!(json["used"], 0);
    assert_eq!(json["limit"], 5);
    assert_eq!(json["remaining"], 5);
    assert_eq!(json["isLimited"], false);
    assert!(json["resetAt"].is_string());
}

#[tokio::test]
async fn test_proxy_passes_response_through_with_rate_headers() {
    let (state, calls) = state_with(5, ok_response());
    let addr = spawn_app(state).await;

    let response = reqwest::get(format!("http://{}/geocode-proxy?address=Stub+Street", addr))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["x-ratelimit-limit"], "5");
    assert_eq!(response.headers()["x-ratelimit-remaining"], "4");
    assert!(response.headers().contains_key("x-ratelimit-reset"));

    let json: serde_json::Value = response.json().await.unwrap();
    assert_eq!(json["status"], "OK");
    assert_eq!(json["results"][0]["place_id"], "stub-place");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_proxy_rejects_after_ceiling() {
    let (state, calls) = state_with(2, ok_response());
    let addr = spawn_app(state).await;
    let url = format!("http://{}/geocode-proxy?address=x", addr);

    for _ in 0..2 {
        let response = reqwest::get(&url).await.unwrap();
        assert_eq!(response.status(), 200);
    }

    let response = reqwest::get(&url).await.unwrap();
    assert_eq!(response.status(), 429);
    assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
    assert_eq!(response.headers()["x-ratelimit-limit"], "2");

    let json: serde_json::Value = response.json().await.unwrap();
    assert_eq!(json["error"], "Rate limit exceeded");
    assert!(json["resetAt"].is_string());

    // The rejected request never reached the upstream collaborator
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_quota_endpoint_does_not_consume_quota() {
    let (state, _) = state_with(3, ok_response());
    let addr = spawn_app(state).await;

    for _ in 0..5 {
        reqwest::get(format!("http://{}/quota-check", addr)).await.unwrap();
    }

    let response = reqwest::get(format!("http://{}/quota-check", addr))
        .await
        .unwrap();
    let json: serde_json::Value = response.json().await.unwrap();
    assert_eq!(json["used"], 0);
}

#[tokio::test]
async fn test_proxy_counts_attempts_in_quota() {
    let (state, _) = state_with(5, ok_response());
    let addr = spawn_app(state).await;

    reqwest::get(format!("http://{}/geocode-proxy?address=x", addr))
        .await
        .unwrap();
    reqwest::get(format!("http://{}/geocode-proxy?address=y", addr))
        .await
        .unwrap();

    let response = reqwest::get(format!("http://{}/quota-check", addr))
        .await
        .unwrap();
    let json: serde_json::Value = response.json().await.unwrap();
    assert_eq!(json["used"], 2);
    assert_eq!(json["remaining"], 3);
}

#[tokio::test]
async fn test_proxy_missing_address_is_400() {
    let (state, calls) = state_with(5, ok_response());
    let addr = spawn_app(state).await;

    let response = reqwest::get(format!("http://{}/geocode-proxy", addr))
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let json: serde_json::Value = response.json().await.unwrap();
    assert_eq!(json["error"], "Missing address parameter");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_proxy_maps_upstream_failure_status_to_400() {
    let denied = GeocodeResponse {
        status: "REQUEST_DENIED".to_string(),
        results: vec![],
        error_message: Some("The provided API key is invalid.".to_string()),
    };
    let (state, _) = state_with(5, denied);
    let addr = spawn_app(state).await;

    let response = reqwest::get(format!("http://{}/geocode-proxy?address=x", addr))
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let json: serde_json::Value = response.json().await.unwrap();
    assert_eq!(json["error"], "The provided API key is invalid.");
}

#[tokio::test]
async fn test_proxy_maps_missing_api_key_to_500() {
    let geocoder = GoogleGeocoder::new(&GeocoderConfig {
        endpoint: "http://127.0.0.1:1/unreachable".to_string(),
        api_key: None,
        timeout: Duration::from_secs(1),
    })
    .unwrap();
    let state = AppState {
        gate: Arc::new(QuotaGate::new(Arc::new(MemoryStore::new()), 5, DAY)),
        geocoder: Arc::new(geocoder),
    };
    let addr = spawn_app(state).await;

    let response = reqwest::get(format!("http://{}/geocode-proxy?address=x", addr))
        .await
        .unwrap();
    assert_eq!(response.status(), 500);

    let json: serde_json::Value = response.json().await.unwrap();
    assert_eq!(json["error"], "Missing geocoding API key");
}

#[tokio::test]
async fn test_forwarded_header_partitions_quota() {
    let (state, _) = state_with(1, ok_response());
    let addr = spawn_app(state).await;
    let client = reqwest::Client::new();
    let url = format!("http://{}/geocode-proxy?address=x", addr);

    let first = client
        .get(&url)
        .header("x-forwarded-for", "203.0.113.7")
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 200);

    let exhausted = client
        .get(&url)
        .header("x-forwarded-for", "203.0.113.7")
        .send()
        .await
        .unwrap();
    assert_eq!(exhausted.status(), 429);

    // A different origin still has quota
    let other = client
        .get(&url)
        .header("x-forwarded-for", "198.51.100.4")
        .send()
        .await
        .unwrap();
    assert_eq!(other.status(), 200);
}
