use std::sync::Arc;
use tracing::warn;

use crate::geocode::{GeocodeCandidate, GeocodeResponse, Geocoder};
use crate::quota::QuotaGate;

use super::types::{LookupError, LookupResult, PlaceResult};

/// Per-query lookup: consults the quota gate before contacting the upstream
/// collaborator and maps raw responses into [`LookupResult`]s.
///
/// The gate check here mirrors the ingress filter so that in-process callers
/// which never cross the HTTP boundary are still counted.
pub struct LookupClient {
    gate: Arc<QuotaGate>,
    geocoder: Arc<dyn Geocoder>,
    identity: String,
}

impl LookupClient {
    pub fn new(
        gate: Arc<QuotaGate>,
        geocoder: Arc<dyn Geocoder>,
        identity: impl Into<String>,
    ) -> Self {
        Self {
            gate,
            geocoder,
            identity: identity.into(),
        }
    }

    pub fn gate(&self) -> &QuotaGate {
        &self.gate
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub async fn lookup(&self, query: &str) -> LookupResult {
        if !self.gate.increment(&self.identity).await {
            return LookupResult::failure(
                query,
                LookupError::rate_limited(
                    "Daily request limit reached. Please try again tomorrow.",
                ),
            );
        }

        match self.geocoder.geocode(query).await {
            Ok(response) => Self::map_response(query, response),
            Err(error) => {
                warn!(query, %error, "geocoding request failed");
                LookupResult::failure(
                    query,
                    LookupError::api_error(
                        "An error occurred while contacting the geocoding service.",
                    ),
                )
            }
        }
    }

    fn map_response(query: &str, response: GeocodeResponse) -> LookupResult {
        let Some(candidate) = response.results.into_iter().next() else {
            return match response.status.as_str() {
                "OK" | "ZERO_RESULTS" => LookupResult::failure(query, LookupError::zero_results()),
                status => LookupResult::failure(
                    query,
                    LookupError::api_error(
                        response
                            .error_message
                            .unwrap_or_else(|| format!("Geocoding failed with status {}", status)),
                    ),
                ),
            };
        };

        let place = PlaceResult {
            name: Some(Self::display_name(&candidate, query)),
            lat: candidate.geometry.location.lat,
            lng: candidate.geometry.location.lng,
            address: candidate.formatted_address.unwrap_or_default(),
            place_id: candidate.place_id,
        };

        LookupResult::success(query, place)
    }

    /// Display name: first address component, else the first comma-segment
    /// of the formatted address, else the query itself.
    fn display_name(candidate: &GeocodeCandidate, query: &str) -> String {
        if let Some(component) = candidate.address_components.first() {
            return component.long_name.clone();
        }
        if let Some(segment) = candidate
            .formatted_address
            .as_deref()
            .and_then(|address| address.split(',').next())
        {
            let segment = segment.trim();
            if !segment.is_empty() {
                return segment.to_string();
            }
        }
        query.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocode::{AddressComponent, GeocodeError, Geometry, Location};
    use crate::quota::{MemoryStore, NullStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    struct StubGeocoder {
        response: Option<GeocodeResponse>,
        calls: AtomicUsize,
    }

    impl StubGeocoder {
        fn returning(response: GeocodeResponse) -> Self {
            Self {
                response: Some(response),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                response: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Geocoder for StubGeocoder {
        async fn geocode(&self, _address: &str) -> Result<GeocodeResponse, GeocodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.response {
                Some(response) => Ok(response.clone()),
                None => Err(GeocodeError::MissingApiKey),
            }
        }
    }

    fn candidate(place_id: &str) -> GeocodeCandidate {
        GeocodeCandidate {
            place_id: place_id.to_string(),
            formatted_address: Some("Unter den Linden 1, Berlin, Germany".to_string()),
            address_components: vec![AddressComponent {
                long_name: "Unter den Linden".to_string(),
                short_name: "UdL".to_string(),
                types: vec!["route".to_string()],
            }],
            geometry: Geometry {
                location: Location {
                    lat: 52.517,
                    lng: 13.389,
                },
            },
        }
    }

    fn ok_response(place_id: &str) -> GeocodeResponse {
        GeocodeResponse {
            status: "OK".to_string(),
            results: vec![candidate(place_id)],
            error_message: None,
        }
    }

    fn permissive_gate() -> Arc<QuotaGate> {
        Arc::new(QuotaGate::new(Arc::new(NullStore), 50, DAY))
    }

    #[tokio::test]
    async fn test_success_takes_first_candidate() {
        let mut response = ok_response("p1");
        response.results.push(candidate("p2"));
        let client = LookupClient::new(
            permissive_gate(),
            Arc::new(StubGeocoder::returning(response)),
            "test",
        );

        let result = client.lookup("Unter den Linden").await;
        assert!(result.error.is_none());
        assert_eq!(result.results.len(), 1);
        assert_eq!(result.results[0].place_id, "p1");
        assert_eq!(result.results[0].name.as_deref(), Some("Unter den Linden"));
        assert_eq!(
            result.results[0].address,
            "Unter den Linden 1, Berlin, Germany"
        );
    }

    #[tokio::test]
    async fn test_zero_results_status_maps_to_zero_results() {
        let response = GeocodeResponse {
            status: "ZERO_RESULTS".to_string(),
            results: vec![],
            error_message: None,
        };
        let client = LookupClient::new(
            permissive_gate(),
            Arc::new(StubGeocoder::returning(response)),
            "test",
        );

        let result = client.lookup("nowhere").await;
        let error = result.error.unwrap();
        assert_eq!(error.code, crate::lookup::types::ErrorCode::ZeroResults);
        assert!(!error.suggestions.is_empty());
    }

    #[tokio::test]
    async fn test_empty_results_with_ok_status_maps_to_zero_results() {
        let response = GeocodeResponse {
            status: "OK".to_string(),
            results: vec![],
            error_message: None,
        };
        let client = LookupClient::new(
            permissive_gate(),
            Arc::new(StubGeocoder::returning(response)),
            "test",
        );

        let result = client.lookup("nowhere").await;
        assert_eq!(
            result.error.unwrap().code,
            crate::lookup::types::ErrorCode::ZeroResults
        );
    }

    #[tokio::test]
    async fn test_denied_status_maps_to_api_error() {
        let response = GeocodeResponse {
            status: "REQUEST_DENIED".to_string(),
            results: vec![],
            error_message: Some("The provided API key is invalid.".to_string()),
        };
        let client = LookupClient::new(
            permissive_gate(),
            Arc::new(StubGeocoder::returning(response)),
            "test",
        );

        let result = client.lookup("Berlin").await;
        let error = result.error.unwrap();
        assert_eq!(error.code, crate::lookup::types::ErrorCode::ApiError);
        assert_eq!(error.message, "The provided API key is invalid.");
    }

    #[tokio::test]
    async fn test_transport_failure_maps_to_api_error() {
        let client = LookupClient::new(
            permissive_gate(),
            Arc::new(StubGeocoder::failing()),
            "test",
        );

        let result = client.lookup("Berlin").await;
        assert_eq!(
            result.error.unwrap().code,
            crate::lookup::types::ErrorCode::ApiError
        );
    }

    #[tokio::test]
    async fn test_gate_refusal_skips_upstream() {
        let gate = Arc::new(QuotaGate::new(Arc::new(MemoryStore::new()), 1, DAY));
        let geocoder = Arc::new(StubGeocoder::returning(ok_response("p1")));
        let client = LookupClient::new(gate, geocoder.clone(), "test");

        let first = client.lookup("Berlin").await;
        assert!(first.error.is_none());

        let second = client.lookup("Hamburg").await;
        assert!(second.is_rate_limited());
        assert_eq!(geocoder.calls(), 1);
    }

    #[tokio::test]
    async fn test_name_falls_back_to_formatted_address_segment() {
        let mut cand = candidate("p1");
        cand.address_components.clear();
        let response = GeocodeResponse {
            status: "OK".to_string(),
            results: vec![cand],
            error_message: None,
        };
        let client = LookupClient::new(
            permissive_gate(),
            Arc::new(StubGeocoder::returning(response)),
            "test",
        );

        let result = client.lookup("somewhere").await;
        assert_eq!(
            result.results[0].name.as_deref(),
            Some("Unter den Linden 1")
        );
    }

    #[tokio::test]
    async fn test_name_falls_back_to_query() {
        let mut cand = candidate("p1");
        cand.address_components.clear();
        cand.formatted_address = None;
        let response = GeocodeResponse {
            status: "OK".to_string(),
            results: vec![cand],
            error_message: None,
        };
        let client = LookupClient::new(
            permissive_gate(),
            Arc::new(StubGeocoder::returning(response)),
            "test",
        );

        let result = client.lookup("my query").await;
        assert_eq!(result.results[0].name.as_deref(), Some("my query"));
        assert_eq!(result.results[0].address, "");
    }
}
