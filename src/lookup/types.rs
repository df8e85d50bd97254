use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Quota ceiling reached; recoverable by waiting for the window reset.
    RateLimitExceeded,
    /// Upstream returned no candidates; recoverable by refining the query.
    ZeroResults,
    /// Transport or upstream failure; recoverable by retrying later.
    ApiError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupError {
    pub code: ErrorCode,
    pub message: String,
    pub suggestions: Vec<String>,
}

impl LookupError {
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::RateLimitExceeded,
            message: message.into(),
            suggestions: vec![
                "Wait until your rate limit resets".to_string(),
                "Try again tomorrow".to_string(),
            ],
        }
    }

    pub fn zero_results() -> Self {
        Self {
            code: ErrorCode::ZeroResults,
            message: "No results found for this location".to_string(),
            suggestions: vec![
                "Check for typos".to_string(),
                "Add more context like city, state, or country".to_string(),
            ],
        }
    }

    pub fn api_error(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::ApiError,
            message: message.into(),
            suggestions: vec![
                "Try again later".to_string(),
                "Verify the address format".to_string(),
            ],
        }
    }
}

/// A single geocoded place. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceResult {
    pub place_id: String,
    pub name: Option<String>,
    pub lat: f64,
    pub lng: f64,
    pub address: String,
}

/// Outcome of one query: either candidates or an error, never a fault.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupResult {
    pub query: String,
    pub results: Vec<PlaceResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<LookupError>,
}

impl LookupResult {
    pub fn success(query: impl Into<String>, place: PlaceResult) -> Self {
        Self {
            query: query.into(),
            results: vec![place],
            error: None,
        }
    }

    pub fn failure(query: impl Into<String>, error: LookupError) -> Self {
        Self {
            query: query.into(),
            results: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.error
            .as_ref()
            .is_some_and(|e| e.code == ErrorCode::RateLimitExceeded)
    }
}

/// Map coordinates extracted from successful lookups.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Marker {
    pub lat: f64,
    pub lng: f64,
}
