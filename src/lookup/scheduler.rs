use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::LookupConfig;

use super::client::LookupClient;
use super::types::{LookupError, LookupResult, Marker};

/// Hard cap on queries per run; excess input lines are silently dropped
/// (the caller is responsible for surfacing a truncation warning).
pub const DEFAULT_QUERY_CAP: usize = 50;

/// User-controlled pacing. Validated at the configuration/CLI boundary;
/// the scheduler trusts its input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    pub batch_size: usize,
    #[serde(with = "humantime_serde")]
    pub delay_between_batches: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            delay_between_batches: Duration::from_secs(1),
        }
    }
}

impl From<&LookupConfig> for BatchConfig {
    fn from(config: &LookupConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            delay_between_batches: config.delay_between_batches,
        }
    }
}

/// Progress of one scheduler run. Owned by that run; surfaced to the caller
/// through the progress callback, never shared across runs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProcessingStatus {
    pub total_items: usize,
    pub processed_items: usize,
    pub current_batch: usize,
    pub total_batches: usize,
    pub is_processing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time_remaining_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LookupOutcome {
    pub results: Vec<LookupResult>,
    pub markers: Vec<Marker>,
}

impl LookupOutcome {
    fn empty() -> Self {
        Self {
            results: Vec::new(),
            markers: Vec::new(),
        }
    }
}

/// Paces a list of queries against the quota: consecutive batches with
/// internal fan-out, a configurable delay between batches, progress/ETA
/// reporting, and an early abort once the quota is exhausted mid-run.
pub struct BatchScheduler {
    client: LookupClient,
    query_cap: usize,
}

impl BatchScheduler {
    pub fn new(client: LookupClient) -> Self {
        Self {
            client,
            query_cap: DEFAULT_QUERY_CAP,
        }
    }

    pub fn with_query_cap(mut self, cap: usize) -> Self {
        self.query_cap = cap;
        self
    }

    /// Runs every query in `input` (one per line) through the lookup client.
    ///
    /// The `authenticated` flag is reserved for differentiated limits and is
    /// currently passed through without branching.
    pub async fn run<F>(
        &self,
        input: &str,
        config: &BatchConfig,
        authenticated: bool,
        mut on_status: F,
    ) -> LookupOutcome
    where
        F: FnMut(&BatchProcessingStatus),
    {
        let run_id = Uuid::new_v4();
        let queries = normalize_input(input, self.query_cap);
        debug!(
            %run_id,
            queries = queries.len(),
            authenticated,
            identity = self.client.identity(),
            "starting lookup run"
        );

        // Pre-flight: skip the whole run when the quota is already exhausted.
        let preflight = self.client.gate().info(self.client.identity()).await;
        if preflight.is_limited {
            warn!(%run_id, reset_at = %preflight.reset_at, "quota exhausted before run");
            return LookupOutcome {
                results: vec![exhausted_result("You've reached the daily limit.")],
                markers: Vec::new(),
            };
        }

        if queries.is_empty() {
            return LookupOutcome::empty();
        }

        let total_batches = queries.len().div_ceil(config.batch_size);
        let mut status = BatchProcessingStatus {
            total_items: queries.len(),
            processed_items: 0,
            current_batch: 0,
            total_batches,
            is_processing: true,
            estimated_time_remaining_ms: None,
        };

        let mut results = Vec::with_capacity(queries.len());
        let mut markers = Vec::new();
        let started = Instant::now();

        for (index, batch) in queries.chunks(config.batch_size).enumerate() {
            status.current_batch = index + 1;

            // Scatter-gather: lookups fan out concurrently, results come
            // back in input order once the whole batch resolves.
            let batch_results = join_all(batch.iter().map(|query| self.client.lookup(query))).await;

            if batch_results.iter().any(LookupResult::is_rate_limited) {
                warn!(
                    %run_id,
                    batch = status.current_batch,
                    "quota exhausted mid-run, aborting remaining batches"
                );
                results.extend(batch_results);
                results.push(exhausted_result(
                    "Limit reached mid-process. Try again tomorrow.",
                ));
                break;
            }

            for result in batch_results {
                for place in &result.results {
                    markers.push(Marker {
                        lat: place.lat,
                        lng: place.lng,
                    });
                }
                results.push(result);
            }

            status.processed_items += batch.len();
            status.estimated_time_remaining_ms =
                estimate_remaining_ms(started.elapsed(), status.processed_items, status.total_items);
            on_status(&status);

            if status.current_batch < total_batches && !config.delay_between_batches.is_zero() {
                tokio::time::sleep(config.delay_between_batches).await;
            }
        }

        status.is_processing = false;
        on_status(&status);

        info!(%run_id, results = results.len(), markers = markers.len(), "lookup run complete");
        LookupOutcome { results, markers }
    }
}

fn normalize_input(input: &str, cap: usize) -> Vec<String> {
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(cap)
        .map(str::to_string)
        .collect()
}

fn estimate_remaining_ms(elapsed: Duration, processed: usize, total: usize) -> Option<u64> {
    if processed == 0 {
        return None;
    }
    let per_item = elapsed.as_millis() as f64 / processed as f64;
    Some(((total - processed) as f64 * per_item) as u64)
}

/// Synthetic run-level result signalling quota exhaustion; manufactured by
/// the scheduler, not by a per-query lookup.
fn exhausted_result(message: &str) -> LookupResult {
    LookupResult {
        query: "Rate Limit Exceeded".to_string(),
        results: Vec::new(),
        error: Some(LookupError {
            code: super::types::ErrorCode::RateLimitExceeded,
            message: message.to_string(),
            suggestions: vec![
                "Wait until reset".to_string(),
                "Try fewer queries".to_string(),
            ],
        }),
    }
}
