use clap::ValueEnum;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::export;
use crate::geocode::{Geocoder, GoogleGeocoder};
use crate::lookup::{BatchConfig, BatchScheduler, LookupClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
}

pub struct LookupArgs {
    pub input: Option<PathBuf>,
    pub batch_size: Option<usize>,
    pub delay_ms: Option<u64>,
    pub format: ExportFormat,
    pub output: Option<PathBuf>,
    pub identity: Option<String>,
}

pub async fn run(
    config_path: Option<PathBuf>,
    args: LookupArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_or_default(config_path.as_deref())?;

    let input = match &args.input {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let mut batch_config = BatchConfig::from(&config.lookup);
    if let Some(batch_size) = args.batch_size {
        if !(1..=100).contains(&batch_size) {
            return Err("batch size must be between 1 and 100".into());
        }
        batch_config.batch_size = batch_size;
    }
    if let Some(delay_ms) = args.delay_ms {
        if delay_ms > 10_000 {
            return Err("delay between batches must be at most 10000 ms".into());
        }
        batch_config.delay_between_batches = Duration::from_millis(delay_ms);
    }

    // The scheduler drops excess queries silently; the warning belongs here.
    let requested = input.lines().filter(|line| !line.trim().is_empty()).count();
    if requested > config.lookup.max_queries {
        warn!(
            requested,
            cap = config.lookup.max_queries,
            "input exceeds the query cap, extra entries will be dropped"
        );
    }

    let gate = super::build_gate(&config)?;
    let geocoder: Arc<dyn Geocoder> = Arc::new(GoogleGeocoder::new(&config.geocoder)?);
    let identity = args.identity.unwrap_or_else(super::default_identity);
    let client = LookupClient::new(gate, geocoder, identity);
    let scheduler = BatchScheduler::new(client).with_query_cap(config.lookup.max_queries);

    let outcome = scheduler
        .run(&input, &batch_config, false, |status| {
            if status.is_processing {
                info!(
                    batch = status.current_batch,
                    total_batches = status.total_batches,
                    processed = status.processed_items,
                    total = status.total_items,
                    eta_ms = ?status.estimated_time_remaining_ms,
                    "progress"
                );
            }
        })
        .await;

    let failed = outcome
        .results
        .iter()
        .filter(|result| result.error.is_some())
        .count();
    info!(
        results = outcome.results.len(),
        failed,
        markers = outcome.markers.len(),
        "lookup finished"
    );

    let rendered = match args.format {
        ExportFormat::Csv => export::to_csv(&outcome.results),
        ExportFormat::Json => export::to_json(&outcome.results)?,
    };

    match &args.output {
        Some(path) => {
            std::fs::write(path, &rendered)?;
            info!(path = %path.display(), "wrote export");
        }
        None => println!("{}", rendered),
    }

    Ok(())
}
