pub mod client;
pub mod scheduler;
pub mod types;

pub use client::LookupClient;
pub use scheduler::{BatchConfig, BatchProcessingStatus, BatchScheduler, LookupOutcome};
pub use types::{ErrorCode, LookupError, LookupResult, Marker, PlaceResult};
