pub mod gate;
pub mod store;

use std::sync::Arc;
use tracing::{info, warn};

pub use gate::{QuotaGate, QuotaSnapshot, UNKNOWN_IDENTITY};
pub use store::{KvStore, MemoryStore, NullStore, RedisRestStore, StoreError};

/// Selects the store implementation once at startup. Absent configuration
/// yields the permissive [`NullStore`].
pub fn store_from_config(
    config: &crate::config::StoreConfig,
) -> Result<Arc<dyn KvStore>, StoreError> {
    match config {
        crate::config::StoreConfig::RedisRest { url, token } => {
            info!(%url, "using Redis REST quota store");
            Ok(Arc::new(RedisRestStore::new(url, token)?))
        }
        crate::config::StoreConfig::Memory => {
            info!("using in-memory quota store");
            Ok(Arc::new(MemoryStore::new()))
        }
        crate::config::StoreConfig::None => {
            warn!("no quota store configured, quota enforcement is permissive");
            Ok(Arc::new(NullStore))
        }
    }
}
