pub mod config;
pub mod lookup;
pub mod quota;
pub mod run;

use std::path::Path;
use std::sync::Arc;
use tracing::warn;

use crate::config::{load_config, Config, ConfigError};
use crate::quota::{QuotaGate, StoreError};

/// Builds the quota gate from config, selecting the store implementation
/// once at startup.
pub fn build_gate(config: &Config) -> Result<Arc<QuotaGate>, StoreError> {
    let store = crate::quota::store_from_config(&config.quota.store)?;
    Ok(Arc::new(QuotaGate::new(
        store,
        config.quota.limit,
        config.quota.window,
    )))
}

/// Loads config from `path`, or falls back to built-in defaults when no
/// config file exists.
pub fn load_or_default(path: Option<&Path>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => {
            warn!("no config file found, using built-in defaults");
            Ok(Config::default())
        }
    }
}

/// Identity used for in-process lookups; the machine hostname is the
/// closest analog to a network origin on the CLI path.
pub fn default_identity() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "local".to_string())
}
