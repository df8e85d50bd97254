use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default)]
    pub geocoder: GeocoderConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub lookup: LookupConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            geocoder: GeocoderConfig::default(),
            quota: QuotaConfig::default(),
            lookup: LookupConfig::default(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:7090".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocoderConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Upstream API key. Absent means proxy requests fail at request time,
    /// not at startup.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: None,
            timeout: default_timeout(),
        }
    }
}

fn default_endpoint() -> String {
    "https://maps.googleapis.com/maps/api/geocode/json".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Maximum requests per identity per window.
    #[serde(default = "default_limit")]
    pub limit: u64,
    /// Rolling window after which usage counters reset.
    #[serde(default = "default_window", with = "humantime_serde")]
    pub window: Duration,
    #[serde(default)]
    pub store: StoreConfig,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            window: default_window(),
            store: StoreConfig::default(),
        }
    }
}

fn default_limit() -> u64 {
    50
}

fn default_window() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// Upstash-style Redis REST endpoint.
    RedisRest { url: String, token: String },
    /// In-process store; quota state is lost on restart and not shared
    /// across instances.
    Memory,
    /// No backing store; quota enforcement is permissive.
    #[default]
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupConfig {
    /// Hard cap on queries per run; excess input lines are dropped.
    #[serde(default = "default_max_queries")]
    pub max_queries: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_delay", with = "humantime_serde")]
    pub delay_between_batches: Duration,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            max_queries: default_max_queries(),
            batch_size: default_batch_size(),
            delay_between_batches: default_delay(),
        }
    }
}

fn default_max_queries() -> usize {
    50
}

fn default_batch_size() -> usize {
    10
}

fn default_delay() -> Duration {
    Duration::from_secs(1)
}
