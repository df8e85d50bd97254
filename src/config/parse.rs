use super::types::*;
use super::{expand_env_vars, is_unexpanded};
use std::path::Path;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let yaml_string = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    // Expand environment variables in the YAML string before parsing
    let yaml_string = expand_env_vars(&yaml_string);

    let mut config: Config = serde_yaml::from_str(&yaml_string).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("in file '{}': {}", path.display(), e),
        ))
    })?;

    resolve_env_gaps(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Degrades optional settings whose $env{...} references were never set.
/// A missing API key or store credential means "not configured", not a
/// startup failure.
fn resolve_env_gaps(config: &mut Config) {
    if config
        .geocoder
        .api_key
        .as_deref()
        .is_some_and(is_unexpanded)
    {
        warn!("geocoder api_key references an unset environment variable, treating as absent");
        config.geocoder.api_key = None;
    }

    if let StoreConfig::RedisRest { url, token } = &config.quota.store {
        if is_unexpanded(url) || is_unexpanded(token) {
            warn!("quota store credentials reference unset environment variables, quota enforcement is permissive");
            config.quota.store = StoreConfig::None;
        }
    }
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if config.listen.parse::<std::net::SocketAddr>().is_err() {
        errors.push(format!(
            "listen: '{}' is not a valid socket address",
            config.listen
        ));
    }

    if config.quota.limit == 0 {
        errors.push("quota.limit: must be at least 1".to_string());
    }
    if config.quota.window.is_zero() {
        errors.push("quota.window: must be non-zero".to_string());
    }

    if let StoreConfig::RedisRest { url, .. } = &config.quota.store {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            errors.push(format!("quota.store.url: '{}' is not an HTTP(S) URL", url));
        }
    }

    if !(1..=100).contains(&config.lookup.batch_size) {
        errors.push(format!(
            "lookup.batch_size: {} is outside the accepted range 1-100",
            config.lookup.batch_size
        ));
    }
    if config.lookup.delay_between_batches > std::time::Duration::from_secs(10) {
        errors.push("lookup.delay_between_batches: must be at most 10s".to_string());
    }
    if config.lookup.max_queries == 0 {
        errors.push("lookup.max_queries: must be at least 1".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}
