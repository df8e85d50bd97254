use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("store returned error status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected store reply: {0}")]
    UnexpectedReply(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Key-value counter store backing the quota gate.
///
/// Every operation may fail when the backend is unreachable; callers are
/// expected to log and treat a failed read as "absent" and a failed write
/// as a no-op rather than propagating the error.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Whether a real backend is configured. `false` selects the
    /// permissive fallback in higher layers without probing the network.
    fn is_available(&self) -> bool;

    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;
    /// Atomic increment-and-fetch. Missing keys start from 0.
    async fn incr(&self, key: &str) -> Result<i64>;
    async fn expire(&self, key: &str, ttl: Duration) -> Result<()>;
    /// Returns the number of keys removed.
    async fn del(&self, keys: &[String]) -> Result<u64>;
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;
}

// ===== Redis REST =====

/// Client for an Upstash-style Redis REST endpoint: each command is a JSON
/// array POSTed to the base URL with a bearer token, answered with
/// `{"result": ...}` or `{"error": "..."}`.
pub struct RedisRestStore {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct CommandReply {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

impl RedisRestStore {
    pub fn new(url: &str, token: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            base_url: url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            client,
        })
    }

    async fn command(&self, cmd: &[serde_json::Value]) -> Result<serde_json::Value> {
        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.token)
            .json(&cmd)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StoreError::Rejected {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let reply: CommandReply = response.json().await?;
        if let Some(error) = reply.error {
            return Err(StoreError::UnexpectedReply(error));
        }

        Ok(reply.result.unwrap_or(serde_json::Value::Null))
    }

    fn as_integer(value: &serde_json::Value) -> Result<i64> {
        match value {
            serde_json::Value::Number(n) => n
                .as_i64()
                .ok_or_else(|| StoreError::UnexpectedReply(value.to_string())),
            serde_json::Value::String(s) => s
                .parse()
                .map_err(|_| StoreError::UnexpectedReply(value.to_string())),
            other => Err(StoreError::UnexpectedReply(other.to_string())),
        }
    }
}

fn arg(value: impl ToString) -> serde_json::Value {
    serde_json::Value::String(value.to_string())
}

#[async_trait]
impl KvStore for RedisRestStore {
    fn is_available(&self) -> bool {
        true
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self.command(&[arg("GET"), arg(key)]).await? {
            serde_json::Value::Null => Ok(None),
            serde_json::Value::String(s) => Ok(Some(s)),
            serde_json::Value::Number(n) => Ok(Some(n.to_string())),
            other => Err(StoreError::UnexpectedReply(other.to_string())),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut cmd = vec![arg("SET"), arg(key), arg(value)];
        if let Some(ttl) = ttl {
            cmd.push(arg("EX"));
            cmd.push(arg(ttl.as_secs().max(1)));
        }
        self.command(&cmd).await?;
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let reply = self.command(&[arg("INCR"), arg(key)]).await?;
        Self::as_integer(&reply)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        self.command(&[arg("EXPIRE"), arg(key), arg(ttl.as_secs().max(1))])
            .await?;
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut cmd = vec![arg("DEL")];
        cmd.extend(keys.iter().map(arg));
        let reply = self.command(&cmd).await?;
        Ok(Self::as_integer(&reply)?.max(0) as u64)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        match self.command(&[arg("KEYS"), arg(pattern)]).await? {
            serde_json::Value::Array(items) => Ok(items
                .into_iter()
                .filter_map(|v| match v {
                    serde_json::Value::String(s) => Some(s),
                    _ => None,
                })
                .collect()),
            other => Err(StoreError::UnexpectedReply(other.to_string())),
        }
    }
}

// ===== In-memory =====

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Instant::now())
    }
}

/// In-process store for single-instance deployments and tests. TTLs are
/// honored lazily on access.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn glob_matches(pattern: &str, key: &str) -> bool {
    let escaped: Vec<String> = pattern.split('*').map(regex::escape).collect();
    let re = format!("^{}$", escaped.join(".*"));
    Regex::new(&re).map(|re| re.is_match(key)).unwrap_or(false)
}

#[async_trait]
impl KvStore for MemoryStore {
    fn is_available(&self) -> bool {
        true
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut entries = self.entries.lock().await;
        let (current, expires_at) = match entries.get(key) {
            Some(entry) if !entry.is_expired() => {
                (entry.value.parse::<i64>().unwrap_or(0), entry.expires_at)
            }
            _ => (0, None),
        };
        let next = current + 1;
        entries.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<u64> {
        let mut entries = self.entries.lock().await;
        let mut removed = 0;
        for key in keys {
            if entries.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let entries = self.entries.lock().await;
        Ok(entries
            .iter()
            .filter(|(key, entry)| !entry.is_expired() && glob_matches(pattern, key))
            .map(|(key, _)| key.clone())
            .collect())
    }
}

// ===== Null =====

/// Placeholder store selected when no backend is configured. Reads are
/// always absent, writes are no-ops, and `is_available` reports `false` so
/// the gate takes its permissive path.
pub struct NullStore;

#[async_trait]
impl KvStore for NullStore {
    fn is_available(&self) -> bool {
        false
    }

    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> Result<()> {
        Ok(())
    }

    async fn incr(&self, _key: &str) -> Result<i64> {
        Ok(0)
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> Result<()> {
        Ok(())
    }

    async fn del(&self, _keys: &[String]) -> Result<u64> {
        Ok(0)
    }

    async fn keys(&self, _pattern: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}
