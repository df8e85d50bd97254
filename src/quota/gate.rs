use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::store::KvStore;

/// Identity used when the client origin cannot be resolved.
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Extra TTL past the window end so stale records clean themselves up.
const TTL_MARGIN: Duration = Duration::from_secs(60);

/// Point-in-time view of one identity's quota. Derived on demand, never
/// stored.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaSnapshot {
    pub used: u64,
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
    pub is_limited: bool,
}

/// Per-identity daily quota enforcement over a shared counter store.
///
/// When the store is unavailable the gate degrades to a permissive mode:
/// every identity reads as under-limit and every increment is admitted.
pub struct QuotaGate {
    store: Arc<dyn KvStore>,
    limit: u64,
    window: Duration,
}

impl QuotaGate {
    pub fn new(store: Arc<dyn KvStore>, limit: u64, window: Duration) -> Self {
        Self {
            store,
            limit,
            window,
        }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    fn count_key(identity: &str) -> String {
        format!("quota:{}:count", identity)
    }

    fn reset_key(identity: &str) -> String {
        format!("quota:{}:reset_at", identity)
    }

    fn window_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.window).unwrap_or_else(|_| chrono::Duration::hours(24))
    }

    fn permissive_snapshot(&self, now: DateTime<Utc>) -> QuotaSnapshot {
        QuotaSnapshot {
            used: 0,
            limit: self.limit,
            remaining: self.limit,
            reset_at: now + self.window_chrono(),
            is_limited: false,
        }
    }

    /// Current usage for `identity`. Rolls the window over as a side effect
    /// when the stored reset time has passed.
    pub async fn info(&self, identity: &str) -> QuotaSnapshot {
        let now = Utc::now();
        if !self.store.is_available() {
            warn!(identity, "quota store unavailable, reporting permissive limits");
            return self.permissive_snapshot(now);
        }

        let reset_at = self.current_window(identity, now).await;
        let used = self.read_count(identity).await;

        QuotaSnapshot {
            used,
            limit: self.limit,
            remaining: self.limit.saturating_sub(used),
            reset_at,
            is_limited: used >= self.limit,
        }
    }

    /// Admits or refuses one request for `identity`, bumping the counter on
    /// admission. Returns `false` once the ceiling is reached.
    ///
    /// Admission is a single atomic increment on the store: two callers
    /// racing on the same stale read can bump the counter past the limit,
    /// but only those that fetched a value at or under the limit are
    /// admitted, so admitted calls never exceed it.
    pub async fn increment(&self, identity: &str) -> bool {
        let now = Utc::now();
        if !self.store.is_available() {
            warn!(identity, "quota store unavailable, admitting request");
            return true;
        }

        let reset_at = self.current_window(identity, now).await;
        let used = self.read_count(identity).await;
        if used >= self.limit {
            debug!(identity, used, limit = self.limit, "quota ceiling reached");
            return false;
        }

        let count_key = Self::count_key(identity);
        let admitted = match self.store.incr(&count_key).await {
            Ok(n) if n > self.limit as i64 => {
                debug!(identity, fetched = n, "lost increment race at the ceiling");
                false
            }
            Ok(n) => {
                debug!(identity, used = n, limit = self.limit, "quota incremented");
                true
            }
            Err(error) => {
                warn!(identity, %error, "quota increment failed, admitting request");
                return true;
            }
        };

        // Re-arm the TTL so the counter outlives the window by a margin.
        let ttl = (reset_at - now)
            .to_std()
            .unwrap_or(self.window)
            .saturating_add(TTL_MARGIN);
        if let Err(error) = self.store.expire(&count_key, ttl).await {
            warn!(identity, %error, "failed to refresh quota counter TTL");
        }

        admitted
    }

    /// Administrative reset of one identity, or every identity when `None`.
    /// Returns the number of keys removed.
    pub async fn clear(&self, identity: Option<&str>) -> u64 {
        if !self.store.is_available() {
            warn!("quota store unavailable, nothing to clear");
            return 0;
        }

        let keys = match identity {
            Some(identity) => vec![Self::count_key(identity), Self::reset_key(identity)],
            None => match self.store.keys("quota:*").await {
                Ok(keys) => keys,
                Err(error) => {
                    warn!(%error, "failed to enumerate quota keys");
                    return 0;
                }
            },
        };

        match self.store.del(&keys).await {
            Ok(removed) => {
                info!(identity = identity.unwrap_or("*"), removed, "cleared quota records");
                removed
            }
            Err(error) => {
                warn!(%error, "failed to clear quota records");
                0
            }
        }
    }

    /// Reads the active window's reset time, lazily rolling the window over
    /// (counter deleted, reset time advanced by one window, TTL re-armed)
    /// when the stored reset time is absent or has passed.
    async fn current_window(&self, identity: &str, now: DateTime<Utc>) -> DateTime<Utc> {
        let reset_key = Self::reset_key(identity);

        let stored = match self.store.get(&reset_key).await {
            Ok(value) => value,
            Err(error) => {
                warn!(identity, %error, "failed to read quota window, treating as expired");
                None
            }
        };

        if let Some(reset_at) = stored.and_then(|s| DateTime::parse_from_rfc3339(&s).ok()) {
            let reset_at = reset_at.with_timezone(&Utc);
            if reset_at > now {
                return reset_at;
            }
        }

        let reset_at = now + self.window_chrono();
        let ttl = self.window.saturating_add(TTL_MARGIN);

        if let Err(error) = self.store.del(&[Self::count_key(identity)]).await {
            warn!(identity, %error, "failed to reset quota counter");
        }
        if let Err(error) = self
            .store
            .set(&reset_key, &reset_at.to_rfc3339(), Some(ttl))
            .await
        {
            warn!(identity, %error, "failed to persist quota window");
        }

        debug!(identity, %reset_at, "quota window rolled over");
        reset_at
    }

    async fn read_count(&self, identity: &str) -> u64 {
        match self.store.get(&Self::count_key(identity)).await {
            Ok(Some(value)) => value.parse().unwrap_or(0),
            Ok(None) => 0,
            Err(error) => {
                warn!(identity, %error, "failed to read quota counter, treating as zero");
                0
            }
        }
    }
}
