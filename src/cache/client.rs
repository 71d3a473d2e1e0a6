//! Fail-open cache client.
//!
//! Wraps a [`KvStore`] with the reliability contract every caller relies
//! on: a failing store must never become a user-facing failure. `get`
//! degrades to a miss, `set`/`delete` report `false`, counters report
//! zero — all logged, none propagated.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use tracing::warn;

use crate::domain::freshness::{Freshness, STALE_TTL};
use crate::domain::keys::{self, CounterKey, FlagKey};
use crate::infra::kv::KvStore;
use crate::util::clock::Clock;

const TARGET: &str = "raffica::cache::client";

/// A stale twin entry: the cached value plus when it was written, so the
/// fallback path can check it against the currently decided stale window.
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct StaleEntry<T> {
    pub value: T,
    #[serde(with = "time::serde::rfc3339")]
    pub stored_at: OffsetDateTime,
}

impl<T> StaleEntry<T> {
    pub fn age(&self, now: OffsetDateTime) -> Duration {
        let age = now - self.stored_at;
        if age.is_negative() {
            Duration::ZERO
        } else {
            age.unsigned_abs()
        }
    }
}

/// Typed, fail-open view over the KV store.
pub struct CacheClient {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
}

impl CacheClient {
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Read a cached value. Backend and decode failures are both treated
    /// as a miss.
    pub async fn get<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let key = keys::cache_key(name);
        let raw = match self.store.get(&key).await {
            Ok(raw) => raw?,
            Err(err) => {
                self.record_error("get", &key, &err);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(
                    target: TARGET,
                    key = %key,
                    error = %err,
                    "cached payload failed to decode, treating as miss"
                );
                None
            }
        }
    }

    /// Write a value under the given freshness class. Returns false on
    /// failure without propagating.
    pub async fn set<T: Serialize>(&self, name: &str, value: &T, freshness: Freshness) -> bool {
        let key = keys::cache_key(name);
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(target: TARGET, key = %key, error = %err, "failed to encode cache payload");
                return false;
            }
        };

        match self.store.set_ex(&key, &payload, freshness.ttl()).await {
            Ok(()) => true,
            Err(err) => {
                self.record_error("set", &key, &err);
                false
            }
        }
    }

    /// Invalidate a batch of entries.
    pub async fn delete(&self, names: &[&str]) -> bool {
        let rendered: Vec<String> = names.iter().map(|name| keys::cache_key(name)).collect();
        match self.store.delete(&rendered).await {
            Ok(()) => true,
            Err(err) => {
                self.record_error("delete", "batch", &err);
                false
            }
        }
    }

    /// Atomically bump a rolling counter. The expiry is set only by the
    /// increment that creates the key, so a counter lives exactly one
    /// window from its first hit instead of being kept alive forever by
    /// steady traffic. Returns the new count, or zero when the store is
    /// unreachable.
    pub async fn increment_by(&self, counter: &CounterKey, amount: i64, window: Duration) -> i64 {
        let key = counter.render();
        match self.store.incr_by(&key, amount).await {
            Ok(count) => {
                if count == amount {
                    if let Err(err) = self.store.expire(&key, window).await {
                        self.record_error("expire", &key, &err);
                    }
                }
                count
            }
            Err(err) => {
                self.record_error("incr", &key, &err);
                0
            }
        }
    }

    /// Current value of a rolling counter, zero when absent or on error.
    pub async fn counter(&self, counter: &CounterKey) -> i64 {
        let key = counter.render();
        match self.store.get(&key).await {
            Ok(Some(raw)) => raw.parse().unwrap_or(0),
            Ok(None) => 0,
            Err(err) => {
                self.record_error("get", &key, &err);
                0
            }
        }
    }

    /// Write the 24h stale twin for a cache entry.
    pub async fn set_stale<T: Serialize>(&self, name: &str, value: &T) -> bool {
        let key = keys::stale_key(name);
        let entry = StaleEntry {
            value,
            stored_at: self.clock.now_utc(),
        };
        let payload = match serde_json::to_string(&entry) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(target: TARGET, key = %key, error = %err, "failed to encode stale payload");
                return false;
            }
        };

        match self.store.set_ex(&key, &payload, STALE_TTL).await {
            Ok(()) => true,
            Err(err) => {
                self.record_error("set", &key, &err);
                false
            }
        }
    }

    /// Read the stale twin, with its stored-at timestamp.
    pub async fn get_stale<T: DeserializeOwned>(&self, name: &str) -> Option<StaleEntry<T>> {
        let key = keys::stale_key(name);
        let raw = match self.store.get(&key).await {
            Ok(raw) => raw?,
            Err(err) => {
                self.record_error("get", &key, &err);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(target: TARGET, key = %key, error = %err, "stale payload failed to decode");
                None
            }
        }
    }

    /// Check whether an operational flag is set.
    pub async fn flag(&self, flag: &FlagKey) -> bool {
        let key = flag.render();
        match self.store.get(&key).await {
            Ok(value) => value.is_some(),
            Err(err) => {
                self.record_error("get", &key, &err);
                false
            }
        }
    }

    /// Set an operational flag with an auto-expiry safety net.
    pub async fn set_flag(&self, flag: &FlagKey, ttl: Duration) -> bool {
        let key = flag.render();
        match self.store.set_ex(&key, "1", ttl).await {
            Ok(()) => true,
            Err(err) => {
                self.record_error("set", &key, &err);
                false
            }
        }
    }

    pub async fn clear_flag(&self, flag: &FlagKey) -> bool {
        match self.store.delete(&[flag.render()]).await {
            Ok(()) => true,
            Err(err) => {
                self.record_error("delete", &flag.render(), &err);
                false
            }
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn record_error(&self, op: &'static str, key: &str, err: &dyn std::error::Error) {
        metrics::counter!("raffica_kv_error_total").increment(1);
        warn!(
            target: TARGET,
            op,
            key = %key,
            error = %err,
            "kv operation failed, continuing fail-open"
        );
    }
}
