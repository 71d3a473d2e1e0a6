//! In-memory KV backend.
//!
//! Dashmap of value plus optional expiry instant, checked lazily on read.
//! Increment and expiry updates happen under the map's shard lock, which
//! gives the same per-key atomicity the Redis backend provides.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::util::clock::Clock;

use super::{KvError, KvStore};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Process-local store with TTL semantics.
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Number of live (non-expired) entries.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries
            .iter()
            .filter(|entry| !entry.value().is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let now = self.clock.now();

        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                return Ok(Some(entry.value.clone()));
            }
        }

        // Expired entries are dropped on the read path rather than by a
        // sweeper task.
        self.entries
            .remove_if(key, |_, entry| entry.is_expired(now));
        Ok(None)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError> {
        let entry = Entry {
            value: value.to_string(),
            expires_at: Some(self.clock.now() + ttl),
        };
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<(), KvError> {
        for key in keys {
            self.entries.remove(key);
        }
        Ok(())
    }

    async fn incr_by(&self, key: &str, amount: i64) -> Result<i64, KvError> {
        let now = self.clock.now();
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: "0".to_string(),
            expires_at: None,
        });

        if entry.is_expired(now) {
            entry.value = "0".to_string();
            entry.expires_at = None;
        }

        let current: i64 = entry
            .value
            .parse()
            .map_err(|_| KvError::backend(format!("non-integer value at `{key}`")))?;
        let next = current + amount;
        entry.value = next.to_string();

        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), KvError> {
        let now = self.clock.now();
        if let Some(mut entry) = self.entries.get_mut(key) {
            if !entry.is_expired(now) {
                entry.expires_at = Some(now + ttl);
            }
        }
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, KvError> {
        let now = self.clock.now();
        let remaining = self.entries.get(key).and_then(|entry| {
            if entry.is_expired(now) {
                None
            } else {
                entry.expires_at.map(|at| at - now)
            }
        });
        Ok(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::clock::ManualClock;

    fn store() -> (MemoryStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (MemoryStore::new(clock.clone()), clock)
    }

    #[tokio::test]
    async fn set_then_get_roundtrip() {
        let (store, _clock) = store();

        store
            .set_ex("cache:posts", "[1,2,3]", Duration::from_secs(300))
            .await
            .expect("set should succeed");

        let value = store.get("cache:posts").await.expect("get should succeed");
        assert_eq!(value.as_deref(), Some("[1,2,3]"));
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let (store, clock) = store();

        store
            .set_ex("cache:posts", "x", Duration::from_secs(300))
            .await
            .unwrap();

        clock.advance(Duration::from_secs(299));
        assert!(store.get("cache:posts").await.unwrap().is_some());

        clock.advance(Duration::from_secs(1));
        assert!(store.get("cache:posts").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn incr_by_accumulates_and_survives_until_window_end() {
        let (store, clock) = store();

        assert_eq!(store.incr_by("metrics:requests:28333334", 1).await.unwrap(), 1);
        assert_eq!(store.incr_by("metrics:requests:28333334", 1).await.unwrap(), 2);
        assert_eq!(store.incr_by("metrics:requests:28333334", 3).await.unwrap(), 5);

        store
            .expire("metrics:requests:28333334", Duration::from_secs(60))
            .await
            .unwrap();

        clock.advance(Duration::from_secs(61));

        // Window elapsed: the counter restarts from zero.
        assert_eq!(store.incr_by("metrics:requests:28333334", 1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_removes_multiple_keys() {
        let (store, _clock) = store();

        store.set_ex("a", "1", Duration::from_secs(10)).await.unwrap();
        store.set_ex("b", "2", Duration::from_secs(10)).await.unwrap();

        store
            .delete(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();

        assert!(store.get("a").await.unwrap().is_none());
        assert!(store.get("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn incr_on_non_integer_value_is_an_error() {
        let (store, _clock) = store();

        store
            .set_ex("cache:posts", "not-a-number", Duration::from_secs(10))
            .await
            .unwrap();

        assert!(store.incr_by("cache:posts", 1).await.is_err());
    }

    #[tokio::test]
    async fn expire_on_missing_key_is_a_no_op() {
        let (store, _clock) = store();
        store.expire("missing", Duration::from_secs(5)).await.unwrap();
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ttl_reports_the_remaining_lifetime() {
        let (store, clock) = store();

        store
            .set_ex("cache:posts", "x", Duration::from_secs(60))
            .await
            .unwrap();

        clock.advance(Duration::from_secs(25));
        assert_eq!(
            store.ttl("cache:posts").await.unwrap(),
            Some(Duration::from_secs(35))
        );

        clock.advance(Duration::from_secs(36));
        assert_eq!(store.ttl("cache:posts").await.unwrap(), None);
        assert_eq!(store.ttl("missing").await.unwrap(), None);
    }
}
