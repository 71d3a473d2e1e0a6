//! Key-value store backends.
//!
//! The cache, rate limiter, blocklist, and traffic counters all sit on the
//! same six primitives: get, set-with-TTL, delete, atomic increment,
//! expire, and remaining-TTL. `RedisStore` is the production backend;
//! `MemoryStore` backs tests and single-instance deployments.
//!
//! Errors surface as [`KvError`] here. The fail-open policy (store errors
//! become cache misses, not user-facing failures) lives one level up, in
//! the consumers.

mod memory;
mod redis_store;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("kv backend error: {message}")]
    Backend { message: String },
}

impl KvError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// Remote key-value store primitives.
///
/// All values are strings; callers own serialization. Increments are
/// atomic with respect to concurrent callers, which is what rate-limit
/// and traffic counters rely on.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError>;

    async fn delete(&self, keys: &[String]) -> Result<(), KvError>;

    /// Atomically add `amount` to the integer at `key`, creating it at
    /// zero when absent. Returns the new count.
    async fn incr_by(&self, key: &str, amount: i64) -> Result<i64, KvError>;

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), KvError>;

    /// Remaining lifetime of `key`, or `None` when the key is absent or
    /// has no expiry.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, KvError>;
}
