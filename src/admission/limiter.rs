//! Fixed-window rate limiter over the KV store.
//!
//! One atomic INCRBY per request; the window TTL is set when the counter
//! is created, so the count is monotone within a window and resets at
//! the boundary. An unreachable store admits the request (fail open) —
//! a limiter outage must never turn into a full-site outage.

use std::net::IpAddr;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tracing::warn;

use crate::domain::keys;
use crate::infra::kv::KvStore;
use crate::util::clock::Clock;

use super::policy::RateLimitPolicy;

const TARGET: &str = "raffica::admission::limiter";

/// Outcome surfaced to the HTTP layer; `success=false` maps to 429 with
/// the X-RateLimit-* headers.
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub success: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset: OffsetDateTime,
}

/// Identifier for rate-limit tracking: client IP plus a short hash of
/// the User-Agent, so distinct browsers behind one IP are tracked
/// somewhat separately.
pub fn client_identifier(ip: IpAddr, user_agent: Option<&str>) -> String {
    let ua = user_agent.unwrap_or("unknown");
    let digest = Sha256::digest(ua.as_bytes());
    format!("{ip}:{}", hex::encode(&digest[..4]))
}

pub struct RateLimiter {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Count this request against the identifier's window and decide
    /// admission.
    pub async fn check(
        &self,
        identifier: &str,
        policy: &RateLimitPolicy,
    ) -> RateLimitDecision {
        let key = keys::rate_limit_key(policy.name, identifier);
        let now = self.clock.now_utc();

        let (count, reset) = match self.store.incr_by(&key, 1).await {
            Ok(count) => {
                let reset = if count == 1 {
                    // First hit of the window owns the expiry.
                    if let Err(err) = self.store.expire(&key, policy.window).await {
                        warn!(target: TARGET, key = %key, error = %err, "failed to set window expiry");
                    }
                    now + policy.window
                } else {
                    // Later hits report the boundary the first hit set,
                    // not a boundary that slides with every request.
                    match self.store.ttl(&key).await {
                        Ok(Some(remaining)) => now + remaining,
                        Ok(None) => now + policy.window,
                        Err(err) => {
                            warn!(target: TARGET, key = %key, error = %err, "failed to read window expiry");
                            now + policy.window
                        }
                    }
                };
                (count, reset)
            }
            Err(err) => {
                warn!(
                    target: TARGET,
                    identifier,
                    policy = policy.name,
                    error = %err,
                    "rate-limit store unreachable, admitting request"
                );
                return RateLimitDecision {
                    success: true,
                    limit: policy.max_requests,
                    remaining: policy.max_requests,
                    reset: now + policy.window,
                };
            }
        };

        let limit = policy.max_requests;
        let success = count <= i64::from(limit);
        let remaining = u32::try_from(i64::from(limit) - count).unwrap_or(0);

        RateLimitDecision {
            success,
            limit,
            remaining,
            reset,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::infra::kv::MemoryStore;
    use crate::util::clock::ManualClock;

    fn limiter() -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(MemoryStore::new(clock.clone()));
        (RateLimiter::new(store, clock.clone()), clock)
    }

    fn policy(max: u32, window_secs: u64) -> RateLimitPolicy {
        RateLimitPolicy {
            name: "test",
            window: Duration::from_secs(window_secs),
            max_requests: max,
        }
    }

    #[tokio::test]
    async fn admits_until_the_limit_then_rejects() {
        let (limiter, _clock) = limiter();
        let policy = policy(3, 60);

        for expected_remaining in [2, 1, 0] {
            let decision = limiter.check("1.2.3.4:aa", &policy).await;
            assert!(decision.success);
            assert_eq!(decision.remaining, expected_remaining);
            assert_eq!(decision.limit, 3);
        }

        let rejected = limiter.check("1.2.3.4:aa", &policy).await;
        assert!(!rejected.success);
        assert_eq!(rejected.remaining, 0);
    }

    #[tokio::test]
    async fn window_boundary_resets_the_counter() {
        let (limiter, clock) = limiter();
        let policy = policy(2, 60);

        limiter.check("id", &policy).await;
        limiter.check("id", &policy).await;
        assert!(!limiter.check("id", &policy).await.success);

        clock.advance(Duration::from_secs(61));

        let fresh = limiter.check("id", &policy).await;
        assert!(fresh.success);
        assert_eq!(fresh.remaining, 1);
    }

    #[tokio::test]
    async fn reset_stays_at_the_window_boundary() {
        let (limiter, clock) = limiter();
        let policy = policy(10, 60);

        let first = limiter.check("id", &policy).await;
        let boundary = first.reset;

        clock.advance(Duration::from_secs(30));
        let mid_window = limiter.check("id", &policy).await;
        assert_eq!(mid_window.reset, boundary);

        clock.advance(Duration::from_secs(31));
        let next_window = limiter.check("id", &policy).await;
        assert_eq!(next_window.reset, boundary + Duration::from_secs(61));
    }

    #[tokio::test]
    async fn identifiers_are_tracked_independently() {
        let (limiter, _clock) = limiter();
        let policy = policy(1, 60);

        assert!(limiter.check("a", &policy).await.success);
        assert!(!limiter.check("a", &policy).await.success);
        assert!(limiter.check("b", &policy).await.success);
    }

    #[tokio::test]
    async fn policies_do_not_share_windows() {
        let (limiter, _clock) = limiter();
        let strict = RateLimitPolicy {
            name: "auth",
            window: Duration::from_secs(60),
            max_requests: 1,
        };
        let loose = RateLimitPolicy {
            name: "public",
            window: Duration::from_secs(60),
            max_requests: 5,
        };

        assert!(limiter.check("id", &strict).await.success);
        assert!(!limiter.check("id", &strict).await.success);
        // Same identifier, different policy namespace.
        assert!(limiter.check("id", &loose).await.success);
    }

    #[test]
    fn identifier_separates_user_agents_behind_one_ip() {
        let ip: IpAddr = "10.0.0.1".parse().unwrap();

        let firefox = client_identifier(ip, Some("Mozilla/5.0 Firefox"));
        let chrome = client_identifier(ip, Some("Mozilla/5.0 Chrome"));
        let missing = client_identifier(ip, None);

        assert_ne!(firefox, chrome);
        assert_ne!(firefox, missing);
        assert!(firefox.starts_with("10.0.0.1:"));
        // ip plus an eight-hex-character fragment
        assert_eq!(firefox.len(), "10.0.0.1:".len() + 8);
    }
}
