//! Typed KV key registry.
//!
//! Every key written to the store is rendered here, one namespace per
//! concern. Keeping the rendering in a single module makes collisions
//! impossible by construction and lets tests assert on exact key shapes.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;
use std::time::Duration;

use time::OffsetDateTime;

/// Rolling counters maintained by the traffic monitor and analytics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CounterKey {
    /// Requests admitted in one fixed window, keyed by the window index
    /// so each window gets a fresh counter that expires on its own.
    Requests { bucket: i64 },
    /// Cache hits in the current rolling window.
    CacheHits,
    /// Cache misses in the current rolling window.
    CacheMisses,
    /// Page views per path, keyed by path hash.
    PageViews { path_hash: u64 },
}

impl CounterKey {
    pub fn render(&self) -> String {
        match self {
            CounterKey::Requests { bucket } => format!("metrics:requests:{bucket}"),
            CounterKey::CacheHits => "metrics:cache:hits".to_string(),
            CounterKey::CacheMisses => "metrics:cache:misses".to_string(),
            CounterKey::PageViews { path_hash } => {
                format!("metrics:views:{path_hash:016x}")
            }
        }
    }

    /// Request counter for the window containing `now`.
    pub fn requests(now: OffsetDateTime, window: Duration) -> Self {
        let window_secs = window.as_secs().max(1) as i64;
        CounterKey::Requests {
            bucket: now.unix_timestamp().div_euclid(window_secs),
        }
    }

    /// Counter key for views of a concrete path.
    pub fn page_views(path: &str) -> Self {
        CounterKey::PageViews {
            path_hash: hash_value(&path),
        }
    }
}

/// Operational flags with a bounded lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagKey {
    /// Operator-set high-traffic override.
    HighTraffic,
}

impl FlagKey {
    pub fn render(&self) -> String {
        match self {
            FlagKey::HighTraffic => "flags:high-traffic".to_string(),
        }
    }
}

/// Primary cache entry for a named value.
pub fn cache_key(name: &str) -> String {
    format!("cache:{name}")
}

/// Longer-lived stale twin of a cache entry.
pub fn stale_key(name: &str) -> String {
    format!("stale:{name}")
}

/// Per-identifier rate-limit window counter.
pub fn rate_limit_key(policy: &str, identifier: &str) -> String {
    format!("ratelimit:{policy}:{identifier}")
}

/// Per-IP violation counter feeding blocklist escalation.
pub fn violations_key(ip: IpAddr) -> String {
    format!("violations:{ip}")
}

/// Block marker; presence means the IP is blocked until the key expires.
pub fn blocked_key(ip: IpAddr) -> String {
    format!("blocked:{ip}")
}

/// Compute a hash for any hashable value.
pub fn hash_value<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaces_do_not_collide() {
        let keys = [
            cache_key("posts"),
            stale_key("posts"),
            CounterKey::Requests { bucket: 29_000_000 }.render(),
            CounterKey::CacheHits.render(),
            CounterKey::CacheMisses.render(),
            CounterKey::page_views("/posts").render(),
            FlagKey::HighTraffic.render(),
            rate_limit_key("public", "1.2.3.4:abcd1234"),
            violations_key("1.2.3.4".parse().unwrap()),
            blocked_key("1.2.3.4".parse().unwrap()),
        ];

        let unique: std::collections::HashSet<_> = keys.iter().collect();
        assert_eq!(unique.len(), keys.len());
    }

    #[test]
    fn page_view_key_is_stable_per_path() {
        assert_eq!(
            CounterKey::page_views("/posts/hello").render(),
            CounterKey::page_views("/posts/hello").render(),
        );
        assert_ne!(
            CounterKey::page_views("/posts/hello").render(),
            CounterKey::page_views("/posts/other").render(),
        );
    }

    #[test]
    fn rate_limit_key_embeds_policy_and_identifier() {
        let key = rate_limit_key("auth", "10.0.0.1:deadbeef");
        assert_eq!(key, "ratelimit:auth:10.0.0.1:deadbeef");
    }

    #[test]
    fn request_counter_moves_to_a_new_key_each_window() {
        let window = Duration::from_secs(60);
        let start = OffsetDateTime::from_unix_timestamp(1_700_000_040).unwrap();

        let same_window = CounterKey::requests(start + Duration::from_secs(59), window);
        let next_window = CounterKey::requests(start + Duration::from_secs(60), window);

        assert_eq!(CounterKey::requests(start, window), same_window);
        assert_ne!(CounterKey::requests(start, window), next_window);
        assert_eq!(
            CounterKey::requests(start, window).render(),
            format!("metrics:requests:{}", 1_700_000_040_i64 / 60)
        );
    }
}
