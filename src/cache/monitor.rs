//! Traffic monitor.
//!
//! Counts requests and cache hits/misses in rolling KV windows and
//! classifies the current load. Counter increments are fire-and-forget;
//! classification is debounced so the counter store is queried at most
//! once per debounce interval, with the last-known snapshot served in
//! between.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::domain::keys::CounterKey;
use crate::domain::traffic::{TrafficLevel, TrafficSnapshot, TrafficThresholds};
use crate::util::clock::Clock;

use super::client::CacheClient;

const TARGET: &str = "raffica::cache::monitor";

#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    pub thresholds: TrafficThresholds,
    /// Rolling window for the request counter.
    pub request_window: Duration,
    /// Rolling window for hit/miss counters.
    pub hit_window: Duration,
    /// Minimum interval between real metric computations.
    pub debounce: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            thresholds: TrafficThresholds::default(),
            request_window: Duration::from_secs(60),
            hit_window: Duration::from_secs(3_600),
            debounce: Duration::from_secs(5),
        }
    }
}

struct DebounceState {
    computed_at: Option<Instant>,
    snapshot: TrafficSnapshot,
}

pub struct TrafficMonitor {
    cache: Arc<CacheClient>,
    config: MonitorConfig,
    clock: Arc<dyn Clock>,
    // Per-instance debounce; replicas each debounce independently, which
    // keeps the metrics approximate rather than authoritative.
    state: Mutex<DebounceState>,
}

impl TrafficMonitor {
    pub fn new(cache: Arc<CacheClient>, config: MonitorConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache,
            config,
            clock,
            state: Mutex::new(DebounceState {
                computed_at: None,
                snapshot: TrafficSnapshot::idle(),
            }),
        }
    }

    /// Count one admitted request in the current request window.
    pub async fn record_request(&self) {
        self.cache
            .increment_by(&self.request_counter(), 1, self.config.request_window)
            .await;
    }

    fn request_counter(&self) -> CounterKey {
        CounterKey::requests(self.clock.now_utc(), self.config.request_window)
    }

    pub async fn record_cache_hit(&self) {
        metrics::counter!("raffica_cache_hit_total").increment(1);
        self.cache
            .increment_by(&CounterKey::CacheHits, 1, self.config.hit_window)
            .await;
    }

    pub async fn record_cache_miss(&self) {
        metrics::counter!("raffica_cache_miss_total").increment(1);
        self.cache
            .increment_by(&CounterKey::CacheMisses, 1, self.config.hit_window)
            .await;
    }

    /// Current load snapshot.
    ///
    /// Within the debounce interval this returns the previous snapshot
    /// without touching the counter store; only one caller per interval
    /// pays for the recomputation.
    pub async fn metrics(&self) -> TrafficSnapshot {
        let now = self.clock.now();

        {
            let mut state = self.lock_state();
            let fresh = state
                .computed_at
                .is_some_and(|at| now.duration_since(at) < self.config.debounce);
            if fresh {
                return state.snapshot;
            }
            // Claim the recomputation before releasing the lock so
            // concurrent callers keep getting the previous snapshot.
            state.computed_at = Some(now);
        }

        let snapshot = self.compute().await;
        self.lock_state().snapshot = snapshot;
        snapshot
    }

    async fn compute(&self) -> TrafficSnapshot {
        let requests = self.cache.counter(&self.request_counter()).await;
        let hits = self.cache.counter(&CounterKey::CacheHits).await;
        let misses = self.cache.counter(&CounterKey::CacheMisses).await;

        let window_requests = u64::try_from(requests).unwrap_or(0);
        let window_secs = self.config.request_window.as_secs().max(1) as f64;
        let requests_per_second = window_requests as f64 / window_secs;

        let reads = hits + misses;
        let cache_hit_rate = if reads > 0 {
            hits as f64 / reads as f64 * 100.0
        } else {
            0.0
        };

        // The watermarks apply to the raw window count: a burst that
        // fills the window must escalate even when the per-second
        // average over the full window still looks tame.
        let level = TrafficLevel::classify(window_requests, &self.config.thresholds);
        if level != TrafficLevel::Normal {
            debug!(
                target: TARGET,
                window_requests,
                cache_hit_rate,
                level = ?level,
                "elevated traffic"
            );
        }

        TrafficSnapshot {
            window_requests,
            requests_per_second,
            cache_hit_rate,
            level,
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, DebounceState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!(target: TARGET, "recovered poisoned monitor lock");
            poisoned.into_inner()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::kv::MemoryStore;
    use crate::util::clock::ManualClock;

    fn monitor() -> (TrafficMonitor, Arc<CacheClient>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let cache = Arc::new(CacheClient::new(store, clock.clone()));
        (
            TrafficMonitor::new(cache.clone(), MonitorConfig::default(), clock.clone()),
            cache,
            clock,
        )
    }

    async fn feed_requests(cache: &CacheClient, clock: &ManualClock, count: i64) {
        let counter = CounterKey::requests(clock.now_utc(), Duration::from_secs(60));
        cache
            .increment_by(&counter, count, Duration::from_secs(60))
            .await;
    }

    #[tokio::test]
    async fn classifies_normal_traffic() {
        let (monitor, cache, clock) = monitor();

        feed_requests(&cache, &clock, 100).await;

        let snapshot = monitor.metrics().await;
        assert_eq!(snapshot.level, TrafficLevel::Normal);
        assert!(!snapshot.is_high_traffic());
        assert_eq!(snapshot.window_requests, 100);
        assert!((snapshot.requests_per_second - 100.0 / 60.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn six_hundred_requests_in_one_window_is_critical() {
        let (monitor, cache, clock) = monitor();

        feed_requests(&cache, &clock, 600).await;

        let snapshot = monitor.metrics().await;
        assert_eq!(snapshot.window_requests, 600);
        assert_eq!(snapshot.level, TrafficLevel::Critical);
        assert!(snapshot.is_high_traffic());
    }

    #[tokio::test]
    async fn classifies_high_traffic_between_the_watermarks() {
        let (monitor, cache, clock) = monitor();

        feed_requests(&cache, &clock, 300).await;

        let snapshot = monitor.metrics().await;
        assert_eq!(snapshot.level, TrafficLevel::High);
        assert!(snapshot.is_high_traffic());
    }

    #[tokio::test]
    async fn steady_traffic_never_accumulates_across_windows() {
        let (monitor, _cache, clock) = monitor();

        // Two requests a minute for an hour: each window counts its own
        // two, never the running total.
        for _ in 0..60 {
            monitor.record_request().await;
            monitor.record_request().await;
            clock.advance(Duration::from_secs(60));
        }

        monitor.record_request().await;
        monitor.record_request().await;

        let snapshot = monitor.metrics().await;
        assert_eq!(snapshot.window_requests, 2);
        assert_eq!(snapshot.level, TrafficLevel::Normal);
    }

    #[tokio::test]
    async fn hit_rate_from_hit_and_miss_counters() {
        let (monitor, _cache, _clock) = monitor();

        for _ in 0..3 {
            monitor.record_cache_hit().await;
        }
        monitor.record_cache_miss().await;

        let snapshot = monitor.metrics().await;
        assert!((snapshot.cache_hit_rate - 75.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn debounce_serves_previous_snapshot() {
        let (monitor, cache, clock) = monitor();

        feed_requests(&cache, &clock, 600).await;
        let first = monitor.metrics().await;
        assert_eq!(first.level, TrafficLevel::Critical);

        // Traffic drops, but within the debounce window the previous
        // snapshot is still reported.
        feed_requests(&cache, &clock, -600).await;
        clock.advance(Duration::from_secs(2));
        let debounced = monitor.metrics().await;
        assert_eq!(debounced.level, TrafficLevel::Critical);

        clock.advance(Duration::from_secs(4));
        let recomputed = monitor.metrics().await;
        assert_eq!(recomputed.level, TrafficLevel::Normal);
    }

    #[tokio::test]
    async fn record_request_feeds_the_window_counter() {
        let (monitor, cache, clock) = monitor();

        for _ in 0..4 {
            monitor.record_request().await;
        }

        let counter = CounterKey::requests(clock.now_utc(), Duration::from_secs(60));
        assert_eq!(cache.counter(&counter).await, 4);
    }
}
