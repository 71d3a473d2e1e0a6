//! Page-view analytics.
//!
//! Handlers record views fire-and-forget into a bounded in-memory queue;
//! a background interval task drains the queue and folds the counts into
//! rolling KV counters. `flush` is public so tests (and shutdown) can
//! drain deterministically. When the queue is full the view is dropped
//! and counted, never blocking a request.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, warn};

use crate::cache::CacheClient;
use crate::domain::keys::CounterKey;

const TARGET: &str = "raffica::analytics";

#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    /// Maximum views buffered between flushes.
    pub queue_capacity: usize,
    /// Cadence of the background flush task.
    pub flush_interval: Duration,
    /// Rolling window for the per-path view counters.
    pub view_window: Duration,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 4_096,
            flush_interval: Duration::from_secs(5),
            view_window: Duration::from_secs(86_400),
        }
    }
}

pub struct AnalyticsRecorder {
    cache: Arc<CacheClient>,
    config: AnalyticsConfig,
    queue: Mutex<VecDeque<String>>,
}

impl AnalyticsRecorder {
    pub fn new(cache: Arc<CacheClient>, config: AnalyticsConfig) -> Self {
        Self {
            cache,
            config,
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Enqueue one page view. Returns false when the queue was full and
    /// the view was dropped.
    pub fn record_view(&self, path: &str) -> bool {
        let mut queue = self.lock_queue();

        if queue.len() >= self.config.queue_capacity {
            metrics::counter!("raffica_analytics_dropped_total").increment(1);
            debug!(target: TARGET, path, "view queue full, dropping record");
            return false;
        }

        queue.push_back(path.to_string());
        metrics::gauge!("raffica_analytics_queue_len").set(queue.len() as f64);
        true
    }

    /// Drain the queue into KV view counters. Returns the number of
    /// views flushed.
    pub async fn flush(&self) -> usize {
        let drained: Vec<String> = {
            let mut queue = self.lock_queue();
            queue.drain(..).collect()
        };
        metrics::gauge!("raffica_analytics_queue_len").set(0.0);

        if drained.is_empty() {
            return 0;
        }

        let started = std::time::Instant::now();

        let mut per_path: HashMap<String, i64> = HashMap::new();
        for path in &drained {
            *per_path.entry(path.clone()).or_insert(0) += 1;
        }

        for (path, count) in per_path {
            self.cache
                .increment_by(
                    &CounterKey::page_views(&path),
                    count,
                    self.config.view_window,
                )
                .await;
        }

        metrics::histogram!("raffica_analytics_flush_ms")
            .record(started.elapsed().as_secs_f64() * 1_000.0);
        debug!(target: TARGET, views = drained.len(), "flushed page views");

        drained.len()
    }

    /// Number of views waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.lock_queue().len()
    }

    pub fn flush_interval(&self) -> Duration {
        self.config.flush_interval
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, VecDeque<String>> {
        self.queue.lock().unwrap_or_else(|poisoned| {
            warn!(target: TARGET, "recovered poisoned analytics queue lock");
            poisoned.into_inner()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::kv::MemoryStore;
    use crate::util::clock::ManualClock;

    fn recorder(capacity: usize) -> (AnalyticsRecorder, Arc<CacheClient>) {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let cache = Arc::new(CacheClient::new(store, clock));
        let config = AnalyticsConfig {
            queue_capacity: capacity,
            ..Default::default()
        };
        (AnalyticsRecorder::new(cache.clone(), config), cache)
    }

    #[tokio::test]
    async fn flush_aggregates_views_per_path() {
        let (recorder, cache) = recorder(100);

        recorder.record_view("/posts/hello");
        recorder.record_view("/posts/hello");
        recorder.record_view("/about");

        assert_eq!(recorder.pending(), 3);
        assert_eq!(recorder.flush().await, 3);
        assert_eq!(recorder.pending(), 0);

        assert_eq!(cache.counter(&CounterKey::page_views("/posts/hello")).await, 2);
        assert_eq!(cache.counter(&CounterKey::page_views("/about")).await, 1);
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let (recorder, _cache) = recorder(2);

        assert!(recorder.record_view("/a"));
        assert!(recorder.record_view("/b"));
        assert!(!recorder.record_view("/c"));
        assert_eq!(recorder.pending(), 2);
    }

    #[tokio::test]
    async fn flush_on_empty_queue_is_cheap() {
        let (recorder, _cache) = recorder(10);
        assert_eq!(recorder.flush().await, 0);
    }

    #[tokio::test]
    async fn counts_accumulate_across_flushes() {
        let (recorder, cache) = recorder(10);

        recorder.record_view("/posts/hello");
        recorder.flush().await;
        recorder.record_view("/posts/hello");
        recorder.flush().await;

        assert_eq!(cache.counter(&CounterKey::page_views("/posts/hello")).await, 2);
    }
}
