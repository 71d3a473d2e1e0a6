use std::collections::HashSet;
use std::sync::Arc;

use metrics_util::debugging::DebuggingRecorder;
use raffica::analytics::{AnalyticsConfig, AnalyticsRecorder};
use raffica::cache::{
    AdaptiveStrategy, BreakerConfig, CacheClient, CircuitBreaker, MonitorConfig, StrategyConfig,
    TrafficMonitor,
};
use raffica::domain::freshness::Freshness;
use raffica::infra::kv::{KvStore, MemoryStore};
use raffica::util::clock::{Clock, ManualClock};

#[tokio::test]
async fn adaptive_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new());
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new(clock.clone()));
    let cache = Arc::new(CacheClient::new(store, clock.clone()));
    let monitor = Arc::new(TrafficMonitor::new(
        cache.clone(),
        MonitorConfig::default(),
        clock.clone(),
    ));
    let strategy = AdaptiveStrategy::new(cache.clone(), monitor, StrategyConfig::default());

    // Miss then hit through the fallback read path.
    let fetched = strategy
        .get_with_fallback("metrics:first", Freshness::Hot, || async {
            Ok::<_, &str>("fresh".to_string())
        })
        .await;
    assert_eq!(fetched.as_deref(), Some("fresh"));
    let fetched = strategy
        .get_with_fallback("metrics:first", Freshness::Hot, || async {
            Ok::<_, &str>("unused".to_string())
        })
        .await;
    assert_eq!(fetched.as_deref(), Some("fresh"));

    // Failed fetch served from the stale twin.
    assert!(cache.set_stale("metrics:second", &"old".to_string()).await);
    let fetched = strategy
        .get_with_fallback("metrics:second", Freshness::Hot, || async {
            Err::<String, _>("origin down")
        })
        .await;
    assert_eq!(fetched.as_deref(), Some("old"));

    // Breaker opens on the first failure, short-circuits the second call.
    let breaker = CircuitBreaker::new(
        "origin:test",
        BreakerConfig {
            failure_threshold: 0,
            ..Default::default()
        },
        clock,
    );
    assert!(
        breaker
            .call(|| async { Err::<(), _>("boom") })
            .await
            .is_none()
    );
    assert!(
        breaker
            .call(|| async { Ok::<_, &str>(()) })
            .await
            .is_none()
    );

    // Overflowing view queue drops, then a flush records its latency.
    let analytics = AnalyticsRecorder::new(
        cache,
        AnalyticsConfig {
            queue_capacity: 1,
            ..Default::default()
        },
    );
    assert!(analytics.record_view("/posts/one"));
    assert!(!analytics.record_view("/posts/two"));
    assert_eq!(analytics.flush().await, 1);

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "raffica_cache_hit_total",
        "raffica_cache_miss_total",
        "raffica_cache_stale_served_total",
        "raffica_breaker_open_total",
        "raffica_breaker_short_circuit_total",
        "raffica_analytics_dropped_total",
        "raffica_analytics_queue_len",
        "raffica_analytics_flush_ms",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
