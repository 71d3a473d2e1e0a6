//! Adaptive cache strategy.
//!
//! Turns the monitor's load classification into concrete caching
//! behavior: how stale a fallback may be, whether non-critical writes are
//! dropped, and whether the edge goes read-only. Also owns the resilient
//! read path (`get_with_fallback`) and the operator-facing high-traffic
//! override.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::domain::freshness::Freshness;
use crate::domain::keys::FlagKey;
use crate::domain::traffic::{StrategyDecision, TrafficLevel};

use super::client::CacheClient;
use super::monitor::TrafficMonitor;

const TARGET: &str = "raffica::cache::strategy";

#[derive(Debug, Clone)]
pub struct StrategyConfig {
    /// Budget for a live fetch before falling back to stale data.
    pub fetch_timeout: Duration,
    /// Auto-expiry on the operator override flag.
    pub override_ttl: Duration,
    /// Operation-name fragments that may write even in read-only mode.
    pub critical_operations: Vec<String>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(3),
            override_ttl: Duration::from_secs(1_800),
            critical_operations: vec![
                "auth".to_string(),
                "blog:create".to_string(),
                "admin:settings".to_string(),
            ],
        }
    }
}

pub struct AdaptiveStrategy {
    cache: Arc<CacheClient>,
    monitor: Arc<TrafficMonitor>,
    config: StrategyConfig,
}

impl AdaptiveStrategy {
    pub fn new(cache: Arc<CacheClient>, monitor: Arc<TrafficMonitor>, config: StrategyConfig) -> Self {
        Self {
            cache,
            monitor,
            config,
        }
    }

    /// Current caching posture. The operator override forces the
    /// critical posture regardless of measured load.
    pub async fn decision(&self) -> StrategyDecision {
        if self.cache.flag(&FlagKey::HighTraffic).await {
            return StrategyDecision::for_level(TrafficLevel::Critical);
        }
        let snapshot = self.monitor.metrics().await;
        StrategyDecision::for_level(snapshot.level)
    }

    /// Whether a write operation should be dropped under the current
    /// posture. Operations matching a critical fragment always proceed.
    pub async fn should_skip_write(&self, operation: &str) -> bool {
        let decision = self.decision().await;
        if !decision.disable_writes {
            return false;
        }

        let critical = self
            .config
            .critical_operations
            .iter()
            .any(|fragment| operation.contains(fragment.as_str()));

        if !critical {
            info!(
                target: TARGET,
                operation, "dropping non-critical write under load"
            );
        }
        !critical
    }

    /// Resilient read path: primary cache, then a time-boxed live fetch,
    /// then the stale twin.
    ///
    /// A successful fetch refreshes both the primary entry and its stale
    /// twin. On timeout or fetch failure the stale twin is served if it
    /// is younger than the currently decided stale window. The losing
    /// fetch future is dropped, not cancelled at the source.
    pub async fn get_with_fallback<T, E, F, Fut>(
        &self,
        name: &str,
        freshness: Freshness,
        fetch: F,
    ) -> Option<T>
    where
        T: Serialize + DeserializeOwned,
        E: std::fmt::Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.cache.get::<T>(name).await {
            self.monitor.record_cache_hit().await;
            return Some(value);
        }
        self.monitor.record_cache_miss().await;

        match tokio::time::timeout(self.config.fetch_timeout, fetch()).await {
            Ok(Ok(value)) => {
                self.cache.set(name, &value, freshness).await;
                self.cache.set_stale(name, &value).await;
                Some(value)
            }
            Ok(Err(err)) => {
                warn!(target: TARGET, name, error = %err, "live fetch failed, trying stale twin");
                self.stale_fallback(name).await
            }
            Err(_elapsed) => {
                warn!(
                    target: TARGET,
                    name,
                    timeout_ms = self.config.fetch_timeout.as_millis() as u64,
                    "live fetch timed out, trying stale twin"
                );
                self.stale_fallback(name).await
            }
        }
    }

    async fn stale_fallback<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let decision = self.decision().await;
        let entry = self.cache.get_stale::<T>(name).await?;
        let age = entry.age(self.cache.clock().now_utc());

        if age <= decision.stale_window {
            metrics::counter!("raffica_cache_stale_served_total").increment(1);
            info!(
                target: TARGET,
                name,
                age_secs = age.as_secs(),
                window_secs = decision.stale_window.as_secs(),
                "serving stale data"
            );
            Some(entry.value)
        } else {
            debug!(
                target: TARGET,
                name,
                age_secs = age.as_secs(),
                window_secs = decision.stale_window.as_secs(),
                "stale twin too old for the current window"
            );
            None
        }
    }

    /// Operator override: force the critical posture ahead of a known
    /// traffic event. The flag expires on its own after the configured
    /// TTL in case it is forgotten.
    pub async fn enable_high_traffic_mode(&self) -> bool {
        info!(
            target: TARGET,
            ttl_secs = self.config.override_ttl.as_secs(),
            "high-traffic mode enabled"
        );
        self.cache
            .set_flag(&FlagKey::HighTraffic, self.config.override_ttl)
            .await
    }

    pub async fn disable_high_traffic_mode(&self) -> bool {
        info!(target: TARGET, "high-traffic mode disabled");
        self.cache.clear_flag(&FlagKey::HighTraffic).await
    }
}
