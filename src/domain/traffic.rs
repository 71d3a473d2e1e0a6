//! Traffic classification and the adaptive strategy decision table.
//!
//! Pure functions over measured load. The monitor produces
//! [`TrafficSnapshot`]s; the strategy maps them to a
//! [`StrategyDecision`]. Nothing here touches I/O.

use std::time::Duration;

use serde::Serialize;

/// Request-count watermarks separating the traffic levels, compared
/// against the number of requests observed inside the rolling request
/// window.
#[derive(Debug, Clone, Copy)]
pub struct TrafficThresholds {
    /// Above this many requests in the window the site counts as busy.
    pub high_watermark: u64,
    /// Above this the origin needs active protection.
    pub critical_watermark: u64,
}

impl Default for TrafficThresholds {
    fn default() -> Self {
        Self {
            high_watermark: 250,
            critical_watermark: 500,
        }
    }
}

/// Coarse load classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficLevel {
    Normal,
    High,
    Critical,
}

impl TrafficLevel {
    /// Classify the request count observed inside the rolling window.
    pub fn classify(window_requests: u64, thresholds: &TrafficThresholds) -> Self {
        if window_requests > thresholds.critical_watermark {
            TrafficLevel::Critical
        } else if window_requests > thresholds.high_watermark {
            TrafficLevel::High
        } else {
            TrafficLevel::Normal
        }
    }
}

/// Point-in-time view of measured load.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TrafficSnapshot {
    /// Requests counted in the rolling window; the classification input.
    pub window_requests: u64,
    pub requests_per_second: f64,
    /// Cache hit rate as a percentage, 0.0 when no reads were observed.
    pub cache_hit_rate: f64,
    pub level: TrafficLevel,
}

impl TrafficSnapshot {
    /// Snapshot representing an idle system; used before the first
    /// real computation.
    pub fn idle() -> Self {
        Self {
            window_requests: 0,
            requests_per_second: 0.0,
            cache_hit_rate: 0.0,
            level: TrafficLevel::Normal,
        }
    }

    pub fn is_high_traffic(&self) -> bool {
        self.level != TrafficLevel::Normal
    }
}

/// Caching posture derived from the current traffic level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StrategyDecision {
    /// How far past primary expiry a stale twin may still be served.
    #[serde(with = "duration_secs")]
    pub stale_window: Duration,
    /// Drop non-critical writes.
    pub disable_writes: bool,
    /// Reject mutating requests at the edge outside the essential set.
    pub read_only: bool,
    /// Handlers should prefer cached data over fresh fetches.
    pub reduced_refresh: bool,
}

impl StrategyDecision {
    pub fn for_level(level: TrafficLevel) -> Self {
        match level {
            TrafficLevel::Critical => Self {
                stale_window: Duration::from_secs(86_400),
                disable_writes: true,
                read_only: true,
                reduced_refresh: true,
            },
            TrafficLevel::High => Self {
                stale_window: Duration::from_secs(3_600),
                disable_writes: false,
                read_only: false,
                reduced_refresh: true,
            },
            TrafficLevel::Normal => Self {
                stale_window: Duration::from_secs(300),
                disable_writes: false,
                read_only: false,
                reduced_refresh: false,
            },
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_watermarks_are_exclusive() {
        let thresholds = TrafficThresholds::default();

        assert_eq!(
            TrafficLevel::classify(100, &thresholds),
            TrafficLevel::Normal
        );
        assert_eq!(
            TrafficLevel::classify(250, &thresholds),
            TrafficLevel::Normal
        );
        assert_eq!(TrafficLevel::classify(251, &thresholds), TrafficLevel::High);
        assert_eq!(TrafficLevel::classify(500, &thresholds), TrafficLevel::High);
        assert_eq!(
            TrafficLevel::classify(501, &thresholds),
            TrafficLevel::Critical
        );
    }

    #[test]
    fn window_count_drives_the_level_directly() {
        // A burst of 600 requests inside one window must protect the
        // origin even though it averages only 10 per second over 60s.
        let thresholds = TrafficThresholds::default();

        assert_eq!(
            TrafficLevel::classify(600, &thresholds),
            TrafficLevel::Critical
        );
    }

    #[test]
    fn critical_decision_protects_the_origin() {
        let decision = StrategyDecision::for_level(TrafficLevel::Critical);

        assert_eq!(decision.stale_window, Duration::from_secs(86_400));
        assert!(decision.disable_writes);
        assert!(decision.read_only);
        assert!(decision.reduced_refresh);
    }

    #[test]
    fn high_decision_keeps_writes_enabled() {
        let decision = StrategyDecision::for_level(TrafficLevel::High);

        assert_eq!(decision.stale_window, Duration::from_secs(3_600));
        assert!(!decision.disable_writes);
        assert!(!decision.read_only);
        assert!(decision.reduced_refresh);
    }

    #[test]
    fn normal_decision_has_no_restrictions() {
        let decision = StrategyDecision::for_level(TrafficLevel::Normal);

        assert_eq!(decision.stale_window, Duration::from_secs(300));
        assert!(!decision.disable_writes);
        assert!(!decision.read_only);
        assert!(!decision.reduced_refresh);
    }
}
