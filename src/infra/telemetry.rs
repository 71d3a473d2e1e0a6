use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "raffica_cache_hit_total",
            Unit::Count,
            "Total number of primary cache hits."
        );
        describe_counter!(
            "raffica_cache_miss_total",
            Unit::Count,
            "Total number of primary cache misses."
        );
        describe_counter!(
            "raffica_cache_stale_served_total",
            Unit::Count,
            "Responses served from the stale twin after a failed or slow fetch."
        );
        describe_counter!(
            "raffica_kv_error_total",
            Unit::Count,
            "KV store operations that failed and were recovered fail-open."
        );
        describe_counter!(
            "raffica_admission_rejected_total",
            Unit::Count,
            "Requests rejected at the edge (rate limit, blocklist, write gate)."
        );
        describe_counter!(
            "raffica_breaker_open_total",
            Unit::Count,
            "Circuit breaker transitions into the open state."
        );
        describe_counter!(
            "raffica_breaker_short_circuit_total",
            Unit::Count,
            "Calls rejected without execution while a breaker was open."
        );
        describe_counter!(
            "raffica_analytics_dropped_total",
            Unit::Count,
            "Page-view records dropped due to queue overflow."
        );
        describe_gauge!(
            "raffica_analytics_queue_len",
            Unit::Count,
            "Current number of pending page-view records."
        );
        describe_histogram!(
            "raffica_analytics_flush_ms",
            Unit::Milliseconds,
            "Analytics flush latency in milliseconds."
        );
    });
}
