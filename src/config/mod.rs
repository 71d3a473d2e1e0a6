//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::admission::{BlocklistConfig, RateLimitPolicies, RateLimitPolicy};
use crate::analytics::AnalyticsConfig;
use crate::cache::{BreakerConfig, MonitorConfig, StrategyConfig};
use crate::domain::traffic::TrafficThresholds;
use crate::infra::http::EdgeSettings;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "raffica";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_AUTH_WINDOW_SECS: u64 = 300;
const DEFAULT_AUTH_MAX_REQUESTS: u64 = 10;
const DEFAULT_API_WINDOW_SECS: u64 = 60;
const DEFAULT_API_MAX_REQUESTS: u64 = 120;
const DEFAULT_PUBLIC_WINDOW_SECS: u64 = 60;
const DEFAULT_PUBLIC_MAX_REQUESTS: u64 = 180;
const DEFAULT_BOT_WINDOW_SECS: u64 = 600;
const DEFAULT_BOT_MAX_REQUESTS: u64 = 10;
const DEFAULT_VIOLATION_THRESHOLD: u32 = 5;
const DEFAULT_VIOLATION_WINDOW_SECS: u64 = 600;
const DEFAULT_BLOCK_DURATION_SECS: u64 = 3_600;
const DEFAULT_HIGH_WATERMARK: u64 = 250;
const DEFAULT_CRITICAL_WATERMARK: u64 = 500;
const DEFAULT_REQUEST_WINDOW_SECS: u64 = 60;
const DEFAULT_HIT_WINDOW_SECS: u64 = 3_600;
const DEFAULT_DEBOUNCE_SECS: u64 = 5;
const DEFAULT_FETCH_TIMEOUT_MS: u64 = 3_000;
const DEFAULT_OVERRIDE_TTL_SECS: u64 = 1_800;
const DEFAULT_BREAKER_THRESHOLD: u32 = 5;
const DEFAULT_BREAKER_COOLDOWN_SECS: u64 = 30;
const DEFAULT_ANALYTICS_QUEUE_CAPACITY: u64 = 4_096;
const DEFAULT_ANALYTICS_FLUSH_INTERVAL_MS: u64 = 5_000;
const DEFAULT_ANALYTICS_VIEW_WINDOW_SECS: u64 = 86_400;

fn default_critical_operations() -> Vec<String> {
    vec![
        "auth".to_string(),
        "blog:create".to_string(),
        "admin:settings".to_string(),
    ]
}

/// Command-line arguments for the Raffica binary.
#[derive(Debug, Parser)]
#[command(name = "raffica", version, about = "Raffica edge cache server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "RAFFICA_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the Raffica HTTP service.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the key-value backend (memory|redis).
    #[arg(long = "kv-backend", value_name = "BACKEND")]
    pub kv_backend: Option<String>,

    /// Override the Redis connection URL.
    #[arg(long = "kv-redis-url", env = "RAFFICA_REDIS_URL", value_name = "URL")]
    pub kv_redis_url: Option<String>,

    /// Override the high-traffic watermark in requests per window.
    #[arg(long = "traffic-high-watermark", value_name = "REQUESTS")]
    pub traffic_high_watermark: Option<u64>,

    /// Override the critical-traffic watermark in requests per window.
    #[arg(long = "traffic-critical-watermark", value_name = "REQUESTS")]
    pub traffic_critical_watermark: Option<u64>,

    /// Override the live-fetch timeout in milliseconds.
    #[arg(long = "strategy-fetch-timeout-ms", value_name = "MILLIS")]
    pub strategy_fetch_timeout_ms: Option<u64>,

    /// Toggle public Cache-Control headers.
    #[arg(
        long = "edge-cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub edge_cache_enabled: Option<bool>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub kv: KvSettings,
    pub rate_limit: RateLimitSettings,
    pub blocklist: BlocklistSettings,
    pub traffic: TrafficSettings,
    pub strategy: StrategySettings,
    pub breaker: BreakerSettings,
    pub edge: EdgeSettings,
    pub analytics: AnalyticsSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone)]
pub struct KvSettings {
    pub backend: KvBackend,
    pub redis_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub auth: PolicySettings,
    pub api: PolicySettings,
    pub public: PolicySettings,
    pub bot: PolicySettings,
}

#[derive(Debug, Clone, Copy)]
pub struct PolicySettings {
    pub window: Duration,
    pub max_requests: u32,
}

impl RateLimitSettings {
    pub fn policies(&self) -> RateLimitPolicies {
        RateLimitPolicies {
            auth: policy("auth", &self.auth),
            api: policy("api", &self.api),
            public: policy("public", &self.public),
            bot: policy("bot", &self.bot),
        }
    }
}

fn policy(name: &'static str, settings: &PolicySettings) -> RateLimitPolicy {
    RateLimitPolicy {
        name,
        window: settings.window,
        max_requests: settings.max_requests,
    }
}

#[derive(Debug, Clone)]
pub struct BlocklistSettings {
    pub violation_threshold: u32,
    pub violation_window: Duration,
    pub block_duration: Duration,
}

impl From<&BlocklistSettings> for BlocklistConfig {
    fn from(settings: &BlocklistSettings) -> Self {
        Self {
            violation_threshold: settings.violation_threshold,
            violation_window: settings.violation_window,
            block_duration: settings.block_duration,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrafficSettings {
    pub high_watermark: u64,
    pub critical_watermark: u64,
    pub request_window: Duration,
    pub hit_window: Duration,
    pub debounce: Duration,
}

impl From<&TrafficSettings> for MonitorConfig {
    fn from(settings: &TrafficSettings) -> Self {
        Self {
            thresholds: TrafficThresholds {
                high_watermark: settings.high_watermark,
                critical_watermark: settings.critical_watermark,
            },
            request_window: settings.request_window,
            hit_window: settings.hit_window,
            debounce: settings.debounce,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StrategySettings {
    pub fetch_timeout: Duration,
    pub override_ttl: Duration,
    pub critical_operations: Vec<String>,
}

impl From<&StrategySettings> for StrategyConfig {
    fn from(settings: &StrategySettings) -> Self {
        Self {
            fetch_timeout: settings.fetch_timeout,
            override_ttl: settings.override_ttl,
            critical_operations: settings.critical_operations.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl From<&BreakerSettings> for BreakerConfig {
    fn from(settings: &BreakerSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold,
            cooldown: settings.cooldown,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalyticsSettings {
    pub queue_capacity: usize,
    pub flush_interval: Duration,
    pub view_window: Duration,
}

impl From<&AnalyticsSettings> for AnalyticsConfig {
    fn from(settings: &AnalyticsSettings) -> Self {
        Self {
            queue_capacity: settings.queue_capacity,
            flush_interval: settings.flush_interval,
            view_window: settings.view_window,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("RAFFICA").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    kv: RawKvSettings,
    rate_limit: RawRateLimitSettings,
    blocklist: RawBlocklistSettings,
    traffic: RawTrafficSettings,
    strategy: RawStrategySettings,
    breaker: RawBreakerSettings,
    edge: RawEdgeSettings,
    analytics: RawAnalyticsSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(backend) = overrides.kv_backend.as_ref() {
            self.kv.backend = Some(backend.clone());
        }
        if let Some(url) = overrides.kv_redis_url.as_ref() {
            self.kv.redis_url = Some(url.clone());
        }
        if let Some(requests) = overrides.traffic_high_watermark {
            self.traffic.high_watermark = Some(requests);
        }
        if let Some(requests) = overrides.traffic_critical_watermark {
            self.traffic.critical_watermark = Some(requests);
        }
        if let Some(millis) = overrides.strategy_fetch_timeout_ms {
            self.strategy.fetch_timeout_ms = Some(millis);
        }
        if let Some(enabled) = overrides.edge_cache_enabled {
            self.edge.cache_enabled = Some(enabled);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            kv,
            rate_limit,
            blocklist,
            traffic,
            strategy,
            breaker,
            edge,
            analytics,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            kv: build_kv_settings(kv)?,
            rate_limit: build_rate_limit_settings(rate_limit)?,
            blocklist: build_blocklist_settings(blocklist)?,
            traffic: build_traffic_settings(traffic)?,
            strategy: build_strategy_settings(strategy)?,
            breaker: build_breaker_settings(breaker)?,
            edge: build_edge_settings(edge),
            analytics: build_analytics_settings(analytics)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }
    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_kv_settings(kv: RawKvSettings) -> Result<KvSettings, LoadError> {
    let backend = match kv.backend.as_deref() {
        None | Some("memory") => KvBackend::Memory,
        Some("redis") => KvBackend::Redis,
        Some(other) => {
            return Err(LoadError::invalid(
                "kv.backend",
                format!("unknown backend `{other}`, expected memory or redis"),
            ));
        }
    };

    let redis_url = kv.redis_url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    if backend == KvBackend::Redis && redis_url.is_none() {
        return Err(LoadError::invalid(
            "kv.redis_url",
            "required when kv.backend is redis",
        ));
    }

    Ok(KvSettings { backend, redis_url })
}

fn build_rate_limit_settings(
    rate_limit: RawRateLimitSettings,
) -> Result<RateLimitSettings, LoadError> {
    Ok(RateLimitSettings {
        auth: build_policy_settings(
            rate_limit.auth,
            "rate_limit.auth",
            DEFAULT_AUTH_WINDOW_SECS,
            DEFAULT_AUTH_MAX_REQUESTS,
        )?,
        api: build_policy_settings(
            rate_limit.api,
            "rate_limit.api",
            DEFAULT_API_WINDOW_SECS,
            DEFAULT_API_MAX_REQUESTS,
        )?,
        public: build_policy_settings(
            rate_limit.public,
            "rate_limit.public",
            DEFAULT_PUBLIC_WINDOW_SECS,
            DEFAULT_PUBLIC_MAX_REQUESTS,
        )?,
        bot: build_policy_settings(
            rate_limit.bot,
            "rate_limit.bot",
            DEFAULT_BOT_WINDOW_SECS,
            DEFAULT_BOT_MAX_REQUESTS,
        )?,
    })
}

fn build_policy_settings(
    raw: RawPolicySettings,
    key: &'static str,
    default_window: u64,
    default_max: u64,
) -> Result<PolicySettings, LoadError> {
    let window_seconds = raw.window_seconds.unwrap_or(default_window);
    if window_seconds == 0 {
        return Err(LoadError::invalid(key, "window must be greater than zero"));
    }
    let max_requests = raw.max_requests.unwrap_or(default_max);
    if max_requests == 0 {
        return Err(LoadError::invalid(
            key,
            "request ceiling must be greater than zero",
        ));
    }
    let max_requests: u32 = max_requests
        .try_into()
        .map_err(|_| LoadError::invalid(key, "request ceiling exceeds supported range"))?;

    Ok(PolicySettings {
        window: Duration::from_secs(window_seconds),
        max_requests,
    })
}

fn build_blocklist_settings(
    blocklist: RawBlocklistSettings,
) -> Result<BlocklistSettings, LoadError> {
    let violation_threshold = blocklist
        .violation_threshold
        .unwrap_or(DEFAULT_VIOLATION_THRESHOLD);
    let violation_window_seconds = blocklist
        .violation_window_seconds
        .unwrap_or(DEFAULT_VIOLATION_WINDOW_SECS);
    if violation_window_seconds == 0 {
        return Err(LoadError::invalid(
            "blocklist.violation_window_seconds",
            "must be greater than zero",
        ));
    }
    let block_duration_seconds = blocklist
        .block_duration_seconds
        .unwrap_or(DEFAULT_BLOCK_DURATION_SECS);
    if block_duration_seconds == 0 {
        return Err(LoadError::invalid(
            "blocklist.block_duration_seconds",
            "must be greater than zero",
        ));
    }

    Ok(BlocklistSettings {
        violation_threshold,
        violation_window: Duration::from_secs(violation_window_seconds),
        block_duration: Duration::from_secs(block_duration_seconds),
    })
}

fn build_traffic_settings(traffic: RawTrafficSettings) -> Result<TrafficSettings, LoadError> {
    let high_watermark = traffic.high_watermark.unwrap_or(DEFAULT_HIGH_WATERMARK);
    let critical_watermark = traffic
        .critical_watermark
        .unwrap_or(DEFAULT_CRITICAL_WATERMARK);
    if high_watermark == 0 {
        return Err(LoadError::invalid(
            "traffic.high_watermark",
            "must be greater than zero",
        ));
    }
    if critical_watermark <= high_watermark {
        return Err(LoadError::invalid(
            "traffic.critical_watermark",
            "must be greater than traffic.high_watermark",
        ));
    }

    let request_window_seconds = traffic
        .request_window_seconds
        .unwrap_or(DEFAULT_REQUEST_WINDOW_SECS);
    if request_window_seconds == 0 {
        return Err(LoadError::invalid(
            "traffic.request_window_seconds",
            "must be greater than zero",
        ));
    }
    let hit_window_seconds = traffic.hit_window_seconds.unwrap_or(DEFAULT_HIT_WINDOW_SECS);
    if hit_window_seconds == 0 {
        return Err(LoadError::invalid(
            "traffic.hit_window_seconds",
            "must be greater than zero",
        ));
    }
    let debounce_seconds = traffic.debounce_seconds.unwrap_or(DEFAULT_DEBOUNCE_SECS);

    Ok(TrafficSettings {
        high_watermark,
        critical_watermark,
        request_window: Duration::from_secs(request_window_seconds),
        hit_window: Duration::from_secs(hit_window_seconds),
        debounce: Duration::from_secs(debounce_seconds),
    })
}

fn build_strategy_settings(strategy: RawStrategySettings) -> Result<StrategySettings, LoadError> {
    let fetch_timeout_ms = strategy.fetch_timeout_ms.unwrap_or(DEFAULT_FETCH_TIMEOUT_MS);
    if fetch_timeout_ms == 0 {
        return Err(LoadError::invalid(
            "strategy.fetch_timeout_ms",
            "must be greater than zero",
        ));
    }
    let override_ttl_seconds = strategy
        .override_ttl_seconds
        .unwrap_or(DEFAULT_OVERRIDE_TTL_SECS);
    if override_ttl_seconds == 0 {
        return Err(LoadError::invalid(
            "strategy.override_ttl_seconds",
            "must be greater than zero",
        ));
    }
    let critical_operations = strategy
        .critical_operations
        .unwrap_or_else(default_critical_operations);

    Ok(StrategySettings {
        fetch_timeout: Duration::from_millis(fetch_timeout_ms),
        override_ttl: Duration::from_secs(override_ttl_seconds),
        critical_operations,
    })
}

fn build_breaker_settings(breaker: RawBreakerSettings) -> Result<BreakerSettings, LoadError> {
    let failure_threshold = breaker
        .failure_threshold
        .unwrap_or(DEFAULT_BREAKER_THRESHOLD);
    if failure_threshold == 0 {
        return Err(LoadError::invalid(
            "breaker.failure_threshold",
            "must be greater than zero",
        ));
    }
    let cooldown_seconds = breaker
        .cooldown_seconds
        .unwrap_or(DEFAULT_BREAKER_COOLDOWN_SECS);
    if cooldown_seconds == 0 {
        return Err(LoadError::invalid(
            "breaker.cooldown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(BreakerSettings {
        failure_threshold,
        cooldown: Duration::from_secs(cooldown_seconds),
    })
}

fn build_edge_settings(edge: RawEdgeSettings) -> EdgeSettings {
    let defaults = EdgeSettings::default();
    EdgeSettings {
        edge_cache_enabled: edge.cache_enabled.unwrap_or(defaults.edge_cache_enabled),
        essential_paths: edge.essential_paths.unwrap_or(defaults.essential_paths),
    }
}

fn build_analytics_settings(
    analytics: RawAnalyticsSettings,
) -> Result<AnalyticsSettings, LoadError> {
    let queue_capacity = analytics
        .queue_capacity
        .unwrap_or(DEFAULT_ANALYTICS_QUEUE_CAPACITY);
    if queue_capacity == 0 {
        return Err(LoadError::invalid(
            "analytics.queue_capacity",
            "must be greater than zero",
        ));
    }
    let queue_capacity: usize = queue_capacity
        .try_into()
        .map_err(|_| LoadError::invalid("analytics.queue_capacity", "exceeds supported range"))?;

    let flush_interval_ms = analytics
        .flush_interval_ms
        .unwrap_or(DEFAULT_ANALYTICS_FLUSH_INTERVAL_MS);
    if flush_interval_ms == 0 {
        return Err(LoadError::invalid(
            "analytics.flush_interval_ms",
            "must be greater than zero",
        ));
    }
    let view_window_seconds = analytics
        .view_window_seconds
        .unwrap_or(DEFAULT_ANALYTICS_VIEW_WINDOW_SECS);
    if view_window_seconds == 0 {
        return Err(LoadError::invalid(
            "analytics.view_window_seconds",
            "must be greater than zero",
        ));
    }

    Ok(AnalyticsSettings {
        queue_capacity,
        flush_interval: Duration::from_millis(flush_interval_ms),
        view_window: Duration::from_secs(view_window_seconds),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawKvSettings {
    backend: Option<String>,
    redis_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRateLimitSettings {
    auth: RawPolicySettings,
    api: RawPolicySettings,
    public: RawPolicySettings,
    bot: RawPolicySettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPolicySettings {
    window_seconds: Option<u64>,
    max_requests: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBlocklistSettings {
    violation_threshold: Option<u32>,
    violation_window_seconds: Option<u64>,
    block_duration_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawTrafficSettings {
    high_watermark: Option<u64>,
    critical_watermark: Option<u64>,
    request_window_seconds: Option<u64>,
    hit_window_seconds: Option<u64>,
    debounce_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStrategySettings {
    fetch_timeout_ms: Option<u64>,
    override_ttl_seconds: Option<u64>,
    critical_operations: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBreakerSettings {
    failure_threshold: Option<u32>,
    cooldown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawEdgeSettings {
    cache_enabled: Option<bool>,
    essential_paths: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAnalyticsSettings {
    queue_capacity: Option<u64>,
    flush_interval_ms: Option<u64>,
    view_window_seconds: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_policy_table() {
        let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

        assert_eq!(settings.rate_limit.auth.window, Duration::from_secs(300));
        assert_eq!(settings.rate_limit.auth.max_requests, 10);
        assert_eq!(settings.rate_limit.public.max_requests, 180);
        assert_eq!(settings.rate_limit.bot.window, Duration::from_secs(600));
        assert_eq!(settings.traffic.high_watermark, 250);
        assert_eq!(settings.traffic.critical_watermark, 500);
        assert_eq!(settings.strategy.fetch_timeout, Duration::from_millis(3_000));
        assert_eq!(settings.breaker.failure_threshold, 5);
        assert_eq!(settings.breaker.cooldown, Duration::from_secs(30));
    }

    #[test]
    fn cli_overrides_take_highest_precedence() {
        let mut raw = RawSettings::default();
        raw.server.port = Some(4000);
        raw.logging.level = Some("info".to_string());

        let overrides = ServeOverrides {
            server_port: Some(4321),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert_eq!(settings.server.addr.port(), 4321);
        assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    }

    #[test]
    fn redis_backend_requires_a_url() {
        let mut raw = RawSettings::default();
        raw.kv.backend = Some("redis".to_string());

        let err = Settings::from_raw(raw).expect_err("missing url must fail");
        assert!(matches!(err, LoadError::Invalid { key, .. } if key == "kv.redis_url"));
    }

    #[test]
    fn redis_backend_with_url_resolves() {
        let mut raw = RawSettings::default();
        raw.kv.backend = Some("redis".to_string());
        raw.kv.redis_url = Some("redis://127.0.0.1:6379".to_string());

        let settings = Settings::from_raw(raw).expect("valid settings");
        assert_eq!(settings.kv.backend, KvBackend::Redis);
        assert_eq!(
            settings.kv.redis_url.as_deref(),
            Some("redis://127.0.0.1:6379")
        );
    }

    #[test]
    fn critical_watermark_must_exceed_high() {
        let mut raw = RawSettings::default();
        raw.traffic.high_watermark = Some(600);

        let err = Settings::from_raw(raw).expect_err("inverted watermarks must fail");
        assert!(matches!(err, LoadError::Invalid { key, .. } if key == "traffic.critical_watermark"));
    }

    #[test]
    fn zero_window_is_rejected() {
        let mut raw = RawSettings::default();
        raw.rate_limit.api.window_seconds = Some(0);

        let err = Settings::from_raw(raw).expect_err("zero window must fail");
        assert!(matches!(err, LoadError::Invalid { key, .. } if key == "rate_limit.api"));
    }
}
