//! Raffica caching core.
//!
//! - `client`: fail-open KV cache access with tiered TTLs and stale twins
//! - `breaker`: per-resource circuit breakers around origin calls
//! - `monitor`: rolling-window traffic counters and load classification
//! - `strategy`: traffic-adaptive posture and the resilient read path

mod breaker;
mod client;
mod monitor;
mod strategy;

pub use breaker::{BreakerConfig, BreakerRegistry, CircuitBreaker};
pub use client::{CacheClient, StaleEntry};
pub use monitor::{MonitorConfig, TrafficMonitor};
pub use strategy::{AdaptiveStrategy, StrategyConfig};
