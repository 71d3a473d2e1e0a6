//! Raffica: traffic-adaptive caching and admission control for a
//! content site.
//!
//! The crate is organised in layers. `domain` holds pure policy types
//! (freshness tiers, key registry, traffic classification). `infra`
//! holds the key-value store abstraction, telemetry, and the HTTP edge
//! stack. `cache`, `admission`, and `analytics` implement the adaptive
//! behaviour on top of them.

pub mod admission;
pub mod analytics;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod util;
