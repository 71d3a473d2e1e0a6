//! Freshness classes and the TTL policy table.
//!
//! Call sites declare *how fresh* a value must be; this module owns *how
//! many seconds* that means. Adding a class is a one-line change here and
//! nowhere else.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// TTL applied to stale twin entries, regardless of freshness class.
pub const STALE_TTL: Duration = Duration::from_secs(86_400);

/// Named freshness tier for cached values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    /// Frequently changing data (listings, counters-adjacent reads).
    Hot,
    /// Content that changes a few times a day.
    Warm,
    /// Content that rarely changes.
    Cold,
    /// Effectively static data.
    Frozen,
}

impl Freshness {
    /// Concrete expiration for this tier.
    pub fn ttl(self) -> Duration {
        let secs = match self {
            Freshness::Hot => 300,
            Freshness::Warm => 1_800,
            Freshness::Cold => 3_600,
            Freshness::Frozen => 86_400,
        };
        Duration::from_secs(secs)
    }
}
