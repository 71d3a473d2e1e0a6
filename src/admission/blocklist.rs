//! IP blocklist with violation escalation.
//!
//! A block is a KV key with TTL equal to the block duration; absence
//! means not blocked. Violations (rate-limit breaches, bot heuristics)
//! accumulate per IP in a tracked window and escalate to a block once
//! the threshold is exceeded.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::domain::keys;
use crate::infra::kv::KvStore;

const TARGET: &str = "raffica::admission::blocklist";

#[derive(Debug, Clone, Copy)]
pub struct BlocklistConfig {
    /// Violations beyond this count within the window trigger a block.
    pub violation_threshold: u32,
    /// Window over which violations are accumulated.
    pub violation_window: Duration,
    /// How long an escalated block lasts.
    pub block_duration: Duration,
}

impl Default for BlocklistConfig {
    fn default() -> Self {
        Self {
            violation_threshold: 5,
            violation_window: Duration::from_secs(600),
            block_duration: Duration::from_secs(3_600),
        }
    }
}

pub struct IpBlocklist {
    store: Arc<dyn KvStore>,
    config: BlocklistConfig,
}

impl IpBlocklist {
    pub fn new(store: Arc<dyn KvStore>, config: BlocklistConfig) -> Self {
        Self { store, config }
    }

    /// Whether requests from this IP should be rejected outright.
    /// Fails open: an unreachable store never blocks legitimate traffic.
    pub async fn is_blocked(&self, ip: IpAddr) -> bool {
        match self.store.get(&keys::blocked_key(ip)).await {
            Ok(value) => value.is_some(),
            Err(err) => {
                warn!(target: TARGET, %ip, error = %err, "blocklist check failed, admitting");
                false
            }
        }
    }

    /// Block an IP for the given duration.
    pub async fn block(&self, ip: IpAddr, duration: Duration) -> bool {
        match self
            .store
            .set_ex(&keys::blocked_key(ip), "1", duration)
            .await
        {
            Ok(()) => {
                warn!(
                    target: TARGET,
                    %ip,
                    duration_secs = duration.as_secs(),
                    "ip blocked"
                );
                true
            }
            Err(err) => {
                warn!(target: TARGET, %ip, error = %err, "failed to write block entry");
                false
            }
        }
    }

    /// Record one violation for this IP, escalating to a block once the
    /// threshold is exceeded. Returns true when the IP is now blocked.
    pub async fn record_violation(&self, ip: IpAddr) -> bool {
        let key = keys::violations_key(ip);
        let count = match self.store.incr_by(&key, 1).await {
            Ok(count) => {
                if count == 1 {
                    if let Err(err) = self.store.expire(&key, self.config.violation_window).await {
                        warn!(target: TARGET, %ip, error = %err, "failed to set violation window");
                    }
                }
                count
            }
            Err(err) => {
                warn!(target: TARGET, %ip, error = %err, "violation counter unreachable");
                return false;
            }
        };

        if count > i64::from(self.config.violation_threshold) {
            self.block(ip, self.config.block_duration).await
        } else {
            false
        }
    }
}
