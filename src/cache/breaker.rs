//! Circuit breaker around origin (database) calls.
//!
//! Two states. Closed: calls pass through and consecutive failures are
//! counted. Open: calls return `None` immediately without touching the
//! origin and without further counting. The breaker re-closes lazily on
//! the first call after the cooldown has elapsed.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::util::clock::Clock;

const TARGET: &str = "raffica::cache::breaker";

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Consecutive failures beyond this count open the breaker.
    pub failure_threshold: u32,
    /// How long the breaker stays open before the next attempt.
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

/// Breaker for one logical resource.
pub struct CircuitBreaker {
    resource: String,
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(resource: impl Into<String>, config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            resource: resource.into(),
            config,
            clock,
            state: Mutex::new(BreakerState::default()),
        }
    }

    /// Run `op` unless the breaker is open. Returns `None` when the call
    /// was short-circuited or failed; callers treat that as "no data
    /// available right now" and fall back.
    pub async fn call<T, E, F, Fut>(&self, op: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        if !self.admit() {
            metrics::counter!("raffica_breaker_short_circuit_total").increment(1);
            debug!(
                target: TARGET,
                resource = %self.resource,
                "breaker open, short-circuiting call"
            );
            return None;
        }

        match op().await {
            Ok(value) => {
                self.record_success();
                Some(value)
            }
            Err(err) => {
                self.record_failure(&err.to_string());
                None
            }
        }
    }

    /// Whether a call may proceed; re-closes the breaker when the
    /// cooldown has elapsed.
    fn admit(&self) -> bool {
        let now = self.clock.now();
        let mut state = self.lock_state();

        match state.open_until {
            Some(until) if now < until => false,
            Some(_) => {
                // Cooldown over: close and start with a clean slate.
                state.open_until = None;
                state.consecutive_failures = 0;
                debug!(target: TARGET, resource = %self.resource, "breaker re-closed after cooldown");
                true
            }
            None => true,
        }
    }

    fn record_success(&self) {
        self.lock_state().consecutive_failures = 0;
    }

    fn record_failure(&self, detail: &str) {
        let mut state = self.lock_state();
        state.consecutive_failures += 1;

        if state.consecutive_failures > self.config.failure_threshold && state.open_until.is_none()
        {
            state.open_until = Some(self.clock.now() + self.config.cooldown);
            metrics::counter!("raffica_breaker_open_total").increment(1);
            warn!(
                target: TARGET,
                resource = %self.resource,
                consecutive_failures = state.consecutive_failures,
                cooldown_secs = self.config.cooldown.as_secs(),
                detail,
                "breaker opened"
            );
        } else {
            debug!(
                target: TARGET,
                resource = %self.resource,
                consecutive_failures = state.consecutive_failures,
                detail,
                "origin call failed"
            );
        }
    }

    /// True while calls are being short-circuited.
    pub fn is_open(&self) -> bool {
        let state = self.lock_state();
        state
            .open_until
            .is_some_and(|until| self.clock.now() < until)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!(target: TARGET, resource = %self.resource, "recovered poisoned breaker lock");
            poisoned.into_inner()
        })
    }
}

/// One breaker per logical resource, so a single slow query family cannot
/// trip origin access globally.
pub struct BreakerRegistry {
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            breakers: DashMap::new(),
        }
    }

    pub fn breaker(&self, resource: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(resource.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    resource,
                    self.config,
                    self.clock.clone(),
                ))
            })
            .clone()
    }
}
