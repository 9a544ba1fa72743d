//! Per-provider failure/availability state machine.
//!
//! Each provider gets its own breaker, created once at orchestrator
//! construction and mutated only by call outcomes. While `Open`, the
//! wrapped provider is never invoked; after the reset timeout elapses a
//! single probe call is allowed through.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Runtime circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Breaker thresholds and timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,
    /// Time since the last failure before a half-open probe is allowed.
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// Read-only view used by health introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
}

impl Default for BreakerInner {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure_at: None,
        }
    }
}

/// Thread-safe circuit breaker guarding one provider's upstream calls.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner::default()),
        }
    }

    /// Whether a call may proceed. Transitions `Open` to `HalfOpen` once
    /// the reset timeout has elapsed since the last recorded failure, in
    /// which case exactly this call becomes the probe.
    ///
    /// `HalfOpen` admits every caller until an outcome is recorded, so
    /// concurrent callers can race through as simultaneous probes; the
    /// single-probe property holds for sequential callers only.
    pub fn allow_request(&self) -> bool {
        let mut inner = self
            .inner
            .lock()
            .expect("circuit breaker lock is not poisoned");
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let can_probe = inner
                    .last_failure_at
                    .map(|at| at.elapsed() >= self.config.reset_timeout)
                    .unwrap_or(true);

                if can_probe {
                    inner.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// A success in any state closes the breaker and resets the counter,
    /// so the next failure does not immediately reopen it.
    pub fn record_success(&self) {
        let mut inner = self
            .inner
            .lock()
            .expect("circuit breaker lock is not poisoned");
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.last_failure_at = None;
    }

    /// A failed probe reopens immediately; otherwise the breaker opens
    /// once the consecutive-failure count reaches the threshold.
    pub fn record_failure(&self) {
        let mut inner = self
            .inner
            .lock()
            .expect("circuit breaker lock is not poisoned");
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_failure_at = Some(Instant::now());

        if inner.state == CircuitState::HalfOpen
            || inner.consecutive_failures >= self.config.failure_threshold
        {
            inner.state = CircuitState::Open;
        }
    }

    pub fn state(&self) -> CircuitState {
        self.snapshot().state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self
            .inner
            .lock()
            .expect("circuit breaker lock is not poisoned");
        BreakerSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
        }
    }
}
