//! Breaker state machine.

use crate::{BreakerConfig, BreakerState};
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

#[derive(Debug, Default)]
struct Inner {
    state: BreakerState,
    failures: u32,
    last_failure_time: Option<Instant>,
    first_open_time: Option<Instant>,
    half_open_attempts: u32,
    half_open_success: u32,
}

impl Inner {
    fn close(&mut self) {
        *self = Self::default();
    }

    fn open(&mut self, now: Instant) {
        self.state = BreakerState::Open;
        self.first_open_time.get_or_insert(now);
        self.half_open_attempts = 0;
        self.half_open_success = 0;
    }

    fn half_open(&mut self) {
        self.state = BreakerState::HalfOpen;
        self.half_open_attempts = 0;
        self.half_open_success = 0;
    }
}

/// Circuit breaker for one logical endpoint.
///
/// Every method takes the same lock, so transitions are linearizable per
/// breaker. Timestamps come from Tokio's clock.
///
/// # Example
///
/// ```
/// use bulwark_breaker::{BreakerConfig, BreakerState, CircuitBreaker};
///
/// let config = BreakerConfig::builder().threshold(1).build().unwrap();
/// let breaker = CircuitBreaker::new("tmdb", config);
/// assert!(breaker.try_admit());
/// breaker.record_failure();
/// assert_eq!(breaker.state(), BreakerState::Open);
/// assert!(!breaker.try_admit());
/// ```
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Endpoint name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Breaker configuration.
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Decide whether a call may proceed, performing any due transition.
    ///
    /// Open moves to half-open once `timeout` has passed since the last
    /// failure, and that call is the first probe. Open or half-open force
    /// resets to closed after `max_open_time` of continuous non-closed time.
    #[instrument(skip(self), fields(client = %self.name))]
    pub fn try_admit(&self) -> bool {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        if inner.state != BreakerState::Closed {
            let open_for = inner
                .first_open_time
                .map(|first| now.saturating_duration_since(first));
            if open_for.is_some_and(|open_for| open_for > *self.config.max_open_time()) {
                warn!(
                    state = %inner.state,
                    max_open_time = ?self.config.max_open_time(),
                    "Circuit breaker open past its ceiling, forcing reset"
                );
                inner.close();
                return true;
            }
        }

        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let since_failure = inner
                    .last_failure_time
                    .map(|last| now.saturating_duration_since(last));
                if since_failure.is_none_or(|elapsed| elapsed > *self.config.timeout()) {
                    debug!("Circuit breaker probing recovery");
                    inner.half_open();
                    inner.half_open_attempts = 1;
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => {
                if inner.half_open_attempts < *self.config.half_open_max() {
                    inner.half_open_attempts += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a healthy outcome.
    #[instrument(skip(self), fields(client = %self.name))]
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => inner.failures = 0,
            BreakerState::HalfOpen => {
                inner.half_open_success += 1;
                if inner.half_open_success >= *self.config.half_open_max() {
                    debug!("Circuit breaker closed after successful probes");
                    inner.close();
                }
            }
            BreakerState::Open => {}
        }
    }

    /// Record an unhealthy outcome.
    #[instrument(skip(self), fields(client = %self.name))]
    pub fn record_failure(&self) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.last_failure_time = Some(now);
        match inner.state {
            BreakerState::Closed => {
                inner.failures += 1;
                if inner.failures >= *self.config.threshold() {
                    warn!(failures = inner.failures, "Circuit breaker opened");
                    inner.open(now);
                }
            }
            BreakerState::HalfOpen => {
                warn!("Probe failed, circuit breaker reopened");
                inner.open(now);
            }
            BreakerState::Open => inner.failures += 1,
        }
    }

    /// Current state.
    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    /// Failures counted since the breaker last closed.
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failures
    }

    /// When the breaker first left the closed state, if it has not closed since.
    pub fn first_open_time(&self) -> Option<Instant> {
        self.inner.lock().first_open_time
    }

    /// When the most recent failure was recorded.
    pub fn last_failure_time(&self) -> Option<Instant> {
        self.inner.lock().last_failure_time
    }

    /// Force the breaker closed and clear all counters.
    #[instrument(skip(self), fields(client = %self.name))]
    pub fn reset(&self) {
        debug!("Circuit breaker reset");
        self.inner.lock().close();
    }
}
