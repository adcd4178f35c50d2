//! Sliding-window limiter contract and the default trailing-log implementation.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// Length of the daily window.
pub const DAILY_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// A fixed call budget over a trailing time window.
///
/// `check` never consumes budget. `allow_force` always does, and is only
/// called once admission has already been decided.
pub trait SlidingWindow: Send + Sync + fmt::Debug {
    /// Peek at the window: `Ok(())` when a slot is free, otherwise the time
    /// until the next slot frees up.
    fn check(&self) -> Result<(), Duration>;

    /// Unconditionally consume one slot.
    fn allow_force(&self);

    /// Configured window length.
    fn interval(&self) -> Duration;
}

/// Builds limiter instances for a client.
pub trait LimiterFactory: Send + Sync + fmt::Debug {
    /// Create a window allowing `capacity` calls per `window`.
    fn create(&self, window: Duration, capacity: u32) -> Arc<dyn SlidingWindow>;
}

/// Sliding window backed by a log of admission instants.
///
/// Every entry older than the window is discarded on access, so the count
/// always reflects the trailing `interval`. Uses Tokio's clock, which lets
/// tests drive it with a paused runtime.
///
/// # Example
///
/// ```
/// use bulwark_rate_limit::{SlidingWindow, WindowLog};
/// use std::time::Duration;
///
/// let window = WindowLog::new(Duration::from_secs(10), 1);
/// assert!(window.check().is_ok());
/// window.allow_force();
/// assert!(window.check().is_err());
/// ```
pub struct WindowLog {
    interval: Duration,
    capacity: u32,
    log: Mutex<VecDeque<Instant>>,
}

impl WindowLog {
    /// Create a window allowing `capacity` calls per `interval`.
    pub fn new(interval: Duration, capacity: u32) -> Self {
        Self {
            interval,
            capacity,
            log: Mutex::new(VecDeque::with_capacity(capacity.min(1024) as usize)),
        }
    }

    /// Configured capacity.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Calls currently counted in the window.
    pub fn in_window(&self) -> usize {
        let mut log = self.log.lock();
        self.prune(&mut log, Instant::now());
        log.len()
    }

    /// Check and consume under one lock, for callers that need exact budgets.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let now = Instant::now();
        let mut log = self.log.lock();
        self.prune(&mut log, now);
        self.wait_for(&log, now)?;
        log.push_back(now);
        Ok(())
    }

    fn prune(&self, log: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = log.front() {
            if now.saturating_duration_since(*oldest) >= self.interval {
                log.pop_front();
            } else {
                break;
            }
        }
    }

    fn wait_for(&self, log: &VecDeque<Instant>, now: Instant) -> Result<(), Duration> {
        if log.len() < self.capacity as usize {
            return Ok(());
        }
        // The slot frees when the entry `len - capacity` leaves the window.
        let index = log.len() - self.capacity as usize;
        let wait = log
            .get(index)
            .map(|entry| (*entry + self.interval).saturating_duration_since(now))
            .unwrap_or(self.interval);
        Err(wait)
    }
}

impl SlidingWindow for WindowLog {
    fn check(&self) -> Result<(), Duration> {
        let now = Instant::now();
        let mut log = self.log.lock();
        self.prune(&mut log, now);
        let result = self.wait_for(&log, now);
        trace!(
            used = log.len(),
            capacity = self.capacity,
            allowed = result.is_ok(),
            "Checked sliding window"
        );
        result
    }

    fn allow_force(&self) {
        let now = Instant::now();
        let mut log = self.log.lock();
        self.prune(&mut log, now);
        log.push_back(now);
    }

    fn interval(&self) -> Duration {
        self.interval
    }
}

impl fmt::Debug for WindowLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowLog")
            .field("interval", &self.interval)
            .field("capacity", &self.capacity)
            .field("used", &self.log.lock().len())
            .finish()
    }
}

/// Factory producing [`WindowLog`] instances.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowLogFactory;

impl LimiterFactory for WindowLogFactory {
    fn create(&self, window: Duration, capacity: u32) -> Arc<dyn SlidingWindow> {
        Arc::new(WindowLog::new(window, capacity))
    }
}
