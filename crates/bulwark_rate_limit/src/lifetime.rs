//! Lifetime call counter with an optional ceiling.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counts every call ever admitted; a ceiling of zero means unlimited.
///
/// # Example
///
/// ```
/// use bulwark_rate_limit::LifetimeCounter;
///
/// let counter = LifetimeCounter::new(2);
/// counter.increment();
/// counter.increment();
/// assert!(counter.would_exceed());
/// ```
#[derive(Debug, Default)]
pub struct LifetimeCounter {
    count: AtomicU64,
    ceiling: u64,
}

impl LifetimeCounter {
    /// Create a counter with the given ceiling (0 = unlimited).
    pub fn new(ceiling: u64) -> Self {
        Self {
            count: AtomicU64::new(0),
            ceiling,
        }
    }

    /// True when another call would pass the ceiling.
    pub fn would_exceed(&self) -> bool {
        self.ceiling > 0 && self.count() >= self.ceiling
    }

    /// Record one call, returning the new total.
    pub fn increment(&self) -> u64 {
        self.count.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Calls recorded so far.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }

    /// Configured ceiling.
    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    /// True when a ceiling is configured.
    pub fn is_limited(&self) -> bool {
        self.ceiling > 0
    }
}
