//! Statistics snapshot exposed to operators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time copy of a client's request statistics.
///
/// Counters are monotonic for the lifetime of the client. `requests_1h` and
/// `requests_24h` are derived from request timestamps when the snapshot is
/// taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ClientStats {
    /// Client name, the row key when persisted
    pub client_name: String,
    /// Calls classified as successful
    pub success_count: u64,
    /// Calls classified as failed
    pub failure_count: u64,
    /// Every call that reached the network
    pub requests_total: u64,
    /// Sum of measured response times
    pub total_response_time_ms: u64,
    /// Number of measured responses
    pub response_count: u64,
    /// Calls in the trailing hour
    pub requests_1h: u64,
    /// Calls in the trailing 24 hours
    pub requests_24h: u64,
    /// Most recent error message
    pub last_error: Option<String>,
    /// When the most recent error happened
    pub last_error_at: Option<DateTime<Utc>>,
    /// End of the current server-imposed cooldown
    pub next_available_at: Option<DateTime<Utc>>,
    /// Breaker state name at the time of the last call
    pub circuit_breaker_state: String,
}

impl ClientStats {
    /// Mean response time in milliseconds, zero before the first response.
    pub fn average_response_ms(&self) -> f64 {
        if self.response_count == 0 {
            0.0
        } else {
            self.total_response_time_ms as f64 / self.response_count as f64
        }
    }

    /// Share of classified calls that succeeded, `None` before the first call.
    pub fn success_rate(&self) -> Option<f64> {
        let classified = self.success_count + self.failure_count;
        (classified > 0).then(|| self.success_count as f64 / classified as f64)
    }
}
