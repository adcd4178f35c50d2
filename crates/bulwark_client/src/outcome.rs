//! Mapping of call outcomes onto breaker and statistics updates.

use bulwark_rate_limit::is_rate_limit_status;

/// How a finished network call is accounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Response below 400.
    Success,
    /// Rate-limit response: the endpoint is alive and enforcing policy.
    /// Breaker success, statistics count the request only.
    RateLimited,
    /// Endpoint unhealthy: transport failure, 5xx, or auth/timeout statuses
    /// without a rate-limit signal. Breaker failure, statistics failure.
    Unhealthy,
    /// Caller mistake such as 404. Breaker success, statistics success bucket.
    ClientFault,
}

impl Outcome {
    /// Classify a received status.
    ///
    /// `cooldown_detected` is whether the response carried a usable
    /// server cooldown. A 429 is always treated as rate limiting; 400, 401
    /// and 403 only when they carried a cooldown.
    pub fn classify(status: u16, cooldown_detected: bool) -> Self {
        match status {
            429 => Outcome::RateLimited,
            s if is_rate_limit_status(s) && cooldown_detected => Outcome::RateLimited,
            s if s >= 500 => Outcome::Unhealthy,
            401 | 403 | 408 | 425 => Outcome::Unhealthy,
            s if s >= 400 => Outcome::ClientFault,
            _ => Outcome::Success,
        }
    }

    /// Whether the breaker records a failure.
    pub fn is_breaker_failure(&self) -> bool {
        matches!(self, Outcome::Unhealthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_family_is_exempt() {
        assert_eq!(Outcome::classify(429, false), Outcome::RateLimited);
        assert_eq!(Outcome::classify(429, true), Outcome::RateLimited);
        assert_eq!(Outcome::classify(400, true), Outcome::RateLimited);
        assert_eq!(Outcome::classify(401, true), Outcome::RateLimited);
        assert_eq!(Outcome::classify(403, true), Outcome::RateLimited);
    }

    #[test]
    fn auth_and_timeout_statuses_without_cooldown_are_unhealthy() {
        for status in [401, 403, 408, 425, 500, 502, 503] {
            assert!(Outcome::classify(status, false).is_breaker_failure(), "{status}");
        }
    }

    #[test]
    fn other_client_errors_do_not_trip_breaker() {
        for status in [400, 404, 409, 422] {
            assert_eq!(Outcome::classify(status, false), Outcome::ClientFault, "{status}");
        }
        assert_eq!(Outcome::classify(200, false), Outcome::Success);
        assert_eq!(Outcome::classify(304, false), Outcome::Success);
    }
}
