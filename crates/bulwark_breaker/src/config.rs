//! Breaker tuning.

use bulwark_core::ClientConfig;
use bulwark_error::BuilderError;
use derive_getters::Getters;
use std::time::Duration;

/// Immutable breaker configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Getters, derive_builder::Builder)]
#[builder(default, build_fn(validate = "Self::validate", error = "BuilderError"))]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker.
    threshold: u32,
    /// Time after the last failure before probing.
    timeout: Duration,
    /// Probe budget while half-open.
    half_open_max: u32,
    /// Hard ceiling on continuous open time.
    max_open_time: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            timeout: Duration::from_secs(60),
            half_open_max: 3,
            max_open_time: Duration::from_secs(4 * 60 * 60),
        }
    }
}

impl BreakerConfig {
    /// Start a builder seeded with the defaults.
    pub fn builder() -> BreakerConfigBuilder {
        BreakerConfigBuilder::default()
    }
}

impl BreakerConfigBuilder {
    fn validate(&self) -> Result<(), BuilderError> {
        if self.threshold == Some(0) {
            return Err(BuilderError::invalid_field("threshold", "must be at least 1"));
        }
        if self.half_open_max == Some(0) {
            return Err(BuilderError::invalid_field("half_open_max", "must be at least 1"));
        }
        Ok(())
    }
}

impl From<&ClientConfig> for BreakerConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            threshold: (*config.threshold()).max(1),
            timeout: config.timeout(),
            half_open_max: (*config.half_open_max()).max(1),
            max_open_time: config.max_open_time(),
        }
    }
}
