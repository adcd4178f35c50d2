//! Circuit breaker for a single remote endpoint.
//!
//! The breaker gates whether a call is attempted at all. It opens after
//! `threshold` consecutive failures, probes recovery with a limited half-open
//! budget after `timeout`, and force-resets once it has been open longer than
//! `max_open_time`.
//!
//! ```text
//!   Closed --failures >= threshold--> Open
//!   Open --timeout since last failure--> HalfOpen
//!   HalfOpen --half_open_max successes--> Closed
//!   HalfOpen --any failure--> Open
//!   Open/HalfOpen --max_open_time exceeded--> Closed
//! ```

#![forbid(unsafe_code)]

mod breaker;
mod config;
mod state;

pub use breaker::CircuitBreaker;
pub use config::{BreakerConfig, BreakerConfigBuilder};
pub use state::BreakerState;
