//! Rate limiting primitives for the request orchestrator.
//!
//! This crate provides the admission side of rate limiting:
//!
//! - [`SlidingWindow`]: the limiter contract (`check`, `allow_force`, `interval`)
//!   with [`WindowLog`] as the default trailing-log implementation
//! - [`LimiterFactory`]: builds windows so tests and deployments can swap the
//!   bucketing algorithm
//! - [`LifetimeCounter`]: an unbounded call counter with an optional hard ceiling
//! - [`detect_cooldown`] and [`ServerCooldown`]: turn provider rate-limit
//!   responses into a single "blocked until" instant
//!
//! ## Admission order
//!
//! The orchestrator consults the cheapest check first: the server cooldown,
//! then the primary window, then the 24-hour window, then the lifetime cap.

mod cooldown;
mod detector;
mod lifetime;
mod window;

pub use cooldown::ServerCooldown;
pub use detector::{
    Cooldown, CooldownSource, DAILY_QUOTA_COOLDOWN, DEFAULT_COOLDOWN, RATE_LIMIT_STATUSES,
    detect_cooldown, is_rate_limit_status, parse_retry_header,
};
pub use lifetime::LifetimeCounter;
pub use window::{DAILY_WINDOW, LimiterFactory, SlidingWindow, WindowLog, WindowLogFactory};
