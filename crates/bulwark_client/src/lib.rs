//! Request orchestration for unreliable, rate-limited HTTP APIs.
//!
//! [`ResilientClient`] turns a remote endpoint into a dependable call:
//!
//! 1. circuit breaker admission
//! 2. server cooldown admission
//! 3. local rate-limit admission with a bounded grace wait
//! 4. slot consumption
//! 5. request building and authentication
//! 6. send with linear-backoff retries on transport errors and 5xx
//! 7. outcome classification feeding the breaker and [`StatsTracker`]
//!
//! Provider adapters depend only on the request methods, [`RequestOptions`],
//! [`RequestBody`], [`DecodeTarget`] and [`ResponseHandler`].

#![forbid(unsafe_code)]

mod admission;
mod auth;
mod client;
mod outcome;
mod request;
mod stats;
mod transport;

pub use admission::{
    AdmissionChain, AdmissionStep, GracePolicy, POLL_INTERVAL, PRIORITY_GRACE,
    STANDARD_GRACE, Verdict,
};
pub use client::{ResilientClient, ResilientClientBuilder};
pub use outcome::Outcome;
pub use request::{DecodeTarget, RawResponse, RequestBody, RequestOptions, ResponseHandler};
pub use stats::{InMemoryStatsSink, StatsSink, StatsTracker};
