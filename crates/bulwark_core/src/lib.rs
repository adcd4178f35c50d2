//! Core data types for the Bulwark resilience engine.
//!
//! This crate holds the types shared by every other Bulwark crate:
//!
//! - [`ClientConfig`] and [`AuthConfig`]: the per-client configuration surface
//! - [`BulwarkConfig`]: file-based configuration for many clients at once
//! - [`OAuthToken`]: the bearer token model with expiry predicates
//! - [`ClientStats`]: the read-only statistics snapshot exposed to operators

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod auth;
mod config;
mod stats;
mod token;

pub use auth::{AuthConfig, OAuthConfig};
pub use config::{BulwarkConfig, ClientConfig, ClientConfigBuilder};
pub use stats::ClientStats;
pub use token::{OAuthToken, REFRESH_BUFFER_SECS};
