//! Error types for the Bulwark resilience engine.
//!
//! This crate provides the foundation error types used throughout the Bulwark workspace.
//!
//! # Error Hierarchy
//!
//! All errors follow the `ErrorKind` + wrapper struct pattern:
//! - `*ErrorKind` enum defines specific error conditions
//! - `*Error` struct wraps the kind with source location tracking
//! - All errors use `#[track_caller]` for automatic location capture
//!
//! Errors returned to provider adapters from a request are always a
//! [`ClientError`], whose display string is prefixed with the client name.
//!
//! # Examples
//!
//! ```
//! use bulwark_error::{BulwarkResult, ClientError, ClientErrorKind};
//!
//! fn fetch_data() -> BulwarkResult<String> {
//!     Err(ClientError::new("tmdb", ClientErrorKind::BreakerOpen))?
//! }
//!
//! let err = fetch_data().unwrap_err();
//! assert!(err.to_string().contains("tmdb"));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod builder;
mod client;
mod config;
mod error;
mod http;
mod json;
mod oauth;
mod storage;

pub use builder::{BuilderError, BuilderErrorKind};
pub use client::{ClientError, ClientErrorKind, MAX_ERROR_BODY_CHARS};
pub use config::ConfigError;
pub use error::{BulwarkError, BulwarkErrorKind, BulwarkResult};
pub use http::HttpError;
pub use json::JsonError;
pub use oauth::{OAuthError, OAuthErrorKind};
pub use storage::{StorageError, StorageErrorKind};
