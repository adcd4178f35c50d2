//! Bulwark - resilient clients for third-party HTTP APIs
//!
//! Bulwark wraps every outbound call to a provider in the same protective
//! pipeline, so provider adapters only describe endpoints and payloads.
//!
//! # Features
//!
//! - **Circuit Breaking**: Closed, open and half-open states with a hard cap
//!   on continuous open time
//! - **Local Rate Limiting**: Primary and 24-hour sliding windows, plus a
//!   lifetime ceiling, with grace-period waiting
//! - **Server Cooldowns**: `Retry-After` and quota-phrase detection that
//!   pauses calls until the provider is ready again
//! - **Retries**: Linear backoff on transport failures and 5xx responses
//! - **Authentication**: API keys, basic auth and OAuth2 with proactive refresh
//! - **Statistics**: Rolling request counters with an optional persistence sink
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use bulwark::{AuthConfig, ClientConfig, ResilientClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     bulwark::init_observability()?;
//!
//!     let config = ClientConfig::builder()
//!         .base_url("https://api.themoviedb.org/3")
//!         .rate_limit_calls(40u32)
//!         .rate_limit_seconds(10u64)
//!         .auth(AuthConfig::ApiKeyParam {
//!             param: "api_key".to_string(),
//!             key: std::env::var("TMDB_API_KEY")?,
//!         })
//!         .build()?;
//!     let client = ResilientClient::builder("tmdb", config).build()?;
//!
//!     let movie: serde_json::Value = client.get_json("/movie/603").await?;
//!     println!("{}", movie["title"]);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! Bulwark is organized as a workspace with focused crates:
//!
//! - `bulwark_error` - Error types
//! - `bulwark_core` - Configuration, auth settings, tokens and statistics rows
//! - `bulwark_rate_limit` - Sliding windows, lifetime ceiling, cooldown detection
//! - `bulwark_breaker` - Circuit breaker
//! - `bulwark_oauth` - Token manager, token storage and provider hooks
//! - `bulwark_client` - Request orchestrator and statistics
//!
//! This crate (`bulwark`) re-exports everything for convenience.

pub use bulwark_breaker::*;
pub use bulwark_client::*;
pub use bulwark_core::*;
pub use bulwark_error::*;
pub use bulwark_oauth::*;
pub use bulwark_rate_limit::*;

pub mod observability;

pub use observability::{ObservabilityConfig, init_observability, init_observability_with_config};
