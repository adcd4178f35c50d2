//! OAuth2 client-side token lifecycle.
//!
//! [`TokenManager`] holds the current bearer token for one client, refreshes
//! it when it nears expiry, and persists it through a pluggable
//! [`TokenStorage`]. Providers customise refresh through [`TokenHooks`],
//! registered by client name in a [`HookRegistry`].
//!
//! # Grant order
//!
//! A refresh uses the refresh token when one is held. Otherwise it tries the
//! password grant (when a username and password are configured) and finally
//! the client-credentials grant.
//!
//! # Example
//!
//! ```rust,ignore
//! use bulwark_oauth::{MemoryTokenStorage, TokenManager};
//! use std::sync::Arc;
//!
//! let manager = TokenManager::new("trakt", oauth_config, reqwest::Client::new())
//!     .with_storage(Arc::new(MemoryTokenStorage::new()));
//! manager.load_persisted().await?;
//! let token = manager.get_valid_token().await?;
//! ```

#![forbid(unsafe_code)]

mod hooks;
mod manager;
mod storage;

pub use hooks::{HookRegistry, RefreshRequest, TokenHooks};
pub use manager::{Grant, TokenManager};
pub use storage::{FileTokenStorage, MemoryTokenStorage, TokenStorage};
