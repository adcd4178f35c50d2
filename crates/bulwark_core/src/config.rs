//! Client configuration and file loading.
//!
//! Configuration sources follow the usual precedence system:
//! 1. Built-in defaults (see [`ClientConfig::default`])
//! 2. User config in home directory (`~/.config/bulwark/bulwark.toml`)
//! 3. User config in current directory (`./bulwark.toml`)

use crate::AuthConfig;
use bulwark_error::{BuilderError, BulwarkError, BulwarkResult, ConfigError};
use config::{Config, File};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

/// Per-client resilience configuration.
///
/// Zero values on the rate-limit fields disable that limit.
///
/// # Example
///
/// ```toml
/// [clients.tmdb]
/// base_url = "https://api.themoviedb.org/3"
/// threshold = 5
/// rate_limit_calls = 40
/// rate_limit_seconds = 10
/// rate_limit_per_24h = 10_000
///
/// [clients.tmdb.auth]
/// type = "api_key_param"
/// param = "api_key"
/// key = "..."
/// ```
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, derive_builder::Builder,
)]
#[builder(default, setter(into), build_fn(error = "BuilderError"))]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL that relative endpoints are appended to
    base_url: String,
    /// User agent sent with every request
    user_agent: String,

    /// Consecutive failures that open the breaker
    threshold: u32,
    /// Seconds the breaker stays open before probing
    timeout_secs: u64,
    /// Probe budget while half-open
    half_open_max: u32,
    /// Hard ceiling in seconds on continuous open time
    max_open_time_secs: u64,

    /// Calls allowed per primary window (0 disables the window)
    rate_limit_calls: u32,
    /// Primary window length in seconds
    rate_limit_seconds: u64,
    /// Calls allowed per 24 hours (0 disables the window)
    rate_limit_per_24h: u32,
    /// Lifetime ceiling on calls (0 is unlimited)
    rate_limit_per_total: u64,

    /// Retries after the first attempt on transport errors and 5xx
    max_retries: u32,
    /// Backoff unit in milliseconds; attempt `n` waits `n` units
    retry_backoff_ms: u64,
    /// Per-request timeout in seconds (0 disables)
    request_timeout_secs: u64,
    /// Idle connections kept per host by the pooled transport
    max_idle_per_host: usize,

    /// Authentication method and credentials
    auth: AuthConfig,

    /// Upsert statistics to the attached sink after each call
    enable_stats: bool,
    /// Table (or collection) the sink writes to
    stats_table: String,

    /// Skip TLS certificate verification. Insecure.
    disable_tls_verify: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            user_agent: format!("bulwark/{}", env!("CARGO_PKG_VERSION")),
            threshold: 5,
            timeout_secs: 60,
            half_open_max: 3,
            max_open_time_secs: 4 * 60 * 60,
            rate_limit_calls: 0,
            rate_limit_seconds: 0,
            rate_limit_per_24h: 0,
            rate_limit_per_total: 0,
            max_retries: 3,
            retry_backoff_ms: 1000,
            request_timeout_secs: 30,
            max_idle_per_host: 10,
            auth: AuthConfig::None,
            enable_stats: false,
            stats_table: "client_stats".to_string(),
            disable_tls_verify: false,
        }
    }
}

impl ClientConfig {
    /// Creates a new client config builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Breaker open duration before probing.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Hard ceiling on continuous open time.
    pub fn max_open_time(&self) -> Duration {
        Duration::from_secs(self.max_open_time_secs)
    }

    /// Backoff unit between retries.
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Per-request timeout, if enabled.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }

    /// Primary window as `(capacity, length)`, if configured.
    pub fn primary_window(&self) -> Option<(u32, Duration)> {
        (self.rate_limit_calls > 0 && self.rate_limit_seconds > 0)
            .then(|| (self.rate_limit_calls, Duration::from_secs(self.rate_limit_seconds)))
    }

    /// Daily window capacity, if configured.
    pub fn daily_window(&self) -> Option<u32> {
        (self.rate_limit_per_24h > 0).then_some(self.rate_limit_per_24h)
    }

    /// Validates combinations the type system cannot express.
    ///
    /// # Errors
    ///
    /// Returns an error if only one half of the primary window is set, if the
    /// breaker threshold or probe budget is zero, or if OAuth is selected
    /// without a token endpoint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if (self.rate_limit_calls == 0) != (self.rate_limit_seconds == 0) {
            return Err(ConfigError::new(format!(
                "rate_limit_calls ({}) and rate_limit_seconds ({}) must be set together",
                self.rate_limit_calls, self.rate_limit_seconds
            )));
        }
        if self.threshold == 0 {
            return Err(ConfigError::new("threshold must be at least 1"));
        }
        if self.half_open_max == 0 {
            return Err(ConfigError::new("half_open_max must be at least 1"));
        }
        if self.auth.oauth().is_some_and(|oauth| oauth.token_url.is_empty()) {
            return Err(ConfigError::new("oauth auth requires token_url"));
        }
        Ok(())
    }
}

/// Top-level configuration: one [`ClientConfig`] per named client.
///
/// # Example
///
/// ```no_run
/// use bulwark_core::BulwarkConfig;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = BulwarkConfig::load()?;
/// if let Some(tmdb) = config.client("tmdb") {
///     println!("TMDB base url: {}", tmdb.base_url());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
pub struct BulwarkConfig {
    /// Map of client name to client configuration
    #[serde(default)]
    pub clients: HashMap<String, ClientConfig>,
}

impl BulwarkConfig {
    /// Load configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if any client
    /// configuration fails validation.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<std::path::Path>) -> BulwarkResult<Self> {
        debug!("Loading configuration from file");

        let config: Self = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .map_err(|e| {
                BulwarkError::from(ConfigError::new(format!(
                    "Failed to read configuration from {}: {}",
                    path.as_ref().display(),
                    e
                )))
            })?
            .try_deserialize()
            .map_err(|e| {
                BulwarkError::from(ConfigError::new(format!(
                    "Failed to parse configuration: {}",
                    e
                )))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration with precedence: current dir > home dir.
    ///
    /// Both files are optional; with neither present the result has no clients.
    ///
    /// # Errors
    ///
    /// Returns an error if a present file cannot be parsed or fails validation.
    #[instrument]
    pub fn load() -> BulwarkResult<Self> {
        debug!("Loading configuration with precedence: current dir > home dir");

        let mut builder = Config::builder();

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".config/bulwark/bulwark.toml");
            builder = builder.add_source(File::from(home_config).required(false));
        }

        builder = builder.add_source(File::with_name("bulwark").required(false));

        let config: Self = builder
            .build()
            .map_err(|e| {
                BulwarkError::from(ConfigError::new(format!(
                    "Failed to build configuration: {}",
                    e
                )))
            })?
            .try_deserialize()
            .map_err(|e| {
                BulwarkError::from(ConfigError::new(format!(
                    "Failed to parse configuration: {}",
                    e
                )))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration for a named client.
    #[instrument(skip(self))]
    pub fn client(&self, name: &str) -> Option<&ClientConfig> {
        debug!(name, "Looking up client configuration");
        self.clients.get(name)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, client) in &self.clients {
            client
                .validate()
                .map_err(|e| ConfigError::new(format!("client '{}': {}", name, e.message)))?;
        }
        Ok(())
    }
}
