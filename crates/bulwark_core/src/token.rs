//! OAuth2 token model.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Tokens are refreshed once they are this many seconds from expiry.
pub const REFRESH_BUFFER_SECS: i64 = 300;

/// A bearer token as held in memory and persisted to storage.
///
/// `expiry` of `None` means the token never expires.
///
/// # Examples
///
/// ```
/// use bulwark_core::OAuthToken;
/// use chrono::{Duration, Utc};
///
/// let now = Utc::now();
/// let token = OAuthToken::new("abc").with_expiry(now + Duration::seconds(299));
/// assert!(token.is_valid_at(now));
/// assert!(token.needs_refresh_at(now));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OAuthToken {
    /// Access token value
    pub access_token: String,
    /// Token type, usually `Bearer`
    #[serde(default)]
    pub token_type: String,
    /// Refresh token, if the provider issued one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Expiry instant; `None` never expires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
    /// Granted scope
    #[serde(default)]
    pub scope: String,
}

impl OAuthToken {
    /// Create a non-expiring bearer token.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: "Bearer".to_string(),
            ..Default::default()
        }
    }

    /// Set the expiry instant.
    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    /// Set the refresh token.
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Non-empty and not yet expired at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.access_token.is_empty() && self.expiry.is_none_or(|expiry| now < expiry)
    }

    /// Non-empty and not yet expired.
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Expiry is set and falls within [`REFRESH_BUFFER_SECS`] of `now`.
    pub fn needs_refresh_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry
            .is_some_and(|expiry| now + Duration::seconds(REFRESH_BUFFER_SECS) >= expiry)
    }

    /// Expiry is set and falls within [`REFRESH_BUFFER_SECS`] of the current time.
    pub fn needs_refresh(&self) -> bool {
        self.needs_refresh_at(Utc::now())
    }

    /// Usable without a refresh: valid and outside the refresh buffer.
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        self.is_valid_at(now) && !self.needs_refresh_at(now)
    }

    /// Value for the `Authorization` header.
    pub fn authorization_value(&self) -> String {
        let token_type =
            if self.token_type.is_empty() || self.token_type.eq_ignore_ascii_case("bearer") {
                "Bearer"
            } else {
                self.token_type.as_str()
            };
        format!("{} {}", token_type, self.access_token)
    }
}
