//! Authentication configuration.

use serde::{Deserialize, Serialize};

/// How a client authenticates its requests.
///
/// ```toml
/// [clients.tmdb.auth]
/// type = "api_key_param"
/// param = "api_key"
/// key = "..."
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    /// No authentication
    #[default]
    None,
    /// API key sent in a request header
    ApiKeyHeader {
        /// Header name, e.g. `X-Api-Key`
        header: String,
        /// API key value
        key: String,
    },
    /// API key appended as a query parameter
    ApiKeyParam {
        /// Query parameter name, e.g. `apikey`
        param: String,
        /// API key value
        key: String,
    },
    /// OAuth2 bearer token managed by a token manager
    #[serde(rename = "oauth")]
    OAuth(OAuthConfig),
    /// HTTP basic authentication
    Basic {
        /// User name
        username: String,
        /// Password
        password: String,
    },
}

impl AuthConfig {
    /// Short name used in logs.
    pub fn type_name(&self) -> &'static str {
        match self {
            AuthConfig::None => "none",
            AuthConfig::ApiKeyHeader { .. } => "api_key_header",
            AuthConfig::ApiKeyParam { .. } => "api_key_param",
            AuthConfig::OAuth(_) => "oauth",
            AuthConfig::Basic { .. } => "basic",
        }
    }

    /// OAuth settings, if this client uses OAuth.
    pub fn oauth(&self) -> Option<&OAuthConfig> {
        match self {
            AuthConfig::OAuth(oauth) => Some(oauth),
            _ => None,
        }
    }
}

/// Client-side OAuth2 settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OAuthConfig {
    /// OAuth client identifier
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: Option<String>,
    /// Token endpoint used for every grant
    pub token_url: String,
    /// Authorization endpoint for interactive flows
    pub auth_url: Option<String>,
    /// Redirect URI registered with the provider
    pub redirect_url: Option<String>,
    /// Requested scopes
    pub scopes: Vec<String>,
    /// Resource owner name for the password grant
    pub username: Option<String>,
    /// Resource owner password for the password grant
    pub password: Option<String>,
}

impl OAuthConfig {
    /// Scopes joined with spaces, as sent on the wire.
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }
}
