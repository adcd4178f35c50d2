//! OAuth2 token lifecycle errors.

/// OAuth2 error conditions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum OAuthErrorKind {
    /// Client is not configured for OAuth
    #[display("OAuth is not configured for this client")]
    NotConfigured,
    /// No grant could be attempted with the available credentials
    #[display("no refresh token or credentials available")]
    MissingCredentials,
    /// A provider hook vetoed the refresh
    #[display("refresh vetoed by provider hook: {}", _0)]
    Vetoed(String),
    /// Token endpoint could not be reached
    #[display("token request failed: {}", _0)]
    Http(String),
    /// Token endpoint answered with an error status
    #[display("token endpoint returned {}: {}", status, body)]
    TokenEndpoint {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },
    /// Token endpoint answered with an unusable payload
    #[display("invalid token response: {}", _0)]
    InvalidResponse(String),
    /// A provider hook failed after refresh
    #[display("provider hook failed: {}", _0)]
    Hook(String),
    /// Persisted token could not be read
    #[display("token storage failed: {}", _0)]
    Storage(String),
    /// Authorization URL could not be built
    #[display("invalid authorization url: {}", _0)]
    InvalidUrl(String),
}

/// OAuth2 error with location tracking.
///
/// # Examples
///
/// ```
/// use bulwark_error::{OAuthError, OAuthErrorKind};
///
/// let err = OAuthError::new("trakt", OAuthErrorKind::MissingCredentials);
/// assert!(format!("{}", err).contains("trakt"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("OAuth Error: {}: {} at line {} in {}", client, kind, line, file)]
pub struct OAuthError {
    /// Name of the client owning the token
    pub client: String,
    /// The kind of error that occurred
    pub kind: OAuthErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl OAuthError {
    /// Create a new OAuth error with automatic location tracking.
    #[track_caller]
    pub fn new(client: impl Into<String>, kind: OAuthErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            client: client.into(),
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &OAuthErrorKind {
        &self.kind
    }
}
