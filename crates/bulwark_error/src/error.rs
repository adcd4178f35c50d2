//! Top-level error wrapper types.

use crate::{
    BuilderError, ClientError, ConfigError, HttpError, JsonError, OAuthError, StorageError,
};

/// Every error produced inside the workspace converts into this enum.
///
/// # Examples
///
/// ```
/// use bulwark_error::{BulwarkError, ConfigError};
///
/// let err: BulwarkError = ConfigError::new("bad window").into();
/// assert!(format!("{}", err).contains("Configuration Error"));
/// ```
#[derive(Debug, derive_more::From, derive_more::Display, derive_more::Error)]
pub enum BulwarkErrorKind {
    /// Orchestrated request failed
    #[from(ClientError)]
    Client(ClientError),
    /// OAuth token lifecycle failure
    #[from(OAuthError)]
    OAuth(OAuthError),
    /// Token storage failure
    #[from(StorageError)]
    Storage(StorageError),
    /// Configuration error
    #[from(ConfigError)]
    Config(ConfigError),
    /// Builder error
    #[from(BuilderError)]
    Builder(BuilderError),
    /// HTTP transport setup error
    #[from(HttpError)]
    Http(HttpError),
    /// JSON serialization/deserialization error
    #[from(JsonError)]
    Json(JsonError),
}

/// Bulwark error with kind discrimination.
#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("Bulwark Error: {}", _0)]
pub struct BulwarkError(Box<BulwarkErrorKind>);

impl BulwarkError {
    /// Create a new error from a kind.
    pub fn new(kind: BulwarkErrorKind) -> Self {
        Self(Box::new(kind))
    }

    /// Get the error kind.
    pub fn kind(&self) -> &BulwarkErrorKind {
        &self.0
    }
}

// Generic From implementation for any type that converts to BulwarkErrorKind
impl<T> From<T> for BulwarkError
where
    T: Into<BulwarkErrorKind>,
{
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

/// Result type for Bulwark operations.
pub type BulwarkResult<T> = std::result::Result<T, BulwarkError>;
