//! Errors from the generated configuration builders.
//!
//! `ClientConfigBuilder` and `BreakerConfigBuilder` return [`BuilderError`]
//! from `build()`, so a builder failure propagates with `?` into
//! [`BulwarkResult`](crate::BulwarkResult).

/// Why a builder refused to produce a value.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum BuilderErrorKind {
    /// A field without a default was never set
    #[display("{} was not set", _0)]
    MissingField(String),

    /// A field was set to a value the built type cannot hold
    #[display("{} {}", field, reason)]
    InvalidField {
        /// The offending field
        field: String,
        /// What the value must satisfy
        reason: String,
    },

    /// A cross-field check failed
    #[display("{}", _0)]
    Validation(String),
}

/// Builder failure with location tracking.
///
/// # Examples
///
/// ```
/// use bulwark_error::{BuilderError, BuilderErrorKind};
///
/// let err = BuilderError::invalid_field("threshold", "must be at least 1");
/// assert_eq!(err.field(), Some("threshold"));
/// assert!(err.to_string().starts_with("Builder Error: threshold must be at least 1"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Builder Error: {} at line {} in {}", kind, line, file)]
pub struct BuilderError {
    kind: BuilderErrorKind,
    line: u32,
    file: &'static str,
}

impl BuilderError {
    /// Create a new builder error with caller location tracking.
    #[track_caller]
    pub fn new(kind: BuilderErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Shorthand for [`BuilderErrorKind::InvalidField`].
    #[track_caller]
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(BuilderErrorKind::InvalidField {
            field: field.into(),
            reason: reason.into(),
        })
    }

    /// Get the error kind.
    pub fn kind(&self) -> &BuilderErrorKind {
        &self.kind
    }

    /// Field the error is about, when it concerns a single field.
    pub fn field(&self) -> Option<&str> {
        match &self.kind {
            BuilderErrorKind::MissingField(field) | BuilderErrorKind::InvalidField { field, .. } => {
                Some(field)
            }
            BuilderErrorKind::Validation(_) => None,
        }
    }
}

impl From<derive_builder::UninitializedFieldError> for BuilderError {
    #[track_caller]
    fn from(err: derive_builder::UninitializedFieldError) -> Self {
        Self::new(BuilderErrorKind::MissingField(err.field_name().to_string()))
    }
}

impl From<String> for BuilderError {
    #[track_caller]
    fn from(msg: String) -> Self {
        Self::new(BuilderErrorKind::Validation(msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BulwarkError, BulwarkErrorKind};

    #[test]
    fn uninitialized_field_becomes_missing_field() {
        let err = BuilderError::from(derive_builder::UninitializedFieldError::new("base_url"));
        assert_eq!(err.kind(), &BuilderErrorKind::MissingField("base_url".into()));
        assert_eq!(err.field(), Some("base_url"));
    }

    #[test]
    fn converts_into_top_level_error() {
        let err: BulwarkError = BuilderError::from("windows overlap".to_string()).into();
        match err.kind() {
            BulwarkErrorKind::Builder(builder) => assert!(builder.field().is_none()),
            other => panic!("unexpected: {other}"),
        }
    }
}
