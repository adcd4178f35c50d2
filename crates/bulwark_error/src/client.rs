//! Errors surfaced to provider adapters by the request orchestrator.

use std::time::Duration;

/// Response bodies quoted in status errors are cut to this many characters.
pub const MAX_ERROR_BODY_CHARS: usize = 500;

/// Failure conditions of a single orchestrated call.
///
/// Admission variants are produced before any network I/O. The remaining
/// variants are produced while building, sending or decoding the request.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum ClientErrorKind {
    /// Circuit breaker denied the call
    #[display("circuit breaker is open")]
    BreakerOpen,
    /// Server-imposed cooldown still active
    #[display("server rate limit active, retry in {:?}", remaining)]
    ServerCooldown {
        /// Time left until the server cooldown expires
        remaining: Duration,
    },
    /// Local window denied the call and the wait exceeded the grace period
    #[display("rate limit exceeded for {} window, wait {:?}", window, wait)]
    RateLimited {
        /// Name of the denying window
        window: String,
        /// Wait reported by the window
        wait: Duration,
    },
    /// Local window stayed closed for the whole grace period
    #[display(
        "rate limit exceeded for {} window after waiting {:?} grace period, wait {:?}",
        window,
        grace,
        wait
    )]
    GraceExhausted {
        /// Name of the denying window
        window: String,
        /// Last wait observed before giving up
        wait: Duration,
        /// Grace period that was exhausted
        grace: Duration,
    },
    /// Lifetime request ceiling reached
    #[display("lifetime request limit of {} reached", cap)]
    LifetimeCapReached {
        /// Configured ceiling
        cap: u64,
    },
    /// Request could not be built (bad URL, method, body)
    #[display("failed to build request: {}", _0)]
    Construction(String),
    /// Authentication could not be applied
    #[display("authentication failed: {}", _0)]
    Authentication(String),
    /// Transport failed on every attempt
    #[display("request failed after {} attempts: {}", attempts, message)]
    Transport {
        /// Number of attempts made
        attempts: u32,
        /// Last transport error
        message: String,
    },
    /// Remote answered with status >= 400
    #[display("HTTP {}: {}", status, body)]
    Status {
        /// HTTP status code
        status: u16,
        /// Truncated response body
        body: String,
    },
    /// Body could not be decoded into the target
    #[display("json decode error: {}", _0)]
    Decode(String),
    /// Caller-supplied response handler failed
    #[display("response handler failed: {}", _0)]
    Handler(String),
}

impl ClientErrorKind {
    /// Build a status error, truncating the body to [`MAX_ERROR_BODY_CHARS`].
    ///
    /// # Examples
    ///
    /// ```
    /// use bulwark_error::ClientErrorKind;
    ///
    /// let kind = ClientErrorKind::status(404, &"x".repeat(2000));
    /// match kind {
    ///     ClientErrorKind::Status { status, body } => {
    ///         assert_eq!(status, 404);
    ///         assert!(body.chars().count() <= 503);
    ///     }
    ///     _ => unreachable!(),
    /// }
    /// ```
    pub fn status(status: u16, body: &str) -> Self {
        let body = if body.chars().count() > MAX_ERROR_BODY_CHARS {
            let mut cut: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            cut.push_str("...");
            cut
        } else {
            body.to_string()
        };
        ClientErrorKind::Status { status, body }
    }

    /// True for errors raised before any network I/O.
    pub fn is_admission(&self) -> bool {
        matches!(
            self,
            ClientErrorKind::BreakerOpen
                | ClientErrorKind::ServerCooldown { .. }
                | ClientErrorKind::RateLimited { .. }
                | ClientErrorKind::GraceExhausted { .. }
                | ClientErrorKind::LifetimeCapReached { .. }
        )
    }
}

/// Client-name-prefixed error with location tracking.
///
/// # Examples
///
/// ```
/// use bulwark_error::{ClientError, ClientErrorKind};
///
/// let err = ClientError::new("sonarr", ClientErrorKind::BreakerOpen);
/// assert!(err.to_string().starts_with("sonarr: circuit breaker is open"));
/// assert!(err.is_admission());
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("{}: {} at line {} in {}", client, kind, line, file)]
pub struct ClientError {
    /// Name of the client that produced the error
    pub client: String,
    /// The kind of error that occurred
    pub kind: ClientErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl ClientError {
    /// Create a new client error with automatic location tracking.
    #[track_caller]
    pub fn new(client: impl Into<String>, kind: ClientErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            client: client.into(),
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &ClientErrorKind {
        &self.kind
    }

    /// True for errors raised before any network I/O.
    pub fn is_admission(&self) -> bool {
        self.kind.is_admission()
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self.kind {
            ClientErrorKind::Status { status, .. } => Some(status),
            _ => None,
        }
    }
}
