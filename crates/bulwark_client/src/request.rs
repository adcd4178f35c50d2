//! Request inputs and raw response access for provider adapters.

use bulwark_error::{BulwarkResult, JsonError};
use derive_getters::Getters;
use reqwest::header::HeaderMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Body of an outgoing request. Each variant sets its own content type.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// `application/json`
    Json(serde_json::Value),
    /// `application/x-www-form-urlencoded`
    Form(Vec<(String, String)>),
    /// Arbitrary bytes with an explicit content type
    Raw {
        /// Content-Type header value
        content_type: String,
        /// Body bytes
        bytes: Vec<u8>,
    },
}

impl RequestBody {
    /// Serialize any value as a JSON body.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> BulwarkResult<Self> {
        let value = serde_json::to_value(value)
            .map_err(|e| JsonError::new(format!("failed to serialize request body: {}", e)))?;
        Ok(RequestBody::Json(value))
    }

    /// Build a form body from key/value pairs.
    pub fn form<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        RequestBody::Form(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Typed per-call overrides.
///
/// Headers replace the defaults of the same name; query pairs are appended to
/// the URL after authentication parameters.
///
/// # Example
///
/// ```
/// use bulwark_client::RequestOptions;
///
/// let options = RequestOptions::default()
///     .header("Accept", "application/xml")
///     .query_param("page", "2");
/// assert_eq!(options.headers().len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Getters, derive_setters::Setters)]
#[setters(prefix = "with_")]
pub struct RequestOptions {
    /// Header overrides, applied last
    headers: Vec<(String, String)>,
    /// Extra query parameters
    query: Vec<(String, String)>,
}

impl RequestOptions {
    /// Add a header override.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add a query parameter.
    pub fn query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

/// Fully-read response handed to handlers and used for decoding.
#[derive(Debug, Clone, Getters)]
pub struct RawResponse {
    /// HTTP status code
    status: u16,
    /// Response headers
    headers: HeaderMap,
    /// Response body
    body: Vec<u8>,
    /// Time from send to body fully read
    elapsed: Duration,
}

impl RawResponse {
    /// Assemble a response.
    pub fn new(status: u16, headers: HeaderMap, body: Vec<u8>, elapsed: Duration) -> Self {
        Self {
            status,
            headers,
            body,
            elapsed,
        }
    }

    /// Body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// True for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Callback that inspects the raw response of a successful call.
///
/// Implemented for any `Fn(&RawResponse) -> BulwarkResult<()>` closure.
pub trait ResponseHandler: Send + Sync {
    /// Process the response.
    fn handle(&self, response: &RawResponse) -> BulwarkResult<()>;
}

impl<F> ResponseHandler for F
where
    F: Fn(&RawResponse) -> BulwarkResult<()> + Send + Sync,
{
    fn handle(&self, response: &RawResponse) -> BulwarkResult<()> {
        self(response)
    }
}

/// Destination a successful response body is decoded into.
///
/// Implemented for every deserializable type, so `Some(&mut value)` works
/// for any `value: T where T: DeserializeOwned`.
pub trait DecodeTarget: Send {
    /// Replace `self` with the decoded body.
    fn decode(&mut self, body: &[u8]) -> Result<(), serde_json::Error>;
}

impl<T> DecodeTarget for T
where
    T: DeserializeOwned + Send,
{
    fn decode(&mut self, body: &[u8]) -> Result<(), serde_json::Error> {
        *self = serde_json::from_slice(body)?;
        Ok(())
    }
}
