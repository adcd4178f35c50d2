//! Pooled transport construction and retrying delivery.

use crate::RawResponse;
use bulwark_core::ClientConfig;
use bulwark_error::HttpError;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tokio_retry2::{Retry, RetryError};
use tracing::{debug, warn};

/// Build the pooled HTTP transport for a client.
pub(crate) fn build_http_client(name: &str, config: &ClientConfig) -> Result<reqwest::Client, HttpError> {
    let mut builder = reqwest::Client::builder()
        .user_agent(config.user_agent().as_str())
        .pool_max_idle_per_host(*config.max_idle_per_host())
        .gzip(true);

    if let Some(timeout) = config.request_timeout() {
        builder = builder.timeout(timeout);
    }
    if *config.disable_tls_verify() {
        warn!(client = name, "TLS certificate verification disabled, connections are insecure");
        builder = builder.danger_accept_invalid_certs(true);
    }

    builder
        .build()
        .map_err(|e| HttpError::new(format!("failed to build HTTP client for {}: {}", name, e)))
}

/// Why a single attempt did not produce a final response.
#[derive(Debug)]
enum AttemptFailure {
    /// Connection, timeout or body read failure.
    Transport(String),
    /// Server error response; returned as-is once retries run out.
    ServerStatus(RawResponse),
}

/// Final result of sending one request with retries.
#[derive(Debug)]
pub(crate) struct Delivery {
    /// Last response received, or the last transport error.
    pub response: Result<RawResponse, String>,
    /// Attempts made, including the first.
    pub attempts: u32,
}

/// Linear backoff: the wait before attempt `n + 1` is `backoff * n`.
pub(crate) fn linear_backoff(backoff: Duration, max_retries: u32) -> impl Iterator<Item = Duration> {
    (1..=max_retries).map(move |n| backoff.saturating_mul(n))
}

/// Send `request`, retrying transport failures and 5xx responses.
pub(crate) async fn deliver(
    http: &reqwest::Client,
    request: reqwest::Request,
    max_retries: u32,
    backoff: Duration,
) -> Delivery {
    let attempts = AtomicU32::new(0);

    let result = Retry::spawn(linear_backoff(backoff, max_retries), || {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let next = request.try_clone();
        async move {
            let Some(request) = next else {
                return Err(RetryError::Permanent(AttemptFailure::Transport(
                    "request body cannot be replayed".to_string(),
                )));
            };
            match send_once(http, request).await {
                Ok(response) if *response.status() >= 500 => {
                    warn!(attempt, status = response.status(), "Server error, will retry");
                    Err(RetryError::Transient {
                        err: AttemptFailure::ServerStatus(response),
                        retry_after: None,
                    })
                }
                Ok(response) => Ok(response),
                Err(message) => {
                    warn!(attempt, error = %message, "Transport failure, will retry");
                    Err(RetryError::Transient {
                        err: AttemptFailure::Transport(message),
                        retry_after: None,
                    })
                }
            }
        }
    })
    .await;

    let attempts = attempts.load(Ordering::SeqCst);
    let response = match result {
        Ok(response) => Ok(response),
        Err(AttemptFailure::ServerStatus(response)) => Ok(response),
        Err(AttemptFailure::Transport(message)) => Err(message),
    };
    debug!(attempts, ok = response.is_ok(), "Delivery finished");
    Delivery { response, attempts }
}

async fn send_once(http: &reqwest::Client, request: reqwest::Request) -> Result<RawResponse, String> {
    let start = Instant::now();
    let response = http.execute(request).await.map_err(|e| e.to_string())?;
    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let body = response.bytes().await.map_err(|e| e.to_string())?.to_vec();
    Ok(RawResponse::new(status, headers, body, start.elapsed()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_linearly() {
        let waits: Vec<_> = linear_backoff(Duration::from_millis(250), 3).collect();
        assert_eq!(
            waits,
            vec![
                Duration::from_millis(250),
                Duration::from_millis(500),
                Duration::from_millis(750)
            ]
        );
    }

    #[test]
    fn zero_retries_means_single_attempt() {
        assert_eq!(linear_backoff(Duration::from_secs(1), 0).count(), 0);
    }

    #[test]
    fn insecure_transport_still_builds() {
        let config = ClientConfig::builder()
            .disable_tls_verify(true)
            .build()
            .unwrap();
        assert!(build_http_client("test", &config).is_ok());
    }
}
