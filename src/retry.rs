//! Retry with exponential backoff for transient network failures.
//!
//! Only transport timeouts, connection errors, HTTP 429 and HTTP 5xx are
//! retried. Calls that create something on the wiki narrow this further
//! through [`with_retry_if`]. A rejected wiki call or a 4xx is returned
//! immediately, and a whole article is never re-run.
use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;

use crate::config::Retry;
use crate::error::{FetchError, GatewayError};

/// Classifies an error as transient (worth another attempt) or permanent.
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

fn transient_transport(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

impl IsRetryable for GatewayError {
    fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Transport { source, .. } => transient_transport(source),
            GatewayError::Status { status, .. } => transient_status(*status),
            GatewayError::Rejected { .. }
            | GatewayError::MissingField { .. }
            | GatewayError::Decode { .. }
            | GatewayError::Io { .. } => false,
        }
    }
}

impl GatewayError {
    /// The request never reached the server, so resending it cannot
    /// repeat a write.
    pub fn is_unsent(&self) -> bool {
        matches!(self, GatewayError::Transport { source, .. } if source.is_connect())
    }
}

impl IsRetryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport { source, .. } => transient_transport(source),
            FetchError::Status { status, .. } => transient_status(*status),
            FetchError::InvalidUrl { .. } | FetchError::Io { .. } => false,
        }
    }
}

/// Run `operation` until it succeeds, fails permanently, or
/// `policy.max_attempts` retries have been spent.
pub async fn with_retry<F, Fut, T, E>(policy: &Retry, what: &str, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    with_retry_if(policy, what, E::is_retryable, operation).await
}

/// Like [`with_retry`], with the caller deciding which errors are worth
/// another attempt.
pub async fn with_retry_if<F, Fut, T, E, P>(
    policy: &Retry,
    what: &str,
    retryable: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;
    let mut delay = policy.initial_delay();

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(what, attempts = attempt + 1, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if retryable(&err) && attempt < policy.max_attempts => {
                attempt += 1;
                tracing::warn!(
                    what,
                    error = %err,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                let next = Duration::from_secs_f64(delay.as_secs_f64() * policy.backoff_multiplier);
                delay = next.min(policy.max_delay());
            }
            Err(err) => return Err(err),
        }
    }
}
