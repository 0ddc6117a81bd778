//! Bounded retry with jittered quadratic backoff.
//!
//! Transient failures (HTTP 429, 5xx, timeouts, connection errors) are
//! retried up to [`RetryPolicy::max_attempts`] times. Any other non-success
//! status is permanent and surfaces immediately as [`FetchError::Status`].

use super::{FetchError, HttpClient, get_request};
use anyhow::{Context, Result};
use rand::Rng;
use reqwest::{Request, Response, StatusCode};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// `base * attempt² * (1 + jitter)` with `jitter` drawn from `[0, 1)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter: f64 = rand::thread_rng().gen_range(0.0..1.0);
        let factor = f64::from(attempt.saturating_mul(attempt)) * (1.0 + jitter);
        self.base_delay.mul_f64(factor)
    }

    pub(crate) async fn backoff(&self, attempt: u32) {
        let delay = self.delay(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

pub fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

pub fn is_transient_error(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_request() || e.is_body()
}

/// Sends the request produced by `build`, retrying transient failures.
///
/// `build` is invoked once per attempt because a [`Request`] is consumed by
/// sending it.
pub async fn send_with_retry<C, F>(client: &C, policy: &RetryPolicy, build: F) -> Result<Response>
where
    C: HttpClient + ?Sized,
    F: Fn() -> Result<Request>,
{
    let mut attempt = 1;
    loop {
        let req = build()?;
        let url = req.url().to_string();

        match client.execute(req).await {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) => {
                let status = response.status();
                if !is_transient_status(status) || attempt >= policy.max_attempts {
                    return Err(FetchError::Status { status, url }.into());
                }
                warn!(%url, %status, attempt, max_attempts = policy.max_attempts, "Transient HTTP status, retrying");
            }
            Err(source) => {
                if !is_transient_error(&source) || attempt >= policy.max_attempts {
                    return Err(FetchError::Transport { url, source }.into());
                }
                warn!(%url, error = %source, attempt, max_attempts = policy.max_attempts, "Transient transport error, retrying");
            }
        }

        policy.backoff(attempt).await;
        attempt += 1;
    }
}

/// GET `url` and return the body as text.
pub async fn get_text<C>(client: &C, policy: &RetryPolicy, url: &str) -> Result<String>
where
    C: HttpClient + ?Sized,
{
    let response = send_with_retry(client, policy, || get_request(url, &[])).await?;
    response
        .text()
        .await
        .with_context(|| format!("Failed to read response body from {url}"))
}

/// GET `url` and parse the body as JSON.
pub async fn get_json<C>(client: &C, policy: &RetryPolicy, url: &str) -> Result<serde_json::Value>
where
    C: HttpClient + ?Sized,
{
    let body = get_text(client, policy, url).await?;
    serde_json::from_str(&body).with_context(|| format!("Invalid JSON from {url}"))
}
