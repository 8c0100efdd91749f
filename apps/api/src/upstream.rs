//! Shared plumbing for the hosted services this API depends on
//! (LlamaParse, Voyage AI, Gemini).

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use thiserror::Error;
use tracing::warn;

/// Request timeout applied to every upstream HTTP client.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// How often and how patiently a call is retried on 429 and 5xx.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further retry.
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

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Invalid(String),

    #[error("Upstream returned empty content")]
    EmptyContent,
}

pub fn http_client() -> Result<Client, UpstreamError> {
    Ok(Client::builder().timeout(REQUEST_TIMEOUT).build()?)
}

/// Sends a request built by `build`, retrying on transport errors, 429 and 5xx with
/// exponential backoff (1s, 2s by default). Any other non-success status fails
/// immediately with the body as the error message.
pub async fn send_with_retry<F>(
    service: &str,
    policy: RetryPolicy,
    build: F,
) -> Result<Response, UpstreamError>
where
    F: Fn() -> RequestBuilder,
{
    let mut last_error: Option<UpstreamError> = None;

    for attempt in 0..policy.max_attempts {
        if attempt > 0 {
            let delay = policy.base_delay * (1 << (attempt - 1));
            warn!(
                "{service} call attempt {} failed, retrying after {}ms...",
                attempt,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }

        let response = match build().send().await {
            Ok(r) => r,
            Err(e) => {
                last_error = Some(UpstreamError::Http(e));
                continue;
            }
        };

        let status = response.status();

        if status.as_u16() == 429 || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            warn!("{service} returned {status}: {body}");
            last_error = Some(UpstreamError::Api {
                status: status.as_u16(),
                message: body,
            });
            continue;
        }

        return ensure_success(response).await;
    }

    Err(last_error.unwrap_or(UpstreamError::RateLimited {
        retries: policy.max_attempts,
    }))
}

/// Turns a non-2xx response into `UpstreamError::Api`, preferring the provider's
/// `error.message` / `detail` field over the raw body.
pub async fn ensure_success(response: Response) -> Result<Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(UpstreamError::Api {
        status: status.as_u16(),
        message: extract_error_message(&body),
    })
}

fn extract_error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.to_string();
    };
    value
        .pointer("/error/message")
        .or_else(|| value.get("detail"))
        .and_then(|v| v.as_str())
        .map(String::from)
        .unwrap_or_else(|| body.to_string())
}
