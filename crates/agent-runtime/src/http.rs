//! JSON-over-HTTP with retry for transient failures

use std::time::Duration;

use agent_core::{AgentError, Result};
use reqwest::{RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::Value;

/// Maximum number of attempts for transient errors.
const MAX_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
const BASE_DELAY_MS: u64 = 500;

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Map a non-success status to an error. Retryable variants are the ones
/// [`AgentError::is_retryable`] reports.
fn status_error(status: StatusCode, body: &str) -> AgentError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.chars().take(300).collect());
    let detail = format!("HTTP {}: {message}", status.as_u16());

    match status.as_u16() {
        401 | 403 => AgentError::Auth(detail),
        429 => AgentError::RateLimited(detail),
        500 | 502 | 503 | 504 => AgentError::ProviderUnavailable(detail),
        _ => AgentError::Provider(detail),
    }
}

/// Send the request built by `build` and decode a JSON body, retrying
/// network errors, 429 and 5xx with exponential backoff.
pub async fn send_json<F>(provider: &str, build: F) -> Result<Value>
where
    F: Fn() -> RequestBuilder,
{
    let mut last_error = None;

    for attempt in 0..MAX_ATTEMPTS {
        if attempt > 0 {
            let delay = BASE_DELAY_MS * 2u64.pow(attempt - 1);
            tracing::warn!(provider, attempt, delay_ms = delay, "Retrying backend request");
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let response = match build().send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(provider, attempt, error = %e, "Network error calling backend");
                last_error = Some(AgentError::ProviderUnavailable(e.to_string()));
                continue;
            }
        };

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AgentError::Provider(format!("failed to read response body: {e}")))?;

        if !status.is_success() {
            let err = status_error(status, &body);
            if err.is_retryable() {
                tracing::warn!(provider, attempt, status = %status, "Transient backend error");
                last_error = Some(err);
                continue;
            }
            return Err(err);
        }

        return serde_json::from_str(&body)
            .map_err(|e| AgentError::Parse(format!("{provider} response: {e}")));
    }

    Err(last_error.unwrap_or_else(|| {
        AgentError::ProviderUnavailable(format!("request failed after {MAX_ATTEMPTS} attempts"))
    }))
}
