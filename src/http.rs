//! Bounded retry for remote JSON APIs.
//!
//! Shared by the embedding providers and the answer service clients:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors, including timeouts → retry
//! - Backoff: `backoff × 2^(attempt-1)`, exponent capped at 5

use anyhow::{anyhow, bail, Result};
use std::time::Duration;
use tracing::warn;

/// How many times to retry a request and how long to wait in between.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt; `2` means at most three requests.
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_ms: u64) -> Self {
        Self {
            max_retries,
            backoff: Duration::from_millis(backoff_ms),
        }
    }

    /// Delay before retry number `attempt` (1-based). Saturates at
    /// [`Duration::MAX`].
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff
            .checked_mul(1u32 << attempt.saturating_sub(1).min(5))
            .unwrap_or(Duration::MAX)
    }
}

/// Build a client with an explicit request timeout.
pub fn client_with_timeout(timeout_secs: u64) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?;
    Ok(client)
}

/// Send the request produced by `build` until it succeeds or the policy is
/// exhausted, returning the parsed JSON body.
///
/// `label` names the remote service in error messages and logs.
pub async fn send_json_with_retry<F>(
    label: &str,
    policy: &RetryPolicy,
    build: F,
) -> Result<serde_json::Value>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            let delay = policy.delay(attempt);
            if let Some(err) = &last_err {
                warn!(
                    service = label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying request"
                );
            }
            tokio::time::sleep(delay).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let body = response.text().await?;
                    let json: serde_json::Value = serde_json::from_str(&body)
                        .map_err(|e| anyhow!("{} returned malformed JSON: {}", label, e))?;
                    return Ok(json);
                }

                // Rate limited or server error: retry
                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow!("{} error {}: {}", label, status, body_text));
                    continue;
                }

                // Client error (not 429): don't retry
                let body_text = response.text().await.unwrap_or_default();
                bail!("{} error {}: {}", label, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow!("{} request failed: {}", label, e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} request failed after retries", label)))
}
