//! Webhook delivery with exponential-backoff retry.
//!
//! [`WebhookDelivery`] POSTs a JSON [`StatusChange`] to a user's URL. Failed
//! attempts are retried with doubling delays (1 s, 2 s, 4 s, ...).

use std::time::Duration;

use serde_json::json;

use super::StatusChange;

/// Delay before the first retry; doubles on each further attempt.
const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// Error type for webhook delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote server returned a non-2xx status code.
    #[error("Webhook returned HTTP {0}")]
    HttpStatus(u16),
}

/// Delivers status changes to webhook endpoints.
pub struct WebhookDelivery {
    client: reqwest::Client,
    retries: u32,
    backoff: Duration,
}

impl WebhookDelivery {
    pub fn new(timeout: Duration, retries: u32) -> Result<Self, WebhookError> {
        Self::with_backoff(timeout, retries, DEFAULT_BACKOFF)
    }

    pub fn with_backoff(timeout: Duration, retries: u32, backoff: Duration) -> Result<Self, WebhookError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, retries, backoff })
    }

    /// Deliver a status change to `url`, retrying up to the configured count.
    pub async fn deliver(&self, url: &str, change: &StatusChange) -> Result<(), WebhookError> {
        let payload = payload(change);
        let mut delay = self.backoff;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.try_send(url, &payload).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt <= self.retries => {
                    tracing::warn!(attempt, url, error = %e, "Webhook delivery attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
                Err(e) => {
                    tracing::error!(url, attempts = attempt, error = %e, "Webhook delivery failed after all retries");
                    return Err(e);
                }
            }
        }
    }

    /// Execute a single POST request and check the response status.
    async fn try_send(&self, url: &str, payload: &serde_json::Value) -> Result<(), WebhookError> {
        let response = self.client.post(url).json(payload).send().await?;
        if !response.status().is_success() {
            return Err(WebhookError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

fn payload(change: &StatusChange) -> serde_json::Value {
    json!({
        "event": change.transition,
        "user_id": change.user_id,
        "target": {
            "id": change.target.id,
            "protocol": change.target.protocol,
            "url": change.target.url,
            "endpoint": change.target.endpoint(),
        },
        "result": {
            "status": change.result.status,
            "descriptor": change.result.descriptor,
            "latency_ms": change.result.latency_ms,
            "timestamp": change.result.timestamp,
        },
    })
}
