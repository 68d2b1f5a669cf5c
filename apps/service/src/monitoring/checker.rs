use std::time::Duration;

use crate::error::ProbeError;

/// Checker trait for the transport used by probes
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    /// Issue one request against `endpoint` and return the response status code
    async fn check(&self, endpoint: &str) -> Result<u16, ProbeError>;
}

/// HTTP/HTTPS checker
pub struct HttpChecker {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpChecker {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| ProbeError::Transport(e.to_string()))?;

        Ok(Self { client, timeout })
    }

    fn classify(&self, error: reqwest::Error) -> ProbeError {
        if error.is_timeout() {
            ProbeError::Timeout(self.timeout)
        } else if error.is_connect() {
            ProbeError::Connect(error.to_string())
        } else {
            ProbeError::Transport(error.to_string())
        }
    }
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn check(&self, endpoint: &str) -> Result<u16, ProbeError> {
        let response = self.client.get(endpoint).send().await.map_err(|e| self.classify(e))?;

        Ok(response.status().as_u16())
    }
}
