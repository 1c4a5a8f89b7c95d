//! HTTP delivery of transcript messages to the CRM ingestion endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, warn};

use super::payload::CrmMessage;

#[derive(Debug, Error)]
pub enum CrmError {
    /// Network failure, timeout, 408, 429 or 5xx. Worth retrying.
    #[error("transient CRM failure: {0}")]
    Transient(String),

    /// Any other non-success status. Retrying will not help.
    #[error("CRM rejected message with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The request could not be built, e.g. a bad endpoint or an
    /// unencodable body. Retrying will not help.
    #[error("failed to build CRM request: {0}")]
    Serialization(String),

    #[error("CRM delivery failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

impl CrmError {
    pub fn is_transient(&self) -> bool {
        matches!(self, CrmError::Transient(_))
    }
}

impl From<reqwest::Error> for CrmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            CrmError::Serialization(err.to_string())
        } else {
            CrmError::Transient(err.to_string())
        }
    }
}

/// Destination for transcript messages.
#[async_trait]
pub trait TranscriptSink: Send + Sync {
    async fn deliver(&self, message: &CrmMessage) -> Result<(), CrmError>;
}

/// Fixed-delay retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

/// Posts messages as JSON, retrying transient failures.
pub struct CrmClient {
    endpoint: String,
    timeout: Duration,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl CrmClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = RetryPolicy {
            max_attempts: retry.max_attempts.max(1),
            delay: retry.delay,
        };
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    async fn send_once(&self, message: &CrmMessage) -> Result<StatusCode, CrmError> {
        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .header("Content-Type", "application/json")
            .json(message)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(status);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
            || status.is_server_error()
        {
            Err(CrmError::Transient(format!("HTTP {status}: {body}")))
        } else {
            Err(CrmError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl TranscriptSink for CrmClient {
    async fn deliver(&self, message: &CrmMessage) -> Result<(), CrmError> {
        let mut last_error = String::new();

        for attempt in 1..=self.retry.max_attempts {
            match self.send_once(message).await {
                Ok(status) => {
                    debug!(
                        call_id = %message.id,
                        sender = %message.sender_kind(),
                        status = %status,
                        attempt,
                        "CRM message delivered"
                    );
                    return Ok(());
                }
                Err(err) if err.is_transient() => {
                    warn!(
                        call_id = %message.id,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        error = %err,
                        "CRM delivery attempt failed"
                    );
                    last_error = err.to_string();
                    if attempt < self.retry.max_attempts {
                        tokio::time::sleep(self.retry.delay).await;
                    }
                }
                Err(err) => {
                    warn!(call_id = %message.id, error = %err, "CRM delivery not retryable");
                    return Err(err);
                }
            }
        }

        Err(CrmError::Exhausted {
            attempts: self.retry.max_attempts,
            last_error,
        })
    }
}

/// Sink used when no CRM endpoint is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

#[async_trait]
impl TranscriptSink for NoopSink {
    async fn deliver(&self, message: &CrmMessage) -> Result<(), CrmError> {
        debug!(
            call_id = %message.id,
            sender = %message.sender_kind(),
            "CRM relay disabled, discarding message"
        );
        Ok(())
    }
}
