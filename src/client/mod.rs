//! Batch HTTP client for the keyword-metrics endpoints
//!
//! One [`BatchClient`] serves every endpoint through a shared connection pool.
//! Each call checks the endpoint's circuit first, retries transient failures
//! on a fixed backoff ladder, and reports every attempt's outcome to the
//! health monitor. Responses are validated strictly; a batch never yields
//! fabricated entries.

pub mod protocol;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::Endpoint;
use crate::health::HealthMonitor;
use crate::partition::{align_results, bisect};
use protocol::{BatchResponse, KeywordMetrics};

/// Fixed backoff ladder: 3s, 6s, 12s, then constant 15s
pub const DEFAULT_BACKOFF_LADDER: [Duration; 4] = [
    Duration::from_secs(3),
    Duration::from_secs(6),
    Duration::from_secs(12),
    Duration::from_secs(15),
];

/// Batch call errors
#[derive(Error, Debug)]
pub enum ClientError {
    /// Endpoint circuit is open; no call was made
    #[error("circuit open for endpoint {0}")]
    CircuitOpen(String),

    /// Server answered with a non-success status
    #[error("HTTP status {0}")]
    Status(u16),

    /// Request timed out
    #[error("request timed out")]
    Timeout,

    /// Transport-level failure (connection, DNS, body read)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Body parsed but failed validation
    #[error("invalid response body: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    /// Whether retrying this failure can reasonably help
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Transport(_) | Self::CircuitOpen(_) => true,
            Self::Status(code) => should_retry(*code),
            Self::InvalidResponse(_) => false,
        }
    }
}

/// Determine if a status code should trigger a retry
///
/// Retry on 429, 500, 502, 503, 504. Anything else fails immediately.
fn should_retry(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Backoff before retry attempt `attempt` (1-based): ladder entries in order,
/// then the last entry repeated
pub fn backoff(attempt: u32, ladder: &[Duration]) -> Duration {
    if ladder.is_empty() {
        return Duration::ZERO;
    }
    let index = (attempt.saturating_sub(1) as usize).min(ladder.len() - 1);
    ladder[index]
}

/// HTTP client for batch keyword-metrics calls
pub struct BatchClient {
    /// Shared connection pool with configured timeout and compression
    client: reqwest::Client,

    /// Health monitor consulted before and after every attempt
    health: Arc<HealthMonitor>,

    /// Retry attempts after the first failure
    max_retries: u32,

    /// Backoff ladder, injectable so tests never sleep for real
    backoff_ladder: Vec<Duration>,
}

impl BatchClient {
    /// Create a client with the given per-request timeout and retry budget
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Transport` if the HTTP client cannot be built
    pub fn new(
        health: Arc<HealthMonitor>,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().timeout(timeout).gzip(true).build()?;

        Ok(Self {
            client,
            health,
            max_retries,
            backoff_ladder: DEFAULT_BACKOFF_LADDER.to_vec(),
        })
    }

    /// Replace the backoff ladder (used by tests)
    #[must_use]
    pub fn with_backoff_ladder(mut self, ladder: Vec<Duration>) -> Self {
        self.backoff_ladder = ladder;
        self
    }

    /// Execute one batch call against an endpoint
    ///
    /// Fails fast without a network call when the endpoint's circuit is open.
    /// Transient failures (429/5xx, timeouts, connection errors) are retried
    /// on the backoff ladder; status-code retries additionally wait out the
    /// endpoint's adaptive interval. Every attempt's outcome is reported to
    /// the health monitor.
    pub async fn execute(
        &self,
        endpoint: &Endpoint,
        batch: &[String],
    ) -> Result<HashMap<String, KeywordMetrics>, ClientError> {
        if !self.health.try_acquire(&endpoint.base_url).await {
            return Err(ClientError::CircuitOpen(endpoint.base_url.clone()));
        }

        let url = endpoint.query_url(batch);
        let mut last_error: Option<ClientError> = None;
        // Extra pause carried into the next attempt after a status-code retry
        let mut extra_wait = Duration::ZERO;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let wait = backoff(attempt, &self.backoff_ladder) + extra_wait;
                tracing::debug!(endpoint = %endpoint.base_url, attempt, wait_ms = wait.as_millis() as u64, "retrying batch call");
                tokio::time::sleep(wait).await;
                extra_wait = Duration::ZERO;
            }

            let started = Instant::now();
            match self.client.get(url.as_str()).send().await {
                Ok(response) => {
                    let status = response.status();
                    let latency = started.elapsed();

                    if status.is_success() {
                        return self.accept(endpoint, response, latency).await;
                    }

                    self.health.record_outcome(&endpoint.base_url, false, latency).await;
                    if should_retry(status.as_u16()) {
                        last_error = Some(ClientError::Status(status.as_u16()));
                        extra_wait = self.health.adaptive_interval(&endpoint.base_url).await;
                    } else {
                        return Err(ClientError::Status(status.as_u16()));
                    }
                }
                Err(e) => {
                    self.health
                        .record_outcome(&endpoint.base_url, false, started.elapsed())
                        .await;
                    last_error = Some(if e.is_timeout() {
                        ClientError::Timeout
                    } else {
                        ClientError::Transport(e)
                    });
                }
            }
        }

        Err(last_error.unwrap_or(ClientError::Timeout))
    }

    /// Read, parse, and validate a 2xx response
    async fn accept(
        &self,
        endpoint: &Endpoint,
        response: reqwest::Response,
        latency: Duration,
    ) -> Result<HashMap<String, KeywordMetrics>, ClientError> {
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                self.health.record_outcome(&endpoint.base_url, false, latency).await;
                return Err(ClientError::Transport(e));
            }
        };

        // A malformed body on 200 is a permanent failure, not a retry
        let parsed: BatchResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.health.record_outcome(&endpoint.base_url, false, latency).await;
                return Err(ClientError::InvalidResponse(e.to_string()));
            }
        };

        if parsed.status != "success" {
            self.health.record_outcome(&endpoint.base_url, false, latency).await;
            return Err(ClientError::InvalidResponse(format!(
                "unexpected response status: {}",
                parsed.status
            )));
        }

        self.health.record_outcome(&endpoint.base_url, true, latency).await;
        Ok(parsed.into_entries())
    }

    /// Execute a batch, isolating a poison item by bisection on failure
    ///
    /// Failures never propagate: a batch that cannot be resolved simply
    /// contributes no entries. Multi-item batches that fail are split in half
    /// and each half retried once.
    pub async fn resolve_batch(
        &self,
        endpoint: &Endpoint,
        batch: &[String],
    ) -> HashMap<String, KeywordMetrics> {
        match self.execute(endpoint, batch).await {
            Ok(fetched) => align_results(batch, fetched),
            Err(ClientError::CircuitOpen(_)) => {
                tracing::debug!(endpoint = %endpoint.base_url, size = batch.len(), "circuit open, skipping batch");
                HashMap::new()
            }
            Err(err) if batch.len() > 1 => {
                tracing::warn!(endpoint = %endpoint.base_url, size = batch.len(), error = %err, "batch failed, retrying halves");
                let (left, right) = bisect(batch);
                let mut merged = HashMap::new();
                for half in [left, right] {
                    if half.is_empty() {
                        continue;
                    }
                    match self.execute(endpoint, &half).await {
                        Ok(fetched) => merged.extend(align_results(&half, fetched)),
                        Err(err) => {
                            tracing::warn!(endpoint = %endpoint.base_url, size = half.len(), error = %err, "half batch failed");
                        }
                    }
                }
                merged
            }
            Err(err) => {
                tracing::warn!(endpoint = %endpoint.base_url, error = %err, "batch failed");
                HashMap::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_retry() {
        assert!(should_retry(429));
        assert!(should_retry(500));
        assert!(should_retry(502));
        assert!(should_retry(503));
        assert!(should_retry(504));

        assert!(!should_retry(400));
        assert!(!should_retry(401));
        assert!(!should_retry(403));
        assert!(!should_retry(404));
        assert!(!should_retry(200));
    }

    #[test]
    fn test_backoff_ladder_progression() {
        let ladder = DEFAULT_BACKOFF_LADDER;
        assert_eq!(backoff(1, &ladder), Duration::from_secs(3));
        assert_eq!(backoff(2, &ladder), Duration::from_secs(6));
        assert_eq!(backoff(3, &ladder), Duration::from_secs(12));
        assert_eq!(backoff(4, &ladder), Duration::from_secs(15));
        // Constant past the end of the ladder
        assert_eq!(backoff(9, &ladder), Duration::from_secs(15));
    }

    #[test]
    fn test_backoff_empty_ladder() {
        assert_eq!(backoff(1, &[]), Duration::ZERO);
    }

    #[test]
    fn test_transient_classification() {
        assert!(ClientError::Timeout.is_transient());
        assert!(ClientError::Status(503).is_transient());
        assert!(ClientError::CircuitOpen("http://a.example/".to_string()).is_transient());
        assert!(!ClientError::Status(404).is_transient());
        assert!(!ClientError::InvalidResponse("bad".to_string()).is_transient());
    }
}
