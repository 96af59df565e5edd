//! Rekor REST API client with bounded retry
//!
//! Every request runs under a `RetryPolicy`: connection failures,
//! 5xx and 429 responses are retried with exponential backoff until
//! the attempt budget is spent; other 4xx responses fail immediately.

use super::{user_agent, ConsistencyProof, LogClient, LogInfo, RawLogEntry};
use crate::error::{MonitorError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound for any single delay
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Rekor v1 API client
pub struct RekorClient {
    base_url: String,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl RekorClient {
    /// Create a client for the log at `base_url`
    pub fn new(
        base_url: impl Into<String>,
        user_agent_extra: &str,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent(user_agent_extra))
            .timeout(timeout)
            .build()
            .map_err(|e| MonitorError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        tracing::debug!(url = %base_url, "Rekor client created");

        Ok(Self {
            base_url,
            http,
            retry,
        })
    }

    /// Base URL of the log
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn execute<F>(&self, op: &str, build: F) -> Result<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder + Send + Sync,
    {
        let attempts = self.retry.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            if attempt > 1 {
                let delay = self.retry.backoff(attempt - 1);
                tracing::warn!(
                    op,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %last_error,
                    "Retrying log request"
                );
                tokio::time::sleep(delay).await;
            }

            match build().send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    let message = format!("{} returned {}: {}", op, status, body.trim());
                    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                        last_error = message;
                    } else {
                        return Err(MonitorError::Api(message));
                    }
                }
                Err(e) => last_error = format!("{}: {}", op, e),
            }
        }

        tracing::error!(op, attempts, error = %last_error, "retry cancelled after {} attempts", attempts);
        Err(MonitorError::RetryExhausted {
            attempts,
            reason: last_error,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        op: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .execute(op, || self.http.get(&url).query(query))
            .await?;
        response
            .json()
            .await
            .map_err(|e| MonitorError::Api(format!("Failed to parse {} response: {}", op, e)))
    }
}

#[async_trait]
impl LogClient for RekorClient {
    async fn log_info(&self) -> Result<LogInfo> {
        self.get_json("log info", "/api/v1/log", &[]).await
    }

    async fn public_key(&self) -> Result<String> {
        let url = format!("{}/api/v1/log/publicKey", self.base_url);
        let response = self
            .execute("public key", || {
                self.http
                    .get(&url)
                    .header("Accept", "application/x-pem-file")
            })
            .await?;
        response
            .text()
            .await
            .map_err(|e| MonitorError::Api(format!("Failed to read public key: {}", e)))
    }

    async fn consistency_proof(
        &self,
        first_size: u64,
        last_size: u64,
        tree_id: &str,
    ) -> Result<ConsistencyProof> {
        let mut query = vec![
            ("firstSize", first_size.to_string()),
            ("lastSize", last_size.to_string()),
        ];
        if !tree_id.is_empty() {
            query.push(("treeID", tree_id.to_string()));
        }
        self.get_json("consistency proof", "/api/v1/log/proof", &query)
            .await
    }

    async fn entries_by_index(&self, indices: &[u64]) -> Result<Vec<RawLogEntry>> {
        if indices.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/v1/log/entries/retrieve", self.base_url);
        let body = serde_json::json!({ "logIndexes": indices });
        let response = self
            .execute("entries", || self.http.post(&url).json(&body))
            .await?;

        let pages: Vec<HashMap<String, RawLogEntry>> = response
            .json()
            .await
            .map_err(|e| MonitorError::Api(format!("Failed to parse entries response: {}", e)))?;

        let mut entries: Vec<RawLogEntry> = pages
            .into_iter()
            .flat_map(|page| page.into_iter())
            .map(|(uuid, mut entry)| {
                entry.uuid = uuid;
                entry
            })
            .collect();
        entries.sort_by_key(|e| e.log_index);
        Ok(entries)
    }

    fn name(&self) -> &str {
        "rekor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(4), Duration::from_millis(500));
        assert_eq!(policy.backoff(40), Duration::from_millis(500));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = RekorClient::new(
            "http://localhost:3000/",
            "",
            Duration::from_secs(1),
            RetryPolicy::default(),
        )
        .unwrap();
        assert_eq!(client.base_url(), "http://localhost:3000");
        assert_eq!(client.name(), "rekor");
    }

    #[tokio::test]
    async fn test_unreachable_log_exhausts_retries() {
        let client = RekorClient::new(
            "http://127.0.0.1:1",
            "",
            Duration::from_millis(200),
            RetryPolicy {
                max_attempts: 2,
                initial_backoff: Duration::from_millis(10),
                max_backoff: Duration::from_millis(10),
            },
        )
        .unwrap();

        let err = client.log_info().await.unwrap_err();
        assert!(matches!(err, MonitorError::RetryExhausted { attempts: 2, .. }));
        assert!(err.to_string().contains("retry cancelled after"));
    }
}
