use crate::error::{CloudError, Result};
use crate::token::load_token;
use crate::CloudInventory;
use async_trait::async_trait;
use rand::Rng;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde_json::Value;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::warn;

/// Public Linode API v4 base URL.
pub const DEFAULT_API_BASE: &str = "https://api.linode.com/v4";

const CALL_TIMEOUT: Duration = Duration::from_secs(8);
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// Per-call retry discipline.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts against failing or erroring responses.
    pub attempts: u32,
    /// First backoff interval; doubles per failed attempt.
    pub base_backoff: Duration,
    /// Backoff growth cap.
    pub max_backoff: Duration,
    /// Separate budget for 429 responses, which honor the server's
    /// Retry-After instead of consuming the attempt budget.
    pub rate_limit_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
            rate_limit_retries: 10,
        }
    }
}

/// HTTP client for the Linode API.
///
/// The token is loaded from the linode-cli config file per operation;
/// connections are pooled by reqwest underneath.
pub struct LinodeClient {
    pub(crate) http: reqwest::Client,
    pub(crate) base_url: String,
    pub(crate) token_path: PathBuf,
    pub(crate) retry: RetryPolicy,
    pub(crate) max_workers: usize,
}

impl LinodeClient {
    pub fn new(
        base_url: impl Into<String>,
        token_path: impl Into<PathBuf>,
        max_workers: usize,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(CALL_TIMEOUT)
            .build()
            .map_err(|e| CloudError::transient(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token_path: token_path.into(),
            retry: RetryPolicy::default(),
            max_workers: max_workers.max(1),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// GET a JSON document with the retry discipline applied.
    ///
    /// A 200 whose body is not JSON fails immediately; 429 waits out
    /// the server-advised interval without consuming the attempt
    /// budget; everything else (5xx, other 4xx, transport errors)
    /// retries with capped exponential backoff plus jitter.
    pub(crate) async fn api_get(
        &self,
        token: &str,
        url: &str,
        filter: Option<&str>,
    ) -> Result<Value> {
        let mut rate_limit_budget = self.retry.rate_limit_retries;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let mut request = self.http.get(url).bearer_auth(token);
            if let Some(filter) = filter {
                request = request.header("X-Filter", filter);
            }

            let failure = match request.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status == StatusCode::OK {
                        match resp.text().await {
                            Ok(body) => {
                                return serde_json::from_str(&body).map_err(|_| {
                                    CloudError::invalid_response(format!(
                                        "invalid JSON response from {url}"
                                    ))
                                });
                            }
                            Err(e) => format!("error reading body from {url}: {e}"),
                        }
                    } else if status == StatusCode::TOO_MANY_REQUESTS {
                        if rate_limit_budget == 0 {
                            return Err(CloudError::transient(format!(
                                "rate limited on {url} beyond the retry budget"
                            )));
                        }
                        rate_limit_budget -= 1;
                        let wait = retry_after_seconds(resp.headers());
                        warn!("rate limited (429) on {url}, retrying after {wait}s");
                        sleep(Duration::from_secs(wait)).await;
                        // a throttled call is not a failed attempt
                        attempt -= 1;
                        continue;
                    } else {
                        format!("api call to {url} failed with status {status}")
                    }
                }
                Err(e) => format!("network error calling {url}: {e}"),
            };

            if attempt >= self.retry.attempts {
                warn!("{failure}; attempt budget exhausted");
                return Err(CloudError::transient(format!(
                    "api call to {url} failed after {} attempts",
                    self.retry.attempts
                )));
            }

            let delay = backoff_delay(self.retry.base_backoff, attempt, self.retry.max_backoff)
                + jitter();
            warn!("{failure}; retrying in {:.1}s", delay.as_secs_f64());
            sleep(delay).await;
        }
    }
}

#[async_trait]
impl CloudInventory for LinodeClient {
    async fn list_vlan_addresses(&self, region: &str) -> Result<Vec<String>> {
        self.collect_vlan_addresses(region).await
    }

    async fn account_latency_ms(&self) -> Result<f64> {
        let token = load_token(&self.token_path)?;
        let url = format!("{}/account", self.base_url);
        let start = Instant::now();
        self.api_get(&token, &url, None).await?;
        Ok(start.elapsed().as_secs_f64() * 1000.0)
    }

    async fn check_region(&self, region: &str) -> Result<()> {
        let token = load_token(&self.token_path)?;
        let url = format!("{}/regions/{region}", self.base_url);
        self.api_get(&token, &url, None).await?;
        Ok(())
    }
}

/// Exponential backoff capped at `max`: `base * 2^(attempt - 1)`.
fn backoff_delay(base: Duration, attempt: u32, max: Duration) -> Duration {
    let doublings = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << doublings).min(max)
}

/// Uniform jitter in [0.1, 0.5] seconds.
fn jitter() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(100..=500))
}

/// Server-advised wait from a 429 response, defaulting to 5 seconds.
fn retry_after_seconds(headers: &HeaderMap) -> u64 {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_backoff_delay_doubles_and_caps() {
        let base = Duration::from_secs(2);
        let max = Duration::from_secs(60);
        assert_eq!(backoff_delay(base, 1, max), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 2, max), Duration::from_secs(4));
        assert_eq!(backoff_delay(base, 3, max), Duration::from_secs(8));
        assert_eq!(backoff_delay(base, 6, max), Duration::from_secs(60));
        assert_eq!(backoff_delay(base, 30, max), Duration::from_secs(60));
    }

    #[test]
    fn test_retry_after_header() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("12"));
        assert_eq!(retry_after_seconds(&headers), 12);
    }

    #[test]
    fn test_retry_after_defaults_without_header() {
        assert_eq!(retry_after_seconds(&HeaderMap::new()), 5);

        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
        assert_eq!(retry_after_seconds(&headers), 5);
    }

    #[test]
    fn test_jitter_bounds() {
        for _ in 0..50 {
            let j = jitter();
            assert!(j >= Duration::from_millis(100));
            assert!(j <= Duration::from_millis(500));
        }
    }
}
