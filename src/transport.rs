//! HTTP transport with retry handling.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, warn};

use crate::config::GatewayConfig;
use crate::error::InvokeError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const BASE_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Statuses worth retrying: throttling and transient upstream failures.
const RETRYABLE: [u16; 5] = [429, 500, 502, 503, 504];

/// Retry schedule for transient failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 2 }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn is_retryable(status: StatusCode) -> bool {
        RETRYABLE.contains(&status.as_u16())
    }

    /// Exponential backoff for the given zero-based attempt.
    #[must_use]
    pub fn backoff(self, attempt: u32) -> Duration {
        BASE_BACKOFF
            .saturating_mul(1u32 << attempt.min(10))
            .min(MAX_BACKOFF)
    }
}

/// Gateway HTTP client. Cheap to clone; wraps a shared connection pool.
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
    retry: RetryPolicy,
}

impl Transport {
    /// # Errors
    ///
    /// Returns `InvokeError::Config` when the underlying client cannot be
    /// constructed.
    pub fn new(config: &GatewayConfig) -> Result<Self, InvokeError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .tcp_nodelay(true)
            .pool_max_idle_per_host(8)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|err| InvokeError::Config(err.to_string()))?;
        Ok(Self {
            client,
            retry: RetryPolicy::default(),
        })
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// POST a JSON body, retrying transient failures.
    ///
    /// The final response is returned regardless of status; callers map
    /// non-success statuses to errors once the body has been read.
    ///
    /// # Errors
    ///
    /// Returns `InvokeError::Connection` when every attempt fails at the
    /// transport level.
    pub async fn post_json(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: &serde_json::Value,
    ) -> Result<Response, InvokeError> {
        let header_map = build_header_map(headers)?;
        let mut attempt = 0;
        loop {
            let result = self
                .client
                .post(url)
                .headers(header_map.clone())
                .json(body)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    if !RetryPolicy::is_retryable(status) || attempt >= self.retry.max_retries {
                        return Ok(response);
                    }
                    let delay = retry_after(&response).unwrap_or_else(|| self.retry.backoff(attempt));
                    warn!(%status, attempt, delay_ms = delay.as_millis() as u64, "retrying gateway request");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    if attempt >= self.retry.max_retries {
                        return Err(InvokeError::Connection(err.to_string()));
                    }
                    let delay = self.retry.backoff(attempt);
                    debug!(error = %err, attempt, "request failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
            attempt += 1;
        }
    }
}

fn build_header_map(headers: &[(String, String)]) -> Result<HeaderMap, InvokeError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| InvokeError::Config(format!("invalid header name {name}: {err}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|err| InvokeError::Config(format!("invalid header value: {err}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        for code in [429u16, 500, 502, 503, 504] {
            let status = StatusCode::from_u16(code).unwrap();
            assert!(RetryPolicy::is_retryable(status), "{code} should retry");
        }
        for code in [200u16, 400, 401, 404] {
            let status = StatusCode::from_u16(code).unwrap();
            assert!(!RetryPolicy::is_retryable(status), "{code} should not retry");
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy { max_retries: 5 };
        assert_eq!(policy.backoff(0), Duration::from_millis(500));
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(30), MAX_BACKOFF);
    }

    #[test]
    fn test_header_map_rejects_bad_values() {
        let headers = vec![("X-Ok".to_string(), "bad\nvalue".to_string())];
        assert!(build_header_map(&headers).is_err());
    }
}
