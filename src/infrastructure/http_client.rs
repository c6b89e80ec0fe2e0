//! HTTP transport session for harvesting
//!
//! One pooled `reqwest` client shared by every concurrent fetch, with a
//! bounded exponential-backoff retry policy for transient server failures.
//! Rate-limit answers (429) are always retried, waiting at least as long as
//! the server's `Retry-After` asks.

use anyhow::{Context, Result};
use async_trait::async_trait;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use reqwest::{Client, Response, StatusCode, header::RETRY_AFTER};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::config::TransportConfig;
use super::transport::PageSource;
use crate::domain::FetchResult;

/// Which failures are retried, how often, and how long to wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub retry_statuses: Vec<u16>,
}

impl RetryPolicy {
    pub fn from_config(config: &TransportConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            retry_statuses: config.retry_statuses.clone(),
        }
    }

    /// Configured statuses, plus 429 whatever the configuration says
    pub fn is_retryable(&self, status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || self.retry_statuses.contains(&status.as_u16())
    }

    /// Delay before the retry that follows failed attempt `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// `Retry-After` in delta-seconds form; HTTP dates are ignored
fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&TransportConfig::default())
    }
}

/// Pooled HTTP client implementing [`PageSource`]
pub struct HttpClient {
    client: Client,
    policy: RetryPolicy,
    rate_limiter: Option<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl HttpClient {
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(&config.user_agent)
            .pool_max_idle_per_host(config.pool_size)
            .gzip(true)
            .build()
            .context("Failed to create HTTP client")?;

        let rate_limiter = NonZeroU32::new(config.max_requests_per_second)
            .map(|rps| RateLimiter::direct(Quota::per_second(rps)));

        info!(
            "HTTP session ready: pool={} attempts={} rate_limit={}",
            config.pool_size,
            config.max_attempts,
            if config.max_requests_per_second == 0 {
                "off".to_string()
            } else {
                format!("{}/s", config.max_requests_per_second)
            }
        );

        Ok(Self {
            client,
            policy: RetryPolicy::from_config(config),
            rate_limiter,
        })
    }

    async fn wait_for_slot(&self) {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }
    }
}

#[async_trait]
impl PageSource for HttpClient {
    async fn fetch(&self, url: &str) -> FetchResult {
        let max_attempts = self.policy.max_attempts;
        let mut last_status = None;
        let mut last_cause = String::from("no attempt made");

        for attempt in 1..=max_attempts {
            self.wait_for_slot().await;
            debug!("GET (attempt {}/{}) {}", attempt, max_attempts, url);

            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    last_status = Some(status.as_u16());

                    if self.policy.is_retryable(status) {
                        last_cause = format!("HTTP {status}");
                        if attempt < max_attempts {
                            let backoff = self.policy.backoff(attempt);
                            let delay = retry_after(&response).map_or(backoff, |wait| wait.max(backoff));
                            warn!("HTTP {} on attempt {} for {}, retrying in {:?}", status, attempt, url, delay);
                            tokio::time::sleep(delay).await;
                        }
                        continue;
                    }

                    // Anything else, success or not, goes to the extractor as-is
                    match response.text().await {
                        Ok(body) => return FetchResult::received(url, status.as_u16(), body),
                        Err(e) => {
                            last_cause = format!("failed to read body: {e}");
                        }
                    }
                }
                Err(e) => {
                    last_cause = if e.is_timeout() {
                        format!("timeout: {e}")
                    } else {
                        format!("network error: {e}")
                    };
                }
            }

            if attempt < max_attempts {
                let delay = self.policy.backoff(attempt);
                warn!("{} on attempt {} for {}, retrying in {:?}", last_cause, attempt, url, delay);
                tokio::time::sleep(delay).await;
            }
        }

        warn!("Giving up on {} after {} attempts: {}", url, max_attempts, last_cause);
        FetchResult::failed(
            url,
            last_status,
            format!("{last_cause} after {max_attempts} attempts"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answers with `responses` in order, one per connection; counts connections served
    async fn canned_server(responses: Vec<String>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/master/1", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        tokio::spawn(async move {
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buffer = vec![0u8; 8192];
                let mut read = 0;
                while !buffer[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut buffer[read..]).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    read += n;
                }
                counter.fetch_add(1, Ordering::SeqCst);
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });

        (url, hits)
    }

    fn http(status: &str, extra_headers: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n{extra_headers}\r\n{body}",
            body.len()
        )
    }

    fn fast_client(max_attempts: u32) -> HttpClient {
        let config = TransportConfig {
            max_attempts,
            initial_backoff_ms: 1,
            max_backoff_ms: 10,
            timeout_seconds: 5,
            ..TransportConfig::default()
        };
        HttpClient::new(&config).unwrap()
    }

    #[test]
    fn client_creation() {
        let client = HttpClient::new(&TransportConfig::default());
        assert!(client.is_ok());
    }

    #[test]
    fn backoff_doubles_from_initial_delay() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
        assert_eq!(policy.backoff(4), Duration::from_millis(1600));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy {
            max_backoff: Duration::from_secs(1),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff(30), Duration::from_secs(1));
    }

    #[test]
    fn server_errors_and_rate_limits_are_retryable() {
        let policy = RetryPolicy::default();

        for status in [429, 500, 502, 503, 504] {
            assert!(policy.is_retryable(StatusCode::from_u16(status).unwrap()));
        }
        for status in [200, 400, 403, 404, 501] {
            assert!(!policy.is_retryable(StatusCode::from_u16(status).unwrap()));
        }
    }

    #[test]
    fn rate_limit_is_retried_even_when_not_configured() {
        let policy = RetryPolicy {
            retry_statuses: Vec::new(),
            ..RetryPolicy::default()
        };
        assert!(policy.is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(!policy.is_retryable(StatusCode::SERVICE_UNAVAILABLE));
    }

    #[tokio::test]
    async fn unreachable_host_yields_bodiless_result() {
        let config = TransportConfig {
            max_attempts: 2,
            initial_backoff_ms: 1,
            timeout_seconds: 2,
            ..TransportConfig::default()
        };
        let client = HttpClient::new(&config).unwrap();

        // port 9 on localhost: nothing listens there in a test sandbox
        let result = client.fetch("http://127.0.0.1:9/listing").await;

        assert!(result.body.is_none());
        assert!(result.status.is_none());
        assert!(result.failure.as_deref().unwrap_or_default().contains("after 2 attempts"));
    }

    #[tokio::test]
    async fn transient_server_errors_are_retried_until_success() {
        let unavailable = http("503 Service Unavailable", "", "");
        let (url, hits) = canned_server(vec![
            unavailable.clone(),
            unavailable,
            http("200 OK", "", "<html>ok</html>"),
        ])
        .await;

        let result = fast_client(5).fetch(&url).await;

        assert_eq!(result.status, Some(200));
        assert_eq!(result.body.as_deref(), Some("<html>ok</html>"));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn persistent_server_error_stops_after_max_attempts() {
        let responses = vec![http("503 Service Unavailable", "", ""); 3];
        let (url, hits) = canned_server(responses).await;

        let result = fast_client(3).fetch(&url).await;

        assert!(result.body.is_none());
        assert_eq!(result.status, Some(503));
        assert!(result.failure.as_deref().unwrap_or_default().contains("after 3 attempts"));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn client_error_is_passed_through_without_retry() {
        let (url, hits) = canned_server(vec![http("404 Not Found", "", "gone")]).await;

        let result = fast_client(5).fetch(&url).await;

        assert_eq!(result.status, Some(404));
        assert_eq!(result.body.as_deref(), Some("gone"));
        assert!(result.failure.is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rate_limited_page_is_retried_after_waiting() {
        let (url, hits) = canned_server(vec![
            http("429 Too Many Requests", "Retry-After: 0\r\n", ""),
            http("200 OK", "", "<html>ok</html>"),
        ])
        .await;

        let result = fast_client(5).fetch(&url).await;

        assert_eq!(result.status, Some(200));
        assert_eq!(result.body.as_deref(), Some("<html>ok</html>"));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
