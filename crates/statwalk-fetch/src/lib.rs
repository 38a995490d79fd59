//! Raw page fetching for statwalk: retrying HTTP client with request pacing and an
//! optional scraping proxy, plus an offline fixture fetcher.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tracing::{info_span, warn, Instrument};

pub const CRATE_NAME: &str = "statwalk-fetch";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    // Throttling and server-side failures only; other statuses mean the page is wrong.
    pub fn retries_status(&self, status: StatusCode, attempt: usize) -> bool {
        attempt < self.max_retries
            && (status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS)
    }

    pub fn retries_error(&self, err: &reqwest::Error, attempt: usize) -> bool {
        attempt < self.max_retries && (err.is_timeout() || err.is_connect() || err.is_body())
    }

    pub fn pause_before_retry(&self, attempt: usize) -> Duration {
        let factor = u32::try_from(attempt)
            .ok()
            .and_then(|exp| 2u32.checked_pow(exp))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub endpoint: String,
    pub api_key: String,
    pub params: Vec<(String, String)>,
}

impl ProxyConfig {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            params: vec![("js_render".to_string(), "true".to_string())],
        }
    }

    pub fn query_for(&self, target_url: &str) -> Vec<(String, String)> {
        let mut query = vec![
            ("apikey".to_string(), self.api_key.clone()),
            ("url".to_string(), target_url.to_string()),
        ];
        query.extend(self.params.iter().cloned());
        query
    }
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub max_concurrency: usize,
    pub min_interval: Duration,
    pub retry: RetryPolicy,
    pub proxy: Option<ProxyConfig>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: Some("statwalk/0.1".to_string()),
            max_concurrency: 4,
            min_interval: Duration::from_millis(1000),
            retry: RetryPolicy::default(),
            proxy: None,
        }
    }
}

impl FetchConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let number = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        let retry = RetryPolicy {
            max_retries: number("STATWALK_MAX_RETRIES")
                .map(|v| v as usize)
                .unwrap_or(defaults.retry.max_retries),
            base_delay: number("STATWALK_BACKOFF_BASE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.retry.base_delay),
            ..defaults.retry
        };
        let proxy = match (lookup("STATWALK_PROXY_URL"), lookup("STATWALK_PROXY_API_KEY")) {
            (Some(endpoint), Some(key)) if !endpoint.is_empty() && !key.is_empty() => {
                Some(ProxyConfig::new(endpoint, key))
            }
            _ => None,
        };

        Self {
            timeout: number("STATWALK_HTTP_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            user_agent: lookup("STATWALK_USER_AGENT").or(defaults.user_agent),
            max_concurrency: defaults.max_concurrency,
            min_interval: number("STATWALK_MIN_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.min_interval),
            retry,
            proxy,
        }
    }
}

/// Serializes callers so consecutive requests are at least `min_interval` apart.
#[derive(Debug)]
pub struct RequestPacer {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RequestPacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    pub async fn wait_turn(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub url: String,
    pub final_url: String,
    pub status: u16,
    pub body: String,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed after retries: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("no fixture registered for {url}")]
    MissingFixture { url: String },
    #[error("fetcher has been shut down")]
    Closed,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<FetchedPage, FetchError>;

    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        Ok(self.fetch_page(url).await?.body)
    }
}

#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    limit: Arc<Semaphore>,
    pacer: RequestPacer,
    retry: RetryPolicy,
    proxy: Option<ProxyConfig>,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            limit: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            pacer: RequestPacer::new(config.min_interval),
            retry: config.retry,
            proxy: config.proxy,
        })
    }

    fn request_for(&self, url: &str) -> reqwest::RequestBuilder {
        match &self.proxy {
            Some(proxy) => self.client.get(&proxy.endpoint).query(&proxy.query_for(url)),
            None => self.client.get(url),
        }
    }

    async fn fetch_with_retries(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let mut attempt = 0usize;
        loop {
            self.pacer.wait_turn().await;

            match self.request_for(url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    let status = resp.status().as_u16();
                    let final_url = resp.url().to_string();
                    return Ok(FetchedPage {
                        url: url.to_string(),
                        final_url,
                        status,
                        body: resp.text().await?,
                        fetched_at: Utc::now(),
                    });
                }
                Ok(resp) if self.retry.retries_status(resp.status(), attempt) => {
                    warn!(status = resp.status().as_u16(), attempt, "page fetch refused; retrying");
                }
                Ok(resp) => {
                    return Err(FetchError::HttpStatus {
                        status: resp.status().as_u16(),
                        url: url.to_string(),
                    });
                }
                Err(err) if self.retry.retries_error(&err, attempt) => {
                    warn!(error = %err, attempt, "page fetch failed; retrying");
                }
                Err(err) => return Err(FetchError::Request(err)),
            }

            tokio::time::sleep(self.retry.pause_before_retry(attempt)).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_page(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let _permit = self.limit.acquire().await.map_err(|_| FetchError::Closed)?;
        let span = info_span!("http_fetch", url, proxied = self.proxy.is_some());
        self.fetch_with_retries(url).instrument(span).await
    }
}

#[derive(Debug, Clone, Default)]
pub struct FixtureFetcher {
    pages: HashMap<String, String>,
}

impl FixtureFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.insert(url, body);
        self
    }

    pub fn insert(&mut self, url: impl Into<String>, body: impl Into<String>) {
        self.pages.insert(url.into(), body.into());
    }
}

#[async_trait]
impl PageFetcher for FixtureFetcher {
    async fn fetch_page(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let body = self
            .pages
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::MissingFixture {
                url: url.to_string(),
            })?;
        Ok(FetchedPage {
            url: url.to_string(),
            final_url: url.to_string(),
            status: 200,
            body,
            fetched_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pauses_double_and_stop_at_the_cap() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };

        assert_eq!(policy.pause_before_retry(0), Duration::from_millis(100));
        assert_eq!(policy.pause_before_retry(1), Duration::from_millis(200));
        assert_eq!(policy.pause_before_retry(2), Duration::from_millis(350));
        assert_eq!(policy.pause_before_retry(40), Duration::from_millis(350));
    }

    #[test]
    fn default_pause_doubles_from_ten_seconds() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.pause_before_retry(0), Duration::from_secs(10));
        assert_eq!(policy.pause_before_retry(1), Duration::from_secs(20));
        assert_eq!(policy.max_retries, 2);
    }

    #[test]
    fn only_throttling_and_server_errors_retry_while_attempts_remain() {
        let policy = RetryPolicy::default();
        assert!(policy.retries_status(StatusCode::BAD_GATEWAY, 0));
        assert!(policy.retries_status(StatusCode::TOO_MANY_REQUESTS, 1));
        assert!(!policy.retries_status(StatusCode::TOO_MANY_REQUESTS, 2));
        assert!(!policy.retries_status(StatusCode::NOT_FOUND, 0));
        assert!(!policy.retries_status(StatusCode::FORBIDDEN, 0));
    }

    #[test]
    fn proxy_query_carries_target_and_render_flag() {
        let proxy = ProxyConfig::new("https://proxy.example/v1/", "secret");
        let query = proxy.query_for("https://fbref.com/en/comps/9/Premier-League-Stats");
        assert_eq!(query[0], ("apikey".to_string(), "secret".to_string()));
        assert_eq!(query[1].1, "https://fbref.com/en/comps/9/Premier-League-Stats");
        assert!(query.contains(&("js_render".to_string(), "true".to_string())));
    }

    #[test]
    fn config_reads_overrides_and_ignores_garbage() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("STATWALK_MIN_INTERVAL_MS", "3000"),
            ("STATWALK_MAX_RETRIES", "4"),
            ("STATWALK_HTTP_TIMEOUT_SECS", "not-a-number"),
            ("STATWALK_PROXY_URL", "https://proxy.example/v1/"),
            ("STATWALK_PROXY_API_KEY", "k"),
        ]);
        let config = FetchConfig::from_lookup(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.min_interval, Duration::from_secs(3));
        assert_eq!(config.retry.max_retries, 4);
        assert_eq!(config.retry.base_delay, Duration::from_secs(10));
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.proxy.unwrap().api_key, "k");
    }

    #[test]
    fn proxy_requires_both_endpoint_and_key() {
        let config = FetchConfig::from_lookup(|key| {
            (key == "STATWALK_PROXY_URL").then(|| "https://proxy.example/v1/".to_string())
        });
        assert!(config.proxy.is_none());
    }

    #[tokio::test]
    async fn pacer_spaces_consecutive_requests() {
        let pacer = RequestPacer::new(Duration::from_millis(40));
        let started = Instant::now();
        pacer.wait_turn().await;
        pacer.wait_turn().await;
        pacer.wait_turn().await;
        assert!(started.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn fixture_fetcher_serves_registered_pages_only() {
        let fetcher = FixtureFetcher::new().with_page("https://example.test/a", "<html>a</html>");
        let text = fetcher.fetch_text("https://example.test/a").await.unwrap();
        assert_eq!(text, "<html>a</html>");

        let err = fetcher.fetch_text("https://example.test/b").await.unwrap_err();
        assert!(matches!(err, FetchError::MissingFixture { url } if url == "https://example.test/b"));
    }
}
