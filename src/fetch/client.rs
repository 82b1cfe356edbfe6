//! HTTP client with per-host politeness and structured results.
//!
//! Network faults never surface as errors from [`Fetcher::fetch`]: a
//! timeout becomes a synthetic 408 outcome, any other transport failure a
//! synthetic 500. Callers branch on the outcome, not on exceptions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

use super::user_agent::resolve_user_agent;

/// Request method supported by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMethod {
    Get,
    Head,
}

impl FetchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
        }
    }
}

/// Per-request options.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub method: FetchMethod,
    pub timeout: Duration,
    pub headers: HashMap<String, String>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            method: FetchMethod::Get,
            timeout: Duration::from_secs(15),
            headers: HashMap::new(),
        }
    }
}

/// Timing and size accounting for one request.
#[derive(Debug, Clone)]
pub struct FetchMetrics {
    pub request_started_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
    pub bytes_downloaded: u64,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub total_ms: u64,
    pub download_ms: u64,
    pub redirect_count: u32,
}

/// Structured result of one fetch attempt.
///
/// `ok` means the exchange completed with a 2xx status. Non-2xx responses
/// carry their real status and body; transport failures carry a synthetic
/// status (408 timeout, 500 otherwise) and an error message.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub ok: bool,
    pub http_status: u16,
    pub final_url: String,
    pub body: String,
    pub headers: HashMap<String, String>,
    pub error: Option<String>,
    pub metrics: FetchMetrics,
}

impl FetchOutcome {
    /// Synthetic outcome for a transport-level failure.
    fn failure(url: &str, status: u16, error: String, started_at: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            ok: false,
            http_status: status,
            final_url: url.to_string(),
            body: String::new(),
            headers: HashMap::new(),
            error: Some(error),
            metrics: FetchMetrics {
                request_started_at: started_at,
                fetched_at: now,
                bytes_downloaded: 0,
                content_type: None,
                content_length: None,
                total_ms: (now - started_at).num_milliseconds().max(0) as u64,
                download_ms: 0,
                redirect_count: 0,
            },
        }
    }
}

/// A URL fetcher. The production implementation is [`FetchClient`]; tests
/// inject a scripted stub.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> FetchOutcome;
}

/// Configuration for the production fetch client.
#[derive(Debug, Clone)]
pub struct FetchClientConfig {
    pub user_agent: Option<String>,
    /// Minimum delay between requests to the same host.
    pub rate_limit: Duration,
    pub timeout: Duration,
}

impl Default for FetchClientConfig {
    fn default() -> Self {
        Self {
            user_agent: None,
            rate_limit: Duration::from_millis(500),
            timeout: Duration::from_secs(15),
        }
    }
}

/// Tracks the last request instant per host and enforces the minimum
/// inter-request delay.
#[derive(Debug, Default, Clone)]
struct HostGate {
    hosts: Arc<RwLock<HashMap<String, Instant>>>,
}

impl HostGate {
    fn extract_host(url: &str) -> Option<String> {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|s| s.to_string()))
    }

    async fn acquire(&self, url: &str, min_delay: Duration) {
        let host = match Self::extract_host(url) {
            Some(h) => h,
            None => return,
        };

        let wait = {
            let hosts = self.hosts.read().await;
            hosts
                .get(&host)
                .and_then(|last| min_delay.checked_sub(last.elapsed()))
                .unwrap_or(Duration::ZERO)
        };

        if wait > Duration::ZERO {
            debug!("politeness delay for {}: {:?}", host, wait);
            tokio::time::sleep(wait).await;
        }

        self.hosts.write().await.insert(host, Instant::now());
    }
}

/// Production fetch executor over reqwest.
#[derive(Clone)]
pub struct FetchClient {
    client: Client,
    gate: HostGate,
    rate_limit: Duration,
}

impl FetchClient {
    pub fn new(config: FetchClientConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(resolve_user_agent(config.user_agent.as_deref()))
            .timeout(config.timeout)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            gate: HostGate::default(),
            rate_limit: config.rate_limit,
        })
    }
}

#[async_trait]
impl Fetcher for FetchClient {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> FetchOutcome {
        self.gate.acquire(url, self.rate_limit).await;

        let started_at = Utc::now();
        let start = Instant::now();

        let mut request = match options.method {
            FetchMethod::Get => self.client.get(url),
            FetchMethod::Head => self.client.head(url),
        };
        request = request.timeout(options.timeout);
        for (name, value) in &options.headers {
            request = request.header(name, value);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                let status = if e.is_timeout() { 408 } else { 500 };
                return FetchOutcome::failure(url, status, e.to_string(), started_at);
            }
        };

        let http_status = response.status().as_u16();
        let final_url = response.url().to_string();
        let redirect_count = u32::from(final_url != url);

        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.to_string(), v.to_string());
            }
        }
        let content_type = headers.get("content-type").cloned();
        let content_length = headers.get("content-length").and_then(|v| v.parse().ok());

        let download_start = Instant::now();
        let body = if options.method == FetchMethod::Head {
            String::new()
        } else {
            match response.text().await {
                Ok(b) => b,
                Err(e) => {
                    let status = if e.is_timeout() { 408 } else { 500 };
                    return FetchOutcome::failure(url, status, e.to_string(), started_at);
                }
            }
        };
        let download_ms = download_start.elapsed().as_millis() as u64;

        let fetched_at = Utc::now();
        FetchOutcome {
            ok: (200..300).contains(&http_status),
            http_status,
            final_url,
            headers,
            error: None,
            metrics: FetchMetrics {
                request_started_at: started_at,
                fetched_at,
                bytes_downloaded: body.len() as u64,
                content_type,
                content_length,
                total_ms: start.elapsed().as_millis() as u64,
                download_ms,
                redirect_count,
            },
            body,
        }
    }
}
