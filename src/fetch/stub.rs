//! Scripted fetcher for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::{FetchMetrics, FetchOptions, FetchOutcome, Fetcher};

/// One scripted response.
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    pub http_status: u16,
    pub body: String,
}

impl ScriptedResponse {
    pub fn ok(body: &str) -> Self {
        Self {
            http_status: 200,
            body: body.to_string(),
        }
    }

    pub fn status(http_status: u16) -> Self {
        Self {
            http_status,
            body: String::new(),
        }
    }
}

/// Fetcher that replays scripted responses and records request order.
///
/// URLs without a script produce a 404 outcome.
#[derive(Default)]
pub struct StubFetcher {
    responses: Mutex<HashMap<String, ScriptedResponse>>,
    requests: Mutex<Vec<String>>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, url: &str, response: ScriptedResponse) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
    }

    /// URLs requested so far, in call order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, url: &str, _options: &FetchOptions) -> FetchOutcome {
        self.requests.lock().unwrap().push(url.to_string());

        let scripted = self
            .responses
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| ScriptedResponse::status(404));

        let now = Utc::now();
        FetchOutcome {
            ok: (200..300).contains(&scripted.http_status),
            http_status: scripted.http_status,
            final_url: url.to_string(),
            headers: HashMap::from([(
                "content-type".to_string(),
                "text/html; charset=utf-8".to_string(),
            )]),
            error: None,
            metrics: FetchMetrics {
                request_started_at: now,
                fetched_at: now,
                bytes_downloaded: scripted.body.len() as u64,
                content_type: Some("text/html; charset=utf-8".to_string()),
                content_length: Some(scripted.body.len() as u64),
                total_ms: 1,
                download_ms: 1,
                redirect_count: 0,
            },
            body: scripted.body,
        }
    }
}
