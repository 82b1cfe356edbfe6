//! Fetch history records.
//!
//! One row per HTTP attempt, append-only. "Latest fetch for a URL" is
//! always the row with the greatest `fetched_at`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pipeline stage a fetch was recorded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FetchStage {
    Get,
    Head,
}

impl FetchStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
        }
    }
}

/// Tags attached when recording a fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchTags {
    pub stage: FetchStage,
    pub attempt_id: String,
    pub cache_hit: bool,
}

/// One recorded HTTP attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchRecord {
    pub url: String,
    pub domain: String,
    pub http_status: u16,
    pub http_success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub request_method: String,
    pub request_started_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
    pub bytes_downloaded: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
    pub total_ms: u64,
    pub download_ms: u64,
    pub redirect_count: u32,
}

impl FetchRecord {
    /// Age of this record relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.fetched_at
    }
}
