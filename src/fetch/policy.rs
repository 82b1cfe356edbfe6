//! Cache-age policy for deciding whether a candidate needs a fresh fetch.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::FetchRecord;

/// What to do with a candidate given its latest recorded fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDecision {
    /// No usable history; fetch it.
    Fetch,
    /// Fresh successful response on record.
    CachedOk,
    /// 404 on record, still within its (long) refresh window.
    Known404,
    /// Non-404 4xx on record, within the retry window.
    Recent4xx,
}

/// The three freshness windows.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachePolicy {
    /// Successful responses younger than this are fresh.
    pub max_age_ms: i64,
    /// 404s are not retried within this window.
    pub refresh_404_ms: i64,
    /// Other 4xx responses are not retried within this window.
    pub retry_4xx_ms: i64,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            max_age_ms: Duration::days(7).num_milliseconds(),
            refresh_404_ms: Duration::days(180).num_milliseconds(),
            retry_4xx_ms: Duration::days(7).num_milliseconds(),
        }
    }
}

impl CachePolicy {
    pub fn from_days(max_age_days: i64, refresh_404_days: i64, retry_4xx_days: i64) -> Self {
        Self {
            max_age_ms: Duration::days(max_age_days).num_milliseconds(),
            refresh_404_ms: Duration::days(refresh_404_days).num_milliseconds(),
            retry_4xx_ms: Duration::days(retry_4xx_days).num_milliseconds(),
        }
    }

    /// Apply the skip ladder to the latest recorded fetch for a URL.
    pub fn decide(&self, latest: Option<&FetchRecord>, now: DateTime<Utc>) -> CacheDecision {
        let record = match latest {
            Some(r) => r,
            None => return CacheDecision::Fetch,
        };
        let age_ms = record.age(now).num_milliseconds();

        match record.http_status {
            200..=299 if age_ms < self.max_age_ms => CacheDecision::CachedOk,
            404 if age_ms < self.refresh_404_ms => CacheDecision::Known404,
            s if (400..500).contains(&s) && s != 404 && age_ms < self.retry_4xx_ms => {
                CacheDecision::Recent4xx
            }
            _ => CacheDecision::Fetch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: u16, age: Duration) -> FetchRecord {
        let fetched_at = Utc::now() - age;
        FetchRecord {
            url: "https://a.test/x".to_string(),
            domain: "a.test".to_string(),
            http_status: status,
            http_success: (200..300).contains(&status),
            title: None,
            request_method: "GET".to_string(),
            request_started_at: fetched_at,
            fetched_at,
            bytes_downloaded: 0,
            content_type: None,
            content_length: None,
            total_ms: 0,
            download_ms: 0,
            redirect_count: 0,
        }
    }

    #[test]
    fn test_no_history_fetches() {
        let policy = CachePolicy::default();
        assert_eq!(policy.decide(None, Utc::now()), CacheDecision::Fetch);
    }

    #[test]
    fn test_fresh_success_is_cached() {
        let policy = CachePolicy::default();
        let r = record(200, Duration::hours(1));
        assert_eq!(policy.decide(Some(&r), Utc::now()), CacheDecision::CachedOk);
    }

    #[test]
    fn test_stale_success_refetches() {
        let policy = CachePolicy::default();
        let r = record(200, Duration::days(8));
        assert_eq!(policy.decide(Some(&r), Utc::now()), CacheDecision::Fetch);
    }

    #[test]
    fn test_recent_404_skipped_for_long_window() {
        let policy = CachePolicy::default();
        let r = record(404, Duration::days(30));
        assert_eq!(policy.decide(Some(&r), Utc::now()), CacheDecision::Known404);
    }

    #[test]
    fn test_ancient_404_refetches() {
        let policy = CachePolicy::default();
        let r = record(404, Duration::days(181));
        assert_eq!(policy.decide(Some(&r), Utc::now()), CacheDecision::Fetch);
    }

    #[test]
    fn test_recent_403_skipped() {
        let policy = CachePolicy::default();
        let r = record(403, Duration::days(2));
        assert_eq!(policy.decide(Some(&r), Utc::now()), CacheDecision::Recent4xx);
    }

    #[test]
    fn test_server_errors_always_refetch() {
        let policy = CachePolicy::default();
        let r = record(500, Duration::minutes(1));
        assert_eq!(policy.decide(Some(&r), Utc::now()), CacheDecision::Fetch);
    }

    #[test]
    fn test_custom_windows() {
        let policy = CachePolicy::from_days(1, 2, 1);
        let r = record(404, Duration::days(3));
        assert_eq!(policy.decide(Some(&r), Utc::now()), CacheDecision::Fetch);
    }
}
