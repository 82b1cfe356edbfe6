//! The per-run summary accumulated by the domain processor.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::discovery::Readiness;
use crate::models::{Determination, HubChange};

/// Preview of hub writes (or would-be writes on a dry run).
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffPreview {
    pub inserted: Vec<DiffEntry>,
    pub updated: Vec<DiffUpdateEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffEntry {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffUpdateEntry {
    pub url: String,
    pub changes: Vec<HubChange>,
}

/// A notable decision taken during the run (rate-limit abort, stop, cap).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionEntry {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub detail: String,
    pub at: DateTime<Utc>,
}

impl DecisionEntry {
    pub fn new(kind: &str, url: Option<String>, detail: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            url,
            detail: detail.into(),
            at: Utc::now(),
        }
    }
}

/// Counters and outcomes for one pipeline run. This is the single
/// authoritative summary; every code path increments exactly one set.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub domain: String,
    pub operation: String,
    pub run_id: String,
    pub attempt_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub determination: Option<Determination>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub determination_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness: Option<Readiness>,

    pub total_places: u64,
    pub total_topics: u64,
    /// Candidate URLs enumerated (processed or not).
    pub total_urls: u64,
    /// Real HTTP attempts, whatever their status.
    pub fetched: u64,
    /// Skips on a fresh successful response.
    pub cached: u64,
    /// Skips on a known 404 within its refresh window.
    pub skipped: u64,
    /// Skips on a recent non-404 4xx.
    pub skipped_recent_4xx: u64,
    /// Fresh 404 responses persisted this run.
    pub stored_404: u64,
    pub inserted_hubs: u64,
    pub updated_hubs: u64,
    pub errors: u64,
    pub rate_limited: u64,
    pub validation_succeeded: u64,
    pub validation_failed: u64,
    pub validation_failure_reasons: BTreeMap<String, u64>,

    pub skipped_duplicate_place: u64,
    pub skipped_duplicate_topic: u64,
    pub skipped_duplicate_combination: u64,
    pub unsupported_kinds: Vec<String>,

    pub diff_preview: DiffPreview,
    pub decisions: Vec<DecisionEntry>,
    pub aborted: bool,

    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl RunSummary {
    pub fn new(domain: &str, operation: &str, run_id: &str, attempt_id: &str) -> Self {
        Self {
            domain: domain.to_string(),
            operation: operation.to_string(),
            run_id: run_id.to_string(),
            attempt_id: attempt_id.to_string(),
            determination: None,
            determination_reason: None,
            readiness: None,
            total_places: 0,
            total_topics: 0,
            total_urls: 0,
            fetched: 0,
            cached: 0,
            skipped: 0,
            skipped_recent_4xx: 0,
            stored_404: 0,
            inserted_hubs: 0,
            updated_hubs: 0,
            errors: 0,
            rate_limited: 0,
            validation_succeeded: 0,
            validation_failed: 0,
            validation_failure_reasons: BTreeMap::new(),
            skipped_duplicate_place: 0,
            skipped_duplicate_topic: 0,
            skipped_duplicate_combination: 0,
            unsupported_kinds: Vec::new(),
            diff_preview: DiffPreview::default(),
            decisions: Vec::new(),
            aborted: false,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
        }
    }

    pub fn bucket_validation_failure(&mut self, reason: &str) {
        self.validation_failed += 1;
        *self
            .validation_failure_reasons
            .entry(reason.to_string())
            .or_insert(0) += 1;
    }

    pub fn set_determination(&mut self, determination: Determination, reason: impl Into<String>) {
        self.determination = Some(determination);
        self.determination_reason = Some(reason.into());
    }

    pub fn finalize(&mut self) {
        let now = Utc::now();
        self.completed_at = Some(now);
        self.duration_ms = Some((now - self.started_at).num_milliseconds().max(0) as u64);
    }

    /// Processed candidates can never exceed the enumerated set.
    pub fn processed_candidates(&self) -> u64 {
        self.fetched + self.cached + self.skipped + self.skipped_recent_4xx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_bucketing() {
        let mut summary = RunSummary::new("a.test", "ensureCountryHubs", "run-1", "attempt-1");
        summary.bucket_validation_failure("too-few-article-links");
        summary.bucket_validation_failure("too-few-article-links");
        summary.bucket_validation_failure("place-token-missing");

        assert_eq!(summary.validation_failed, 3);
        assert_eq!(
            summary.validation_failure_reasons["too-few-article-links"],
            2
        );
        assert_eq!(summary.validation_failure_reasons["place-token-missing"], 1);
    }

    #[test]
    fn test_finalize_sets_duration() {
        let mut summary = RunSummary::new("a.test", "ensureCountryHubs", "run-1", "attempt-1");
        summary.finalize();
        assert!(summary.completed_at.is_some());
        assert!(summary.duration_ms.is_some());
    }
}
