//! Validated hub records and change detection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PlaceKind;

/// A validated structural page aggregating content for a place or topic.
///
/// Upsert key is `(domain, url)`; an existing row is rewritten only when a
/// tracked field actually changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hub {
    pub domain: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_kind: Option<PlaceKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub nav_links_count: u32,
    pub article_links_count: u32,
    /// Validation evidence retained for auditing.
    pub evidence: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single changed field between a stored hub and a fresh observation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubChange {
    pub field: &'static str,
    pub from: serde_json::Value,
    pub to: serde_json::Value,
}

/// Diff the tracked fields of an existing hub against a fresh observation.
/// An empty result means the stored row should not be rewritten.
pub fn collect_hub_changes(existing: &Hub, incoming: &Hub) -> Vec<HubChange> {
    let mut changes = Vec::new();

    let mut check = |field: &'static str, from: serde_json::Value, to: serde_json::Value| {
        if from != to {
            changes.push(HubChange { field, from, to });
        }
    };

    check(
        "title",
        serde_json::json!(existing.title),
        serde_json::json!(incoming.title),
    );
    check(
        "placeSlug",
        serde_json::json!(existing.place_slug),
        serde_json::json!(incoming.place_slug),
    );
    check(
        "placeKind",
        serde_json::json!(existing.place_kind),
        serde_json::json!(incoming.place_kind),
    );
    check(
        "topicSlug",
        serde_json::json!(existing.topic_slug),
        serde_json::json!(incoming.topic_slug),
    );
    check(
        "topicLabel",
        serde_json::json!(existing.topic_label),
        serde_json::json!(incoming.topic_label),
    );
    check(
        "navLinksCount",
        serde_json::json!(existing.nav_links_count),
        serde_json::json!(incoming.nav_links_count),
    );
    check(
        "articleLinksCount",
        serde_json::json!(existing.article_links_count),
        serde_json::json!(incoming.article_links_count),
    );
    check(
        "evidence",
        existing.evidence.clone(),
        incoming.evidence.clone(),
    );

    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_hub() -> Hub {
        Hub {
            domain: "a.test".to_string(),
            url: "https://a.test/world/france".to_string(),
            place_slug: Some("france".to_string()),
            place_kind: Some(PlaceKind::Country),
            topic_slug: None,
            topic_label: None,
            title: Some("France news".to_string()),
            nav_links_count: 12,
            article_links_count: 30,
            evidence: serde_json::json!({"confidence": 0.8}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_no_changes_for_identical_hubs() {
        let hub = sample_hub();
        assert!(collect_hub_changes(&hub, &hub.clone()).is_empty());
    }

    #[test]
    fn test_changed_counts_detected() {
        let existing = sample_hub();
        let mut incoming = existing.clone();
        incoming.article_links_count = 31;
        incoming.title = Some("France — latest".to_string());

        let changes = collect_hub_changes(&existing, &incoming);
        let fields: Vec<_> = changes.iter().map(|c| c.field).collect();
        assert_eq!(fields, vec!["title", "articleLinksCount"]);
    }

    #[test]
    fn test_timestamps_not_tracked() {
        let existing = sample_hub();
        let mut incoming = existing.clone();
        incoming.updated_at = Utc::now() + chrono::Duration::hours(1);
        assert!(collect_hub_changes(&existing, &incoming).is_empty());
    }
}
