//! Candidate hub URLs and their per-attempt state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Place, PlaceKind, Prediction, Topic};

/// Processing state of a candidate within one attempt.
///
/// Transitions are monotone: `pending` moves to exactly one cache or fetch
/// outcome, and only `fetched-ok` continues on to a validation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CandidateStatus {
    Pending,
    CachedOk,
    Cached404,
    Cached4xx,
    FetchedOk,
    /// Fetched but the response was not usable (non-2xx other than 404/429).
    FetchedError,
    /// The request itself failed (timeout, connection error).
    FetchError,
    Validated,
    ValidationFailed,
}

impl CandidateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::CachedOk => "cached-ok",
            Self::Cached404 => "cached-404",
            Self::Cached4xx => "cached-4xx",
            Self::FetchedOk => "fetched-ok",
            Self::FetchedError => "fetched-error",
            Self::FetchError => "fetch-error",
            Self::Validated => "validated",
            Self::ValidationFailed => "validation-failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "cached-ok" => Some(Self::CachedOk),
            "cached-404" => Some(Self::Cached404),
            "cached-4xx" => Some(Self::Cached4xx),
            "fetched-ok" => Some(Self::FetchedOk),
            "fetched-error" => Some(Self::FetchedError),
            "fetch-error" => Some(Self::FetchError),
            "validated" => Some(Self::Validated),
            "validation-failed" => Some(Self::ValidationFailed),
            _ => None,
        }
    }

    /// Terminal states end processing for the candidate in this attempt.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::FetchedOk)
    }
}

/// Validation outcome recorded on a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationStatus {
    Passed,
    Failed,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "passed" => Some(Self::Passed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A predicted URL persisted with its signals and processing state.
///
/// Unique per `(domain, canonical_url)`; re-saving refreshes the signals
/// payload and `last_seen_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub domain: String,
    /// Normalized, lowercased URL used as the dedup key.
    pub canonical_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_kind: Option<PlaceKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_slug: Option<String>,
    pub analyzer: String,
    pub strategy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Structured prediction signals (analyzer, template, inputs).
    pub signals: serde_json::Value,
    pub status: CandidateStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_status: Option<ValidationStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub attempt_id: String,
    pub last_seen_at: DateTime<Utc>,
}

impl Candidate {
    /// Build a pending candidate for a place hub prediction.
    pub fn for_place(
        domain: &str,
        canonical_url: String,
        place: &Place,
        prediction: &Prediction,
        attempt_id: &str,
    ) -> Self {
        Self {
            domain: domain.to_string(),
            canonical_url,
            place_kind: Some(place.kind),
            place_name: Some(place.name.clone()),
            place_code: place.code.clone(),
            topic_slug: None,
            analyzer: prediction.analyzer.clone(),
            strategy: prediction.strategy.clone(),
            score: prediction.score,
            confidence: prediction.confidence,
            pattern: prediction.pattern.clone(),
            signals: serde_json::json!({
                "analyzer": prediction.analyzer,
                "strategy": prediction.strategy,
                "pattern": prediction.pattern,
                "place": place.name,
                "placeKind": place.kind.as_str(),
            }),
            status: CandidateStatus::Pending,
            validation_status: None,
            http_status: None,
            error_message: None,
            attempt_id: attempt_id.to_string(),
            last_seen_at: Utc::now(),
        }
    }

    /// Build a pending candidate for a topic hub prediction.
    pub fn for_topic(
        domain: &str,
        canonical_url: String,
        topic: &Topic,
        prediction: &Prediction,
        attempt_id: &str,
    ) -> Self {
        Self {
            domain: domain.to_string(),
            canonical_url,
            place_kind: None,
            place_name: None,
            place_code: None,
            topic_slug: Some(topic.slug.clone()),
            analyzer: prediction.analyzer.clone(),
            strategy: prediction.strategy.clone(),
            score: prediction.score,
            confidence: prediction.confidence,
            pattern: prediction.pattern.clone(),
            signals: serde_json::json!({
                "analyzer": prediction.analyzer,
                "strategy": prediction.strategy,
                "pattern": prediction.pattern,
                "topic": topic.slug,
            }),
            status: CandidateStatus::Pending,
            validation_status: None,
            http_status: None,
            error_message: None,
            attempt_id: attempt_id.to_string(),
            last_seen_at: Utc::now(),
        }
    }

    /// Build a pending candidate for a place-topic combination prediction.
    pub fn for_combination(
        domain: &str,
        canonical_url: String,
        place: &Place,
        topic: &Topic,
        prediction: &Prediction,
        attempt_id: &str,
    ) -> Self {
        let mut candidate = Self::for_place(domain, canonical_url, place, prediction, attempt_id);
        candidate.topic_slug = Some(topic.slug.clone());
        candidate.signals["topic"] = serde_json::json!(topic.slug);
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            CandidateStatus::Pending,
            CandidateStatus::CachedOk,
            CandidateStatus::Cached404,
            CandidateStatus::Cached4xx,
            CandidateStatus::FetchedOk,
            CandidateStatus::FetchedError,
            CandidateStatus::FetchError,
            CandidateStatus::Validated,
            CandidateStatus::ValidationFailed,
        ] {
            assert_eq!(CandidateStatus::from_str(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(!CandidateStatus::Pending.is_terminal());
        assert!(!CandidateStatus::FetchedOk.is_terminal());
        assert!(CandidateStatus::Validated.is_terminal());
        assert!(CandidateStatus::Cached404.is_terminal());
        assert!(CandidateStatus::FetchError.is_terminal());
    }

    #[test]
    fn test_combination_candidate_carries_both_keys() {
        let place = Place {
            kind: PlaceKind::Country,
            name: "France".to_string(),
            code: Some("fr".to_string()),
            parent_code: None,
            importance: 0.9,
        };
        let topic = Topic::from_slug("business");
        let prediction = Prediction {
            url: "/world/france/business".to_string(),
            analyzer: "convention".to_string(),
            strategy: "place-topic".to_string(),
            pattern: Some("/world/{place}/{topic}".to_string()),
            score: Some(0.6),
            confidence: None,
        };
        let c = Candidate::for_combination(
            "a.test",
            "https://a.test/world/france/business".to_string(),
            &place,
            &topic,
            &prediction,
            "attempt-1",
        );
        assert_eq!(c.place_name.as_deref(), Some("France"));
        assert_eq!(c.topic_slug.as_deref(), Some("business"));
        assert_eq!(c.signals["topic"], serde_json::json!("business"));
    }
}
