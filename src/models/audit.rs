//! Append-only audit log of validation decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PlaceKind;

/// Terminal verdict on one validated candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accepted,
    Rejected,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// One validation outcome, written for every accepted or rejected candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub run_id: String,
    pub attempt_id: String,
    pub domain: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_kind: Option<PlaceKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_name: Option<String>,
    pub decision: Decision,
    /// Validator metrics captured at decision time.
    pub validation_metrics: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
