//! Terminal per-domain verdicts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of processing (or declining to process) a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Determination {
    Processed,
    RateLimited,
    InsufficientData,
    DataLimited,
    Error,
}

impl Determination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::RateLimited => "rate-limited",
            Self::InsufficientData => "insufficient-data",
            Self::DataLimited => "data-limited",
            Self::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "processed" => Some(Self::Processed),
            "rate-limited" => Some(Self::RateLimited),
            "insufficient-data" => Some(Self::InsufficientData),
            "data-limited" => Some(Self::DataLimited),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Append-only record of a domain verdict; "latest" is `max(created_at)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainDetermination {
    pub domain: String,
    pub determination: Determination,
    pub reason: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl DomainDetermination {
    pub fn new(
        domain: &str,
        determination: Determination,
        reason: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            domain: domain.to_string(),
            determination,
            reason: reason.into(),
            details,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_determination_round_trip() {
        for d in [
            Determination::Processed,
            Determination::RateLimited,
            Determination::InsufficientData,
            Determination::DataLimited,
            Determination::Error,
        ] {
            assert_eq!(Determination::from_str(d.as_str()), Some(d));
        }
    }
}
