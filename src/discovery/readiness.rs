//! Readiness assessment.
//!
//! Decides whether a domain has enough signal (library patterns, prior
//! hubs, fetch history, candidates) to warrant a discovery attempt.

use serde::{Deserialize, Serialize};

use crate::models::{Determination, Domain, DomainDetermination, PlaceKind};

use super::dspl::DsplSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadinessStatus {
    Ready,
    DataLimited,
    InsufficientData,
}

impl ReadinessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::DataLimited => "data-limited",
            Self::InsufficientData => "insufficient-data",
        }
    }
}

/// Observed signal counts for a domain.
#[derive(Debug, Clone, Default)]
pub struct DomainSignals {
    /// Verified patterns in the library for this host.
    pub verified_patterns: usize,
    /// Previously validated hubs on record.
    pub hub_count: u64,
    /// Total fetch history rows for the domain.
    pub fetch_total: u64,
    /// Candidate rows on record.
    pub candidate_count: u64,
    /// Whether readiness probes themselves timed out.
    pub probe_timed_out: bool,
}

/// Assessment result folded into the run summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Readiness {
    pub status: ReadinessStatus,
    pub reason: String,
    pub recommendations: Vec<String>,
    pub dspl: DsplSummary,
}

/// Apply the readiness rules for a domain and the kinds requested.
pub fn assess_readiness(
    domain: &Domain,
    kinds: &[PlaceKind],
    signals: &DomainSignals,
    dspl: DsplSummary,
    latest_determination: Option<&DomainDetermination>,
) -> Readiness {
    let mut recommendations = Vec::new();

    if let Some(last) = latest_determination {
        if last.determination == Determination::RateLimited {
            recommendations.push(format!(
                "Last run against {} was rate limited; consider a larger rateLimitMs",
                domain.host
            ));
        }
    }

    let no_patterns = signals.verified_patterns == 0;
    let no_coverage = signals.hub_count == 0;
    let no_history = signals.fetch_total == 0;
    let no_candidates = signals.candidate_count == 0;

    if signals.probe_timed_out {
        recommendations.push(format!(
            "Readiness probes for {} timed out; retry with a longer timeout before concluding",
            domain.host
        ));
        return Readiness {
            status: ReadinessStatus::DataLimited,
            reason: "readiness probes timed out".to_string(),
            recommendations,
            dspl,
        };
    }

    if no_patterns && no_coverage && no_history && no_candidates {
        recommendations.push(format!("Run crawl-place-hubs for {}", domain.host));
        return Readiness {
            status: ReadinessStatus::InsufficientData,
            reason: format!(
                "no verified patterns, hubs, fetch history, or candidates for {}",
                domain.host
            ),
            recommendations,
            dspl,
        };
    }

    if no_patterns && no_coverage {
        recommendations.push(format!(
            "Fetch history exists for {}; widen the candidate set to build coverage",
            domain.host
        ));
        return Readiness {
            status: ReadinessStatus::DataLimited,
            reason: format!(
                "no verified patterns or prior hubs for {}, proceeding on history alone",
                domain.host
            ),
            recommendations,
            dspl,
        };
    }

    Readiness {
        status: ReadinessStatus::Ready,
        reason: format!(
            "{} has {} verified pattern(s) and {} known hub(s) for kinds {:?}",
            domain.host,
            signals.verified_patterns,
            signals.hub_count,
            kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>()
        ),
        recommendations,
        dspl,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain() -> Domain {
        Domain::normalize("example.invalid").unwrap()
    }

    #[test]
    fn test_cold_domain_is_insufficient() {
        let readiness = assess_readiness(
            &domain(),
            &[PlaceKind::Country],
            &DomainSignals::default(),
            DsplSummary::default(),
            None,
        );
        assert_eq!(readiness.status, ReadinessStatus::InsufficientData);
        assert!(readiness
            .recommendations
            .iter()
            .any(|r| r == "Run crawl-place-hubs for example.invalid"));
    }

    #[test]
    fn test_history_without_coverage_is_data_limited() {
        let signals = DomainSignals {
            fetch_total: 42,
            ..Default::default()
        };
        let readiness = assess_readiness(
            &domain(),
            &[PlaceKind::Country],
            &signals,
            DsplSummary::default(),
            None,
        );
        assert_eq!(readiness.status, ReadinessStatus::DataLimited);
    }

    #[test]
    fn test_probe_timeout_escalates() {
        let signals = DomainSignals {
            verified_patterns: 3,
            hub_count: 10,
            fetch_total: 100,
            candidate_count: 20,
            probe_timed_out: true,
        };
        let readiness = assess_readiness(
            &domain(),
            &[PlaceKind::Country],
            &signals,
            DsplSummary::default(),
            None,
        );
        assert_eq!(readiness.status, ReadinessStatus::DataLimited);
        assert!(readiness
            .recommendations
            .iter()
            .any(|r| r.contains("timed out")));
    }

    #[test]
    fn test_verified_patterns_make_ready() {
        let signals = DomainSignals {
            verified_patterns: 2,
            hub_count: 5,
            fetch_total: 50,
            candidate_count: 12,
            probe_timed_out: false,
        };
        let readiness = assess_readiness(
            &domain(),
            &[PlaceKind::Country],
            &signals,
            DsplSummary {
                entry_present: true,
                verified_patterns: 2,
                total_patterns: 3,
            },
            None,
        );
        assert_eq!(readiness.status, ReadinessStatus::Ready);
    }
}
