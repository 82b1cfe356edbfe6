//! Domain-specific pattern library.
//!
//! A static, per-host set of URL templates known to produce hubs.
//! Templates use `{slug}`, `{code}`, and `{topic}` placeholders.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::{Place, PlaceKind, Topic};

/// One URL template with its provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternTemplate {
    pub template: String,
    /// Place kind this template targets; None for topic templates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<PlaceKind>,
    pub score: f64,
    /// True when the template has produced a validated hub before.
    pub verified: bool,
}

impl PatternTemplate {
    pub fn expand_place(&self, place: &Place) -> String {
        self.template
            .replace("{slug}", &place.slug())
            .replace("{code}", place.code.as_deref().unwrap_or(&place.slug()))
    }

    pub fn expand_topic(&self, topic: &Topic) -> String {
        self.template.replace("{topic}", &topic.slug)
    }

    pub fn expand_combination(&self, place: &Place, topic: &Topic) -> String {
        self.expand_place(place).replace("{topic}", &topic.slug)
    }
}

/// Per-host entry in the library.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DsplEntry {
    pub host: String,
    #[serde(default)]
    pub place_patterns: Vec<PatternTemplate>,
    #[serde(default)]
    pub topic_patterns: Vec<PatternTemplate>,
    #[serde(default)]
    pub combination_patterns: Vec<PatternTemplate>,
}

impl DsplEntry {
    pub fn verified_pattern_count(&self) -> usize {
        self.place_patterns
            .iter()
            .chain(&self.topic_patterns)
            .chain(&self.combination_patterns)
            .filter(|p| p.verified)
            .count()
    }
}

/// Compact summary reported alongside readiness.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DsplSummary {
    pub entry_present: bool,
    pub verified_patterns: usize,
    pub total_patterns: usize,
}

/// The pattern library. Ships with a small built-in set; callers can layer
/// additional entries on top (e.g. from config).
#[derive(Debug, Clone, Default)]
pub struct Dspl {
    entries: HashMap<String, DsplEntry>,
}

impl Dspl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Library with the built-in entries.
    pub fn builtin() -> Self {
        let mut dspl = Self::new();
        dspl.insert(DsplEntry {
            host: "theguardian.com".to_string(),
            place_patterns: vec![PatternTemplate {
                template: "/world/{slug}".to_string(),
                kind: Some(PlaceKind::Country),
                score: 0.95,
                verified: true,
            }],
            topic_patterns: vec![PatternTemplate {
                template: "/{topic}".to_string(),
                kind: None,
                score: 0.8,
                verified: true,
            }],
            combination_patterns: vec![],
        });
        dspl.insert(DsplEntry {
            host: "bbc.co.uk".to_string(),
            place_patterns: vec![PatternTemplate {
                template: "/news/world-{slug}".to_string(),
                kind: Some(PlaceKind::Country),
                score: 0.9,
                verified: true,
            }],
            topic_patterns: vec![PatternTemplate {
                template: "/news/topics/{topic}".to_string(),
                kind: None,
                score: 0.8,
                verified: true,
            }],
            combination_patterns: vec![],
        });
        dspl
    }

    pub fn insert(&mut self, entry: DsplEntry) {
        self.entries.insert(entry.host.to_lowercase(), entry);
    }

    /// Entry for a host, matching registrable suffixes so "www.bbc.co.uk"
    /// finds "bbc.co.uk".
    pub fn lookup(&self, host: &str) -> Option<&DsplEntry> {
        let host = host.to_lowercase();
        if let Some(entry) = self.entries.get(&host) {
            return Some(entry);
        }
        let mut rest = host.as_str();
        while let Some(idx) = rest.find('.') {
            rest = &rest[idx + 1..];
            if let Some(entry) = self.entries.get(rest) {
                return Some(entry);
            }
        }
        None
    }

    pub fn summarize(&self, host: &str) -> DsplSummary {
        match self.lookup(host) {
            Some(entry) => DsplSummary {
                entry_present: true,
                verified_patterns: entry.verified_pattern_count(),
                total_patterns: entry.place_patterns.len()
                    + entry.topic_patterns.len()
                    + entry.combination_patterns.len(),
            },
            None => DsplSummary::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_matches_subdomains() {
        let dspl = Dspl::builtin();
        assert!(dspl.lookup("bbc.co.uk").is_some());
        assert!(dspl.lookup("www.bbc.co.uk").is_some());
        assert!(dspl.lookup("nothing.example").is_none());
    }

    #[test]
    fn test_expand_place() {
        let template = PatternTemplate {
            template: "/world/{slug}".to_string(),
            kind: Some(PlaceKind::Country),
            score: 0.9,
            verified: true,
        };
        let place = Place {
            kind: PlaceKind::Country,
            name: "United Kingdom".to_string(),
            code: Some("gb".to_string()),
            parent_code: None,
            importance: 1.0,
        };
        assert_eq!(template.expand_place(&place), "/world/united-kingdom");
    }

    #[test]
    fn test_summary_counts_verified() {
        let dspl = Dspl::builtin();
        let summary = dspl.summarize("theguardian.com");
        assert!(summary.entry_present);
        assert_eq!(summary.verified_patterns, 2);
    }
}
