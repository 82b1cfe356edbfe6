//! Predictor analyzers.
//!
//! Analyzers enumerate candidate hub URLs for a domain and a place or
//! topic. They are pure with respect to their inputs plus the static
//! pattern library, and may return zero predictions. Returned URLs may be
//! absolute or domain-relative; the pipeline applies the scheme.

use crate::models::{Domain, Place, PlaceKind, Prediction, Topic};

use super::dspl::Dspl;

/// Produces scored URL predictions for hub discovery.
pub trait HubAnalyzer: Send + Sync {
    fn name(&self) -> &'static str;
    fn supports(&self, kind: PlaceKind) -> bool;
    fn predict_place_hub_urls(&self, domain: &Domain, place: &Place) -> Vec<Prediction>;
    fn predict_topic_hub_urls(&self, domain: &Domain, topic: &Topic) -> Vec<Prediction>;
    fn predict_combination_hub_urls(
        &self,
        domain: &Domain,
        place: &Place,
        topic: &Topic,
    ) -> Vec<Prediction>;
}

/// Analyzer backed by the domain-specific pattern library. Emits nothing
/// for hosts without an entry.
pub struct DsplAnalyzer {
    dspl: Dspl,
}

impl DsplAnalyzer {
    pub fn new(dspl: Dspl) -> Self {
        Self { dspl }
    }
}

impl HubAnalyzer for DsplAnalyzer {
    fn name(&self) -> &'static str {
        "dspl"
    }

    fn supports(&self, _kind: PlaceKind) -> bool {
        true
    }

    fn predict_place_hub_urls(&self, domain: &Domain, place: &Place) -> Vec<Prediction> {
        let entry = match self.dspl.lookup(&domain.host) {
            Some(e) => e,
            None => return Vec::new(),
        };
        entry
            .place_patterns
            .iter()
            .filter(|p| p.kind.is_none() || p.kind == Some(place.kind))
            .map(|p| Prediction {
                url: p.expand_place(place),
                analyzer: "dspl".to_string(),
                strategy: "library-pattern".to_string(),
                pattern: Some(p.template.clone()),
                score: Some(p.score),
                confidence: p.verified.then_some(0.9),
            })
            .collect()
    }

    fn predict_topic_hub_urls(&self, domain: &Domain, topic: &Topic) -> Vec<Prediction> {
        let entry = match self.dspl.lookup(&domain.host) {
            Some(e) => e,
            None => return Vec::new(),
        };
        entry
            .topic_patterns
            .iter()
            .map(|p| Prediction {
                url: p.expand_topic(topic),
                analyzer: "dspl".to_string(),
                strategy: "library-pattern".to_string(),
                pattern: Some(p.template.clone()),
                score: Some(p.score),
                confidence: p.verified.then_some(0.9),
            })
            .collect()
    }

    fn predict_combination_hub_urls(
        &self,
        domain: &Domain,
        place: &Place,
        topic: &Topic,
    ) -> Vec<Prediction> {
        let entry = match self.dspl.lookup(&domain.host) {
            Some(e) => e,
            None => return Vec::new(),
        };
        entry
            .combination_patterns
            .iter()
            .map(|p| Prediction {
                url: p.expand_combination(place, topic),
                analyzer: "dspl".to_string(),
                strategy: "library-pattern".to_string(),
                pattern: Some(p.template.clone()),
                score: Some(p.score),
                confidence: p.verified.then_some(0.9),
            })
            .collect()
    }
}

/// Analyzer encoding the URL conventions common across news sites.
pub struct ConventionAnalyzer;

const COUNTRY_TEMPLATES: &[(&str, f64)] = &[
    ("/world/{slug}", 0.9),
    ("/news/{slug}", 0.7),
    ("/{code}", 0.5),
];

const REGION_TEMPLATES: &[(&str, f64)] = &[("/news/{slug}", 0.6), ("/{slug}", 0.4)];

const CITY_TEMPLATES: &[(&str, f64)] = &[("/local/{slug}", 0.6), ("/news/{slug}", 0.5)];

const TOPIC_TEMPLATES: &[(&str, f64)] = &[
    ("/topic/{topic}", 0.8),
    ("/tag/{topic}", 0.7),
    ("/{topic}", 0.5),
];

const COMBINATION_TEMPLATES: &[(&str, f64)] = &[
    ("/world/{slug}/{topic}", 0.6),
    ("/{slug}/{topic}", 0.4),
];

impl ConventionAnalyzer {
    fn expand(template: &str, place: Option<&Place>, topic: Option<&Topic>) -> String {
        let mut url = template.to_string();
        if let Some(place) = place {
            url = url
                .replace("{slug}", &place.slug())
                .replace("{code}", place.code.as_deref().unwrap_or(&place.slug()));
        }
        if let Some(topic) = topic {
            url = url.replace("{topic}", &topic.slug);
        }
        url
    }

    fn predictions(
        templates: &[(&str, f64)],
        strategy: &str,
        place: Option<&Place>,
        topic: Option<&Topic>,
    ) -> Vec<Prediction> {
        templates
            .iter()
            .map(|(template, score)| Prediction {
                url: Self::expand(template, place, topic),
                analyzer: "convention".to_string(),
                strategy: strategy.to_string(),
                pattern: Some(template.to_string()),
                score: Some(*score),
                confidence: None,
            })
            .collect()
    }
}

impl HubAnalyzer for ConventionAnalyzer {
    fn name(&self) -> &'static str {
        "convention"
    }

    fn supports(&self, _kind: PlaceKind) -> bool {
        true
    }

    fn predict_place_hub_urls(&self, _domain: &Domain, place: &Place) -> Vec<Prediction> {
        let templates = match place.kind {
            PlaceKind::Country => COUNTRY_TEMPLATES,
            PlaceKind::Region => REGION_TEMPLATES,
            PlaceKind::City => CITY_TEMPLATES,
        };
        Self::predictions(templates, "url-convention", Some(place), None)
    }

    fn predict_topic_hub_urls(&self, _domain: &Domain, topic: &Topic) -> Vec<Prediction> {
        Self::predictions(TOPIC_TEMPLATES, "url-convention", None, Some(topic))
    }

    fn predict_combination_hub_urls(
        &self,
        _domain: &Domain,
        place: &Place,
        topic: &Topic,
    ) -> Vec<Prediction> {
        Self::predictions(
            COMBINATION_TEMPLATES,
            "url-convention",
            Some(place),
            Some(topic),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn france() -> Place {
        Place {
            kind: PlaceKind::Country,
            name: "France".to_string(),
            code: Some("fr".to_string()),
            parent_code: None,
            importance: 0.95,
        }
    }

    #[test]
    fn test_convention_country_urls() {
        let domain = Domain::normalize("a.test").unwrap();
        let predictions = ConventionAnalyzer.predict_place_hub_urls(&domain, &france());
        let urls: Vec<&str> = predictions.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(urls, vec!["/world/france", "/news/france", "/fr"]);
        assert!(predictions[0].score > predictions[2].score);
    }

    #[test]
    fn test_dspl_analyzer_silent_without_entry() {
        let domain = Domain::normalize("unknown.example").unwrap();
        let analyzer = DsplAnalyzer::new(Dspl::builtin());
        assert!(analyzer
            .predict_place_hub_urls(&domain, &france())
            .is_empty());
    }

    #[test]
    fn test_dspl_analyzer_uses_library_patterns() {
        let domain = Domain::normalize("www.theguardian.com").unwrap();
        let analyzer = DsplAnalyzer::new(Dspl::builtin());
        let predictions = analyzer.predict_place_hub_urls(&domain, &france());
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].url, "/world/france");
        assert_eq!(predictions[0].confidence, Some(0.9));
    }

    #[test]
    fn test_combination_urls_carry_both_slugs() {
        let domain = Domain::normalize("a.test").unwrap();
        let topic = Topic::from_slug("business");
        let predictions =
            ConventionAnalyzer.predict_combination_hub_urls(&domain, &france(), &topic);
        assert_eq!(predictions[0].url, "/world/france/business");
    }
}
