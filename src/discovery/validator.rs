//! Hub validation.
//!
//! Classifies a fetched HTML body as a valid or invalid hub for an
//! expected place, topic, or place-topic pair. The validator is the sole
//! arbiter: it is deterministic for a given body and always produces a
//! reason string on rejection. No I/O happens here.

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

use crate::models::{Domain, Place, Topic};
use crate::utils::html::is_article_path;

/// Classification result with the metrics that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub confidence: f64,
    pub nav_link_count: u32,
    pub article_link_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Expected-token occurrences across title, headline, and link paths.
    pub token_hits: u32,
}

impl ValidationOutcome {
    fn rejected(reason: &str, metrics: PageMetrics) -> Self {
        Self {
            is_valid: false,
            reason: Some(reason.to_string()),
            confidence: metrics.confidence(),
            nav_link_count: metrics.nav_links,
            article_link_count: metrics.article_links,
            title: metrics.title,
            token_hits: metrics.token_hits,
        }
    }

    /// Metrics payload persisted with audit entries and candidates.
    pub fn metrics_json(&self) -> serde_json::Value {
        serde_json::json!({
            "isValid": self.is_valid,
            "reason": self.reason,
            "confidence": self.confidence,
            "navLinkCount": self.nav_link_count,
            "articleLinkCount": self.article_link_count,
            "title": self.title,
            "tokenHits": self.token_hits,
        })
    }
}

#[derive(Debug, Default, Clone)]
struct PageMetrics {
    nav_links: u32,
    article_links: u32,
    token_hits: u32,
    title: Option<String>,
    title_has_token: bool,
}

impl PageMetrics {
    /// Deterministic confidence in [0, 1]: article volume carries half the
    /// weight, nav structure a fifth, token placement the rest.
    fn confidence(&self) -> f64 {
        let article_score = (self.article_links as f64 / 20.0).min(1.0) * 0.5;
        let nav_score = (self.nav_links as f64 / 10.0).min(1.0) * 0.2;
        let token_score = if self.title_has_token {
            0.3
        } else if self.token_hits > 0 {
            0.15
        } else {
            0.0
        };
        article_score + nav_score + token_score
    }
}

/// Heuristic hub classifier with tunable thresholds.
#[derive(Debug, Clone)]
pub struct HubValidator {
    pub min_nav_links: u32,
    pub min_article_links: u32,
    pub min_confidence: f64,
}

impl Default for HubValidator {
    fn default() -> Self {
        Self {
            min_nav_links: 3,
            min_article_links: 5,
            min_confidence: 0.5,
        }
    }
}

impl HubValidator {
    /// Validate a body as a hub for a place.
    pub fn validate_place_hub(
        &self,
        body: &str,
        expected: &Place,
        domain: &Domain,
    ) -> ValidationOutcome {
        let tokens = place_tokens(expected);
        self.validate(body, &tokens, domain, "place")
    }

    /// Validate a body as a hub for a topic.
    pub fn validate_topic_hub(
        &self,
        body: &str,
        expected: &Topic,
        domain: &Domain,
    ) -> ValidationOutcome {
        let tokens = topic_tokens(expected);
        self.validate(body, &tokens, domain, "topic")
    }

    /// Validate a body as a hub for a place-topic combination. Both token
    /// sets must be present.
    pub fn validate_place_topic_hub(
        &self,
        body: &str,
        place: &Place,
        topic: &Topic,
        domain: &Domain,
    ) -> ValidationOutcome {
        let place_outcome = self.validate_place_hub(body, place, domain);
        if !place_outcome.is_valid {
            return place_outcome;
        }
        let topic_set = topic_tokens(topic);
        let metrics = extract_metrics(body, &topic_set);
        if metrics.token_hits == 0 {
            return ValidationOutcome::rejected("topic-token-missing", metrics);
        }
        place_outcome
    }

    fn validate(
        &self,
        body: &str,
        tokens: &[String],
        _domain: &Domain,
        subject: &str,
    ) -> ValidationOutcome {
        if body.trim().is_empty() {
            return ValidationOutcome::rejected("empty-body", PageMetrics::default());
        }

        let metrics = extract_metrics(body, tokens);

        if metrics.nav_links + metrics.article_links == 0 {
            return ValidationOutcome::rejected("no-links", metrics);
        }
        if metrics.article_links < self.min_article_links {
            return ValidationOutcome::rejected("too-few-article-links", metrics);
        }
        if metrics.nav_links < self.min_nav_links {
            return ValidationOutcome::rejected("too-few-nav-links", metrics);
        }
        if metrics.token_hits == 0 {
            let reason = match subject {
                "topic" => "topic-token-missing",
                _ => "place-token-missing",
            };
            return ValidationOutcome::rejected(reason, metrics);
        }

        let confidence = metrics.confidence();
        if confidence < self.min_confidence {
            return ValidationOutcome::rejected("low-confidence", metrics);
        }

        ValidationOutcome {
            is_valid: true,
            reason: None,
            confidence,
            nav_link_count: metrics.nav_links,
            article_link_count: metrics.article_links,
            title: metrics.title,
            token_hits: metrics.token_hits,
        }
    }
}

fn place_tokens(place: &Place) -> Vec<String> {
    let mut tokens = vec![place.name.to_lowercase(), place.slug()];
    if let Some(code) = &place.code {
        tokens.push(code.to_lowercase());
    }
    tokens
}

fn topic_tokens(topic: &Topic) -> Vec<String> {
    vec![topic.slug.to_lowercase(), topic.label.to_lowercase()]
}

fn extract_metrics(body: &str, tokens: &[String]) -> PageMetrics {
    let document = Html::parse_document(body);
    let mut metrics = PageMetrics::default();

    let title_selector = Selector::parse("title").expect("static selector");
    if let Some(title_el) = document.select(&title_selector).next() {
        let title: String = title_el.text().collect::<String>().trim().to_string();
        if !title.is_empty() {
            let lower = title.to_lowercase();
            metrics.title_has_token = tokens.iter().any(|t| lower.contains(t.as_str()));
            if metrics.title_has_token {
                metrics.token_hits += 1;
            }
            metrics.title = Some(title);
        }
    }

    let h1_selector = Selector::parse("h1").expect("static selector");
    if let Some(h1) = document.select(&h1_selector).next() {
        let text = h1.text().collect::<String>().to_lowercase();
        if tokens.iter().any(|t| text.contains(t.as_str())) {
            metrics.token_hits += 1;
        }
    }

    let link_selector = Selector::parse("a[href]").expect("static selector");
    for link in document.select(&link_selector) {
        let href = match link.value().attr("href") {
            Some(h) => h,
            None => continue,
        };
        let path = href
            .strip_prefix("http://")
            .or_else(|| href.strip_prefix("https://"))
            .and_then(|rest| rest.find('/').map(|i| &rest[i..]))
            .unwrap_or(href);

        if is_article_path(path) {
            metrics.article_links += 1;
        } else {
            metrics.nav_links += 1;
        }

        let lower = path.to_lowercase();
        if tokens.iter().any(|t| lower.contains(t.as_str())) {
            metrics.token_hits += 1;
        }
    }

    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlaceKind;

    fn france() -> Place {
        Place {
            kind: PlaceKind::Country,
            name: "France".to_string(),
            code: Some("fr".to_string()),
            parent_code: None,
            importance: 0.95,
        }
    }

    fn domain() -> Domain {
        Domain::normalize("a.test").unwrap()
    }

    /// A plausible country hub: nav links plus dated article links
    /// mentioning the place.
    fn hub_body(place_slug: &str, articles: usize) -> String {
        let mut body = format!(
            "<html><head><title>{} news</title></head><body><h1>{}</h1><nav>\
             <a href=\"/\">Home</a><a href=\"/world\">World</a>\
             <a href=\"/sport\">Sport</a><a href=\"/business\">Business</a></nav>",
            place_slug, place_slug
        );
        for i in 0..articles {
            body.push_str(&format!(
                "<a href=\"/world/{}/2024/story-about-{}-number-{}\">story {}</a>",
                place_slug, place_slug, i, i
            ));
        }
        body.push_str("</body></html>");
        body
    }

    #[test]
    fn test_valid_place_hub() {
        let outcome =
            HubValidator::default().validate_place_hub(&hub_body("france", 12), &france(), &domain());
        assert!(outcome.is_valid, "reason: {:?}", outcome.reason);
        assert!(outcome.confidence > 0.5);
        assert!(outcome.article_link_count >= 12);
        assert!(outcome.reason.is_none());
    }

    #[test]
    fn test_empty_body_rejected() {
        let outcome = HubValidator::default().validate_place_hub("", &france(), &domain());
        assert!(!outcome.is_valid);
        assert_eq!(outcome.reason.as_deref(), Some("empty-body"));
    }

    #[test]
    fn test_too_few_articles_rejected() {
        let outcome =
            HubValidator::default().validate_place_hub(&hub_body("france", 2), &france(), &domain());
        assert!(!outcome.is_valid);
        assert_eq!(outcome.reason.as_deref(), Some("too-few-article-links"));
    }

    #[test]
    fn test_wrong_place_rejected() {
        let outcome =
            HubValidator::default().validate_place_hub(&hub_body("spain", 12), &france(), &domain());
        assert!(!outcome.is_valid);
        assert_eq!(outcome.reason.as_deref(), Some("place-token-missing"));
    }

    #[test]
    fn test_deterministic_for_same_body() {
        let body = hub_body("france", 8);
        let validator = HubValidator::default();
        let a = validator.validate_place_hub(&body, &france(), &domain());
        let b = validator.validate_place_hub(&body, &france(), &domain());
        assert_eq!(a.confidence, b.confidence);
        assert_eq!(a.is_valid, b.is_valid);
        assert_eq!(a.article_link_count, b.article_link_count);
    }

    #[test]
    fn test_topic_hub() {
        let topic = Topic::from_slug("business");
        let body = hub_body("business", 10);
        let outcome = HubValidator::default().validate_topic_hub(&body, &topic, &domain());
        assert!(outcome.is_valid, "reason: {:?}", outcome.reason);
    }

    #[test]
    fn test_combination_requires_both_tokens() {
        let topic = Topic::from_slug("cricket");
        // Valid France hub with no cricket mention anywhere
        let body = hub_body("france", 10);
        let outcome =
            HubValidator::default().validate_place_topic_hub(&body, &france(), &topic, &domain());
        assert!(!outcome.is_valid);
        assert_eq!(outcome.reason.as_deref(), Some("topic-token-missing"));
    }

}
