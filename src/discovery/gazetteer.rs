//! Place and topic data provider.
//!
//! The gazetteer is an opaque source of places and topics; the built-in
//! static set covers the major countries and a starter topic list. A
//! richer provider can be injected without touching the pipeline.

use crate::models::{Place, PlaceKind, Topic};

/// Supplies the places and topics a discovery run iterates.
pub trait PlaceProvider: Send + Sync {
    /// Places of a kind, ordered by importance descending, up to `limit`.
    fn places(&self, kind: PlaceKind, limit: usize) -> Vec<Place>;
    /// Topic list, up to `limit`.
    fn topics(&self, limit: usize) -> Vec<Topic>;
}

/// Built-in static gazetteer.
pub struct StaticGazetteer;

const COUNTRIES: &[(&str, &str, f64)] = &[
    ("United States", "us", 1.0),
    ("United Kingdom", "gb", 0.98),
    ("France", "fr", 0.95),
    ("Germany", "de", 0.95),
    ("China", "cn", 0.94),
    ("India", "in", 0.93),
    ("Japan", "jp", 0.92),
    ("Russia", "ru", 0.92),
    ("Brazil", "br", 0.9),
    ("Canada", "ca", 0.9),
    ("Australia", "au", 0.89),
    ("Italy", "it", 0.88),
    ("Spain", "es", 0.88),
    ("Mexico", "mx", 0.85),
    ("Ukraine", "ua", 0.85),
    ("Nigeria", "ng", 0.82),
    ("South Africa", "za", 0.8),
    ("Egypt", "eg", 0.78),
    ("Argentina", "ar", 0.77),
    ("Poland", "pl", 0.75),
];

const REGIONS: &[(&str, &str, &str, f64)] = &[
    ("California", "us-ca", "us", 0.9),
    ("Texas", "us-tx", "us", 0.85),
    ("Scotland", "gb-sct", "gb", 0.85),
    ("Wales", "gb-wls", "gb", 0.8),
    ("Bavaria", "de-by", "de", 0.75),
    ("Île-de-France", "fr-idf", "fr", 0.75),
    ("Ontario", "ca-on", "ca", 0.72),
    ("New South Wales", "au-nsw", "au", 0.7),
];

const CITIES: &[(&str, &str, &str, f64)] = &[
    ("London", "london", "gb", 0.95),
    ("New York", "new-york", "us", 0.95),
    ("Paris", "paris", "fr", 0.9),
    ("Berlin", "berlin", "de", 0.85),
    ("Tokyo", "tokyo", "jp", 0.85),
    ("Sydney", "sydney", "au", 0.8),
    ("Toronto", "toronto", "ca", 0.78),
    ("Mumbai", "mumbai", "in", 0.78),
];

const TOPICS: &[(&str, &str)] = &[
    ("politics", "Politics"),
    ("business", "Business"),
    ("technology", "Technology"),
    ("science", "Science"),
    ("health", "Health"),
    ("sport", "Sport"),
    ("culture", "Culture"),
    ("climate", "Climate"),
];

impl PlaceProvider for StaticGazetteer {
    fn places(&self, kind: PlaceKind, limit: usize) -> Vec<Place> {
        let mut places: Vec<Place> = match kind {
            PlaceKind::Country => COUNTRIES
                .iter()
                .map(|(name, code, importance)| Place {
                    kind,
                    name: name.to_string(),
                    code: Some(code.to_string()),
                    parent_code: None,
                    importance: *importance,
                })
                .collect(),
            PlaceKind::Region => REGIONS
                .iter()
                .map(|(name, code, parent, importance)| Place {
                    kind,
                    name: name.to_string(),
                    code: Some(code.to_string()),
                    parent_code: Some(parent.to_string()),
                    importance: *importance,
                })
                .collect(),
            PlaceKind::City => CITIES
                .iter()
                .map(|(name, code, parent, importance)| Place {
                    kind,
                    name: name.to_string(),
                    code: Some(code.to_string()),
                    parent_code: Some(parent.to_string()),
                    importance: *importance,
                })
                .collect(),
        };
        places.sort_by(|a, b| {
            b.importance
                .partial_cmp(&a.importance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        places.truncate(limit);
        places
    }

    fn topics(&self, limit: usize) -> Vec<Topic> {
        TOPICS
            .iter()
            .take(limit)
            .map(|(slug, label)| Topic {
                slug: slug.to_string(),
                label: label.to_string(),
                category: None,
                language: None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_countries_sorted_by_importance() {
        let places = StaticGazetteer.places(PlaceKind::Country, 3);
        assert_eq!(places.len(), 3);
        assert!(places[0].importance >= places[1].importance);
        assert!(places[1].importance >= places[2].importance);
        assert_eq!(places[0].name, "United States");
    }

    #[test]
    fn test_regions_have_parents() {
        let places = StaticGazetteer.places(PlaceKind::Region, 100);
        assert!(places.iter().all(|p| p.parent_code.is_some()));
    }

    #[test]
    fn test_topic_limit() {
        assert_eq!(StaticGazetteer.topics(2).len(), 2);
    }
}
