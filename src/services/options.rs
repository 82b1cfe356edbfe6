//! Crawl options and the override merge.
//!
//! Options are a closed field set: overrides arriving as JSON (from the
//! CLI, HTTP body, or sequence config) parse into [`CrawlOverrides`] and
//! merge later-wins onto [`CrawlOptions`]. Unknown keys are rejected so a
//! typo never silently no-ops.

use serde::{Deserialize, Serialize};

use crate::models::PlaceKind;

use super::OrchestrationError;

/// Fully resolved options driving one pipeline run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlOptions {
    /// Write validated hubs; false previews the diff without writing.
    pub apply: bool,
    /// Places consulted per kind.
    pub place_limit: usize,
    /// Candidate URLs kept per place or topic.
    pub patterns_per_place: usize,
    /// Candidate worker pool size.
    pub concurrency: usize,
    /// Global cap on fetches for the run; the run aborts when reached.
    pub max_downloads: Option<u64>,
    /// Minimum delay between requests to one host.
    pub rate_limit_ms: u64,
    pub fetch_timeout_ms: u64,
    pub max_age_days: i64,
    pub refresh_404_days: i64,
    pub retry_4xx_days: i64,
    pub kinds: Vec<PlaceKind>,
    /// Explicit topic slugs; non-empty implies topic discovery.
    pub topics: Vec<String>,
    pub enable_topic_discovery: bool,
    pub enable_combination_discovery: bool,
    pub planner_verbosity: u8,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            apply: false,
            place_limit: 10,
            patterns_per_place: 3,
            concurrency: 2,
            max_downloads: None,
            rate_limit_ms: 500,
            fetch_timeout_ms: 15_000,
            max_age_days: 7,
            refresh_404_days: 180,
            retry_4xx_days: 7,
            kinds: vec![PlaceKind::Country],
            topics: Vec::new(),
            enable_topic_discovery: false,
            enable_combination_discovery: false,
            planner_verbosity: 0,
        }
    }
}

impl CrawlOptions {
    /// Apply an override set; present fields win.
    pub fn with_overrides(&self, overrides: &CrawlOverrides) -> Self {
        let mut options = self.clone();
        if let Some(v) = overrides.apply {
            options.apply = v;
        }
        if let Some(v) = overrides.place_limit {
            options.place_limit = v;
        }
        if let Some(v) = overrides.patterns_per_place {
            options.patterns_per_place = v;
        }
        if let Some(v) = overrides.concurrency {
            options.concurrency = v;
        }
        if let Some(v) = overrides.max_downloads {
            options.max_downloads = Some(v);
        }
        if let Some(v) = overrides.rate_limit_ms {
            options.rate_limit_ms = v;
        }
        if let Some(v) = overrides.fetch_timeout_ms {
            options.fetch_timeout_ms = v;
        }
        if let Some(v) = overrides.max_age_days {
            options.max_age_days = v;
        }
        if let Some(v) = overrides.refresh_404_days {
            options.refresh_404_days = v;
        }
        if let Some(v) = overrides.retry_4xx_days {
            options.retry_4xx_days = v;
        }
        if let Some(v) = &overrides.kinds {
            options.kinds = v.clone();
        }
        if let Some(v) = &overrides.topics {
            options.topics = v.clone();
        }
        if let Some(v) = overrides.enable_topic_discovery {
            options.enable_topic_discovery = v;
        }
        if let Some(v) = overrides.enable_combination_discovery {
            options.enable_combination_discovery = v;
        }
        if let Some(v) = overrides.planner_verbosity {
            options.planner_verbosity = v;
        }
        options
    }

    /// Enforce positive-integer semantics on the numeric knobs.
    pub fn validate(&self) -> Result<(), OrchestrationError> {
        fn positive(name: &str, value: usize) -> Result<(), OrchestrationError> {
            if value == 0 {
                return Err(OrchestrationError::InvalidInput(format!(
                    "{} must be a positive integer",
                    name
                )));
            }
            Ok(())
        }

        positive("placeLimit", self.place_limit)?;
        positive("patternsPerPlace", self.patterns_per_place)?;
        positive("concurrency", self.concurrency)?;
        positive("rateLimitMs", self.rate_limit_ms as usize)?;
        positive("fetchTimeoutMs", self.fetch_timeout_ms as usize)?;
        if self.max_downloads == Some(0) {
            return Err(OrchestrationError::InvalidInput(
                "maxDownloads must be a positive integer".to_string(),
            ));
        }
        for (name, days) in [
            ("maxAgeDays", self.max_age_days),
            ("refresh404Days", self.refresh_404_days),
            ("retry4xxDays", self.retry_4xx_days),
        ] {
            if days <= 0 {
                return Err(OrchestrationError::InvalidInput(format!(
                    "{} must be a positive integer",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Sparse override set; `None` leaves the base value untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CrawlOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patterns_per_place: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_downloads: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age_days: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_404_days: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_4xx_days: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<PlaceKind>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topics: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_topic_discovery: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_combination_discovery: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planner_verbosity: Option<u8>,
}

impl CrawlOverrides {
    /// Parse from an overrides JSON value. Null and missing objects are
    /// empty; null-valued keys are treated as absent; unknown keys fail.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, OrchestrationError> {
        match value {
            serde_json::Value::Null => Ok(Self::default()),
            serde_json::Value::Object(map) => {
                let mut cleaned = map.clone();
                cleaned.retain(|_, v| !v.is_null());
                serde_json::from_value(serde_json::Value::Object(cleaned))
                    .map_err(|e| OrchestrationError::InvalidInput(format!("overrides: {}", e)))
            }
            other => Err(OrchestrationError::InvalidInput(format!(
                "overrides must be an object, got {}",
                other
            ))),
        }
    }

    /// Later-wins field merge.
    pub fn merged(&self, later: &CrawlOverrides) -> Self {
        CrawlOverrides {
            apply: later.apply.or(self.apply),
            place_limit: later.place_limit.or(self.place_limit),
            patterns_per_place: later.patterns_per_place.or(self.patterns_per_place),
            concurrency: later.concurrency.or(self.concurrency),
            max_downloads: later.max_downloads.or(self.max_downloads),
            rate_limit_ms: later.rate_limit_ms.or(self.rate_limit_ms),
            fetch_timeout_ms: later.fetch_timeout_ms.or(self.fetch_timeout_ms),
            max_age_days: later.max_age_days.or(self.max_age_days),
            refresh_404_days: later.refresh_404_days.or(self.refresh_404_days),
            retry_4xx_days: later.retry_4xx_days.or(self.retry_4xx_days),
            kinds: later.kinds.clone().or_else(|| self.kinds.clone()),
            topics: later.topics.clone().or_else(|| self.topics.clone()),
            enable_topic_discovery: later
                .enable_topic_discovery
                .or(self.enable_topic_discovery),
            enable_combination_discovery: later
                .enable_combination_discovery
                .or(self.enable_combination_discovery),
            planner_verbosity: later.planner_verbosity.or(self.planner_verbosity),
        }
    }
}

/// Shallow later-wins merge of override JSON objects, used by the sequence
/// runner before the typed parse. Null values are dropped.
pub fn merge_override_values(layers: &[&serde_json::Value]) -> serde_json::Value {
    let mut merged = serde_json::Map::new();
    for layer in layers {
        if let serde_json::Value::Object(map) = layer {
            for (k, v) in map {
                if v.is_null() {
                    merged.remove(k);
                } else {
                    merged.insert(k.clone(), v.clone());
                }
            }
        }
    }
    serde_json::Value::Object(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_merge_later_wins() {
        let shared = CrawlOverrides {
            apply: Some(false),
            place_limit: Some(5),
            ..Default::default()
        };
        let step = CrawlOverrides {
            apply: Some(true),
            ..Default::default()
        };
        let merged = shared.merged(&step);
        assert_eq!(merged.apply, Some(true));
        assert_eq!(merged.place_limit, Some(5));
    }

    #[test]
    fn test_from_value_rejects_unknown_keys() {
        let value = serde_json::json!({"applu": true});
        assert!(matches!(
            CrawlOverrides::from_value(&value),
            Err(OrchestrationError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_from_value_drops_nulls() {
        let value = serde_json::json!({"apply": true, "placeLimit": null});
        let overrides = CrawlOverrides::from_value(&value).unwrap();
        assert_eq!(overrides.apply, Some(true));
        assert_eq!(overrides.place_limit, None);
    }

    #[test]
    fn test_validate_rejects_zero() {
        let options = CrawlOptions {
            patterns_per_place: 0,
            ..Default::default()
        };
        assert!(options.validate().is_err());

        let options = CrawlOptions {
            max_downloads: Some(0),
            ..Default::default()
        };
        assert!(options.validate().is_err());

        assert!(CrawlOptions::default().validate().is_ok());
    }

    #[test]
    fn test_merge_override_values_shallow() {
        let a = serde_json::json!({"apply": false, "placeLimit": 3});
        let b = serde_json::json!({"apply": true});
        let c = serde_json::json!({"placeLimit": null});
        let merged = merge_override_values(&[&a, &b, &c]);
        assert_eq!(merged, serde_json::json!({"apply": true}));
    }
}
