//! Named crawl operations.
//!
//! A static table mapping an operation name to one pipeline invocation
//! with fixed defaults. The facade resolves a name here, merges overrides
//! onto the operation's defaults, and hands the request to the processor.

use serde::Serialize;

use crate::models::PlaceKind;

use super::summary::RunSummary;
use super::{CrawlOptions, CrawlOverrides};

/// How an operation drives the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMode {
    /// The full hub-discovery pipeline.
    HubDiscovery,
    /// Seed-page article crawl with fetch recording only.
    ArticleCrawl,
}

/// One entry in the registry.
pub struct OperationSpec {
    pub name: &'static str,
    pub summary: &'static str,
    pub mode: OperationMode,
    /// Operation-level defaults layered onto the base options before
    /// caller overrides.
    pub defaults: CrawlOverrides,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

/// Terminal result of one operation run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    pub status: ResultStatus,
    pub operation: String,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<RunSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

/// The static operation table.
pub struct OperationsRegistry {
    table: Vec<OperationSpec>,
}

impl OperationsRegistry {
    /// The standard operation set.
    pub fn standard() -> Self {
        let table = vec![
            OperationSpec {
                name: "basicArticleCrawl",
                summary: "Fetch the seed page and record same-host article links",
                mode: OperationMode::ArticleCrawl,
                defaults: CrawlOverrides {
                    max_downloads: Some(20),
                    ..Default::default()
                },
            },
            OperationSpec {
                name: "ensureCountryHubs",
                summary: "Discover and persist country hubs for a domain",
                mode: OperationMode::HubDiscovery,
                defaults: CrawlOverrides {
                    apply: Some(true),
                    kinds: Some(vec![PlaceKind::Country]),
                    ..Default::default()
                },
            },
            OperationSpec {
                name: "exploreCountryHubs",
                summary: "Wide dry-run sweep of country hub candidates",
                mode: OperationMode::HubDiscovery,
                defaults: CrawlOverrides {
                    apply: Some(false),
                    kinds: Some(vec![PlaceKind::Country]),
                    place_limit: Some(20),
                    patterns_per_place: Some(5),
                    ..Default::default()
                },
            },
            OperationSpec {
                name: "discoverRegionHubs",
                summary: "Discover and persist region hubs for a domain",
                mode: OperationMode::HubDiscovery,
                defaults: CrawlOverrides {
                    apply: Some(true),
                    kinds: Some(vec![PlaceKind::Region]),
                    ..Default::default()
                },
            },
            OperationSpec {
                name: "discoverCityHubs",
                summary: "Discover and persist city hubs for a domain",
                mode: OperationMode::HubDiscovery,
                defaults: CrawlOverrides {
                    apply: Some(true),
                    kinds: Some(vec![PlaceKind::City]),
                    ..Default::default()
                },
            },
            OperationSpec {
                name: "discoverTopicHubs",
                summary: "Discover and persist topic hubs for a domain",
                mode: OperationMode::HubDiscovery,
                defaults: CrawlOverrides {
                    apply: Some(true),
                    kinds: Some(Vec::new()),
                    enable_topic_discovery: Some(true),
                    ..Default::default()
                },
            },
            OperationSpec {
                name: "explorePlaceTopicHubs",
                summary: "Dry-run sweep of place-topic combination hubs",
                mode: OperationMode::HubDiscovery,
                defaults: CrawlOverrides {
                    apply: Some(false),
                    kinds: Some(vec![PlaceKind::Country]),
                    enable_combination_discovery: Some(true),
                    ..Default::default()
                },
            },
        ];
        Self { table }
    }

    pub fn get(&self, name: &str) -> Option<&OperationSpec> {
        self.table.iter().find(|spec| spec.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OperationSpec> {
        self.table.iter()
    }

    /// Effective default options for an operation, for the availability
    /// listing.
    pub fn default_options(&self, spec: &OperationSpec, base: &CrawlOptions) -> CrawlOptions {
        base.with_overrides(&spec.defaults)
    }
}
