//! End-to-end pipeline scenarios over in-memory stores and a scripted
//! fetcher.

use std::sync::Arc;

use chrono::{Duration, Utc};

use hubscout::discovery::{Dspl, DsplAnalyzer, DsplEntry, HubValidator, PatternTemplate, PlaceProvider};
use hubscout::fetch::{ScriptedResponse, StubFetcher};
use hubscout::models::{
    CandidateStatus, Decision, Determination, FetchRecord, Place, PlaceKind, Topic,
};
use hubscout::repository::memory::{
    MemoryAuditLog, MemoryCandidateStore, MemoryDeterminationLog, MemoryEventStore, MemoryFetchLog,
    MemoryHubStore,
};
use hubscout::repository::{CandidateStore, DeterminationLog, HubStore};
use hubscout::services::{
    CrawlOptions, DomainProcessor, JobControl, ProcessRequest, ProcessorDeps, TelemetryBus,
};

/// Gazetteer stub with a fixed country list.
struct FixedPlaces(Vec<Place>);

impl PlaceProvider for FixedPlaces {
    fn places(&self, kind: PlaceKind, limit: usize) -> Vec<Place> {
        self.0
            .iter()
            .filter(|p| p.kind == kind)
            .take(limit)
            .cloned()
            .collect()
    }

    fn topics(&self, _limit: usize) -> Vec<Topic> {
        Vec::new()
    }
}

fn country(name: &str, code: &str, importance: f64) -> Place {
    Place {
        kind: PlaceKind::Country,
        name: name.to_string(),
        code: Some(code.to_string()),
        parent_code: None,
        importance,
    }
}

/// Pattern library entry for a.test with three scored place templates.
fn a_test_dspl() -> Dspl {
    let mut dspl = Dspl::new();
    dspl.insert(DsplEntry {
        host: "a.test".to_string(),
        place_patterns: vec![
            PatternTemplate {
                template: "/world/{slug}".to_string(),
                kind: Some(PlaceKind::Country),
                score: 0.9,
                verified: true,
            },
            PatternTemplate {
                template: "/news/{slug}".to_string(),
                kind: Some(PlaceKind::Country),
                score: 0.7,
                verified: false,
            },
            PatternTemplate {
                template: "/{code}".to_string(),
                kind: Some(PlaceKind::Country),
                score: 0.5,
                verified: false,
            },
        ],
        topic_patterns: Vec::new(),
        combination_patterns: Vec::new(),
    });
    dspl
}

struct Harness {
    fetch_log: Arc<MemoryFetchLog>,
    candidates: Arc<MemoryCandidateStore>,
    hubs: Arc<MemoryHubStore>,
    audit: Arc<MemoryAuditLog>,
    determinations: Arc<MemoryDeterminationLog>,
    fetcher: Arc<StubFetcher>,
    processor: DomainProcessor,
}

fn harness(dspl: Dspl, places: Vec<Place>) -> Harness {
    let fetch_log = Arc::new(MemoryFetchLog::new());
    let candidates = Arc::new(MemoryCandidateStore::new());
    let hubs = Arc::new(MemoryHubStore::new());
    let audit = Arc::new(MemoryAuditLog::new());
    let determinations = Arc::new(MemoryDeterminationLog::new());
    let fetcher = Arc::new(StubFetcher::new());

    let deps = Arc::new(ProcessorDeps {
        fetch_log: fetch_log.clone(),
        candidates: candidates.clone(),
        hubs: hubs.clone(),
        audit: audit.clone(),
        determinations: determinations.clone(),
        fetcher: fetcher.clone(),
        analyzers: vec![Arc::new(DsplAnalyzer::new(dspl.clone()))],
        places: Arc::new(FixedPlaces(places)),
        validator: HubValidator::default(),
        dspl,
    });
    let bus = Arc::new(TelemetryBus::new(Some(Arc::new(MemoryEventStore::new()))));
    let processor = DomainProcessor::new(deps, bus);

    Harness {
        fetch_log,
        candidates,
        hubs,
        audit,
        determinations,
        fetcher,
        processor,
    }
}

fn request(start_url: &str, options: CrawlOptions) -> ProcessRequest {
    ProcessRequest {
        start_url: start_url.to_string(),
        operation: "ensureCountryHubs".to_string(),
        options,
    }
}

fn options(apply: bool) -> CrawlOptions {
    CrawlOptions {
        apply,
        concurrency: 1,
        patterns_per_place: 3,
        rate_limit_ms: 1,
        ..CrawlOptions::default()
    }
}

fn seeded_record(url: &str, status: u16, age: Duration) -> FetchRecord {
    let fetched_at = Utc::now() - age;
    FetchRecord {
        url: url.to_string(),
        domain: "a.test".to_string(),
        http_status: status,
        http_success: (200..300).contains(&status),
        title: None,
        request_method: "GET".to_string(),
        request_started_at: fetched_at,
        fetched_at,
        bytes_downloaded: 100,
        content_type: Some("text/html".to_string()),
        content_length: Some(100),
        total_ms: 10,
        download_ms: 5,
        redirect_count: 0,
    }
}

/// Hub-looking body mentioning a place.
fn hub_body(slug: &str) -> String {
    let mut body = format!(
        "<html><head><title>{} news</title></head><body><h1>{}</h1><nav>\
         <a href=\"/\">Home</a><a href=\"/world\">World</a>\
         <a href=\"/sport\">Sport</a><a href=\"/business\">Business</a></nav>",
        slug, slug
    );
    for i in 0..12 {
        body.push_str(&format!(
            "<a href=\"/world/{}/2024/report-on-{}-part-{}\">report {}</a>",
            slug, slug, i, i
        ));
    }
    body.push_str("</body></html>");
    body
}

#[tokio::test]
async fn insufficient_data_early_exit() {
    // Unknown domain, empty stores, empty pattern library.
    let h = harness(Dspl::new(), vec![country("France", "fr", 0.9)]);

    let summary = h
        .processor
        .process(
            request("example.invalid", options(true)),
            JobControl::new(),
            "run-1",
        )
        .await
        .unwrap();

    assert_eq!(summary.determination, Some(Determination::InsufficientData));
    let readiness = summary.readiness.unwrap();
    assert!(readiness
        .recommendations
        .iter()
        .any(|r| r == "Run crawl-place-hubs for example.invalid"));

    // Nothing was fetched, one determination row appended.
    assert_eq!(h.fetcher.request_count(), 0);
    assert!(h.fetch_log.records().is_empty());
    assert_eq!(h.determinations.all().len(), 1);
    assert_eq!(
        h.determinations.latest("example.invalid").unwrap().unwrap().determination,
        Determination::InsufficientData
    );
}

#[tokio::test]
async fn cached_ok_skip() {
    let h = harness(a_test_dspl(), vec![country("France", "fr", 0.9)]);
    h.fetch_log.seed(seeded_record(
        "https://a.test/world/france",
        200,
        Duration::hours(1),
    ));

    let mut opts = options(true);
    opts.patterns_per_place = 1;
    let summary = h
        .processor
        .process(request("https://a.test/", opts), JobControl::new(), "run-1")
        .await
        .unwrap();

    assert_eq!(summary.cached, 1);
    assert_eq!(summary.fetched, 0);
    assert_eq!(h.fetcher.request_count(), 0);

    let candidate = h
        .candidates
        .get("a.test", "https://a.test/world/france")
        .unwrap()
        .unwrap();
    assert_eq!(candidate.status, CandidateStatus::CachedOk);

    // Cache skips never validate, so no audit entries exist.
    assert!(h.audit.all().is_empty());
}

#[tokio::test]
async fn known_404_skip() {
    let h = harness(a_test_dspl(), vec![country("France", "fr", 0.9)]);
    h.fetch_log.seed(seeded_record(
        "https://a.test/world/france",
        404,
        Duration::days(30),
    ));

    let mut opts = options(true);
    opts.patterns_per_place = 1;
    opts.refresh_404_days = 180;
    let summary = h
        .processor
        .process(request("https://a.test/", opts), JobControl::new(), "run-1")
        .await
        .unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.fetched, 0);
    let candidate = h
        .candidates
        .get("a.test", "https://a.test/world/france")
        .unwrap()
        .unwrap();
    assert_eq!(candidate.status, CandidateStatus::Cached404);
}

#[tokio::test]
async fn valid_hub_insert() {
    let h = harness(a_test_dspl(), vec![country("France", "fr", 0.9)]);
    h.fetcher.script(
        "https://a.test/world/france",
        ScriptedResponse::ok(&hub_body("france")),
    );

    let mut opts = options(true);
    opts.patterns_per_place = 1;
    let summary = h
        .processor
        .process(request("https://a.test/", opts), JobControl::new(), "run-1")
        .await
        .unwrap();

    assert_eq!(summary.inserted_hubs, 1);
    assert_eq!(summary.updated_hubs, 0);
    assert_eq!(summary.validation_succeeded, 1);
    assert_eq!(summary.diff_preview.inserted.len(), 1);
    assert_eq!(
        summary.diff_preview.inserted[0].url,
        "https://a.test/world/france"
    );

    let audit = h.audit.all();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].decision, Decision::Accepted);
    assert_eq!(audit[0].place_name.as_deref(), Some("France"));

    let hub = h
        .hubs
        .get("a.test", "https://a.test/world/france")
        .unwrap()
        .unwrap();
    assert_eq!(hub.place_slug.as_deref(), Some("france"));
    assert!(hub.article_links_count >= 12);
    assert!(hub.evidence["confidence"].as_f64().unwrap() > 0.5);

    let candidate = h
        .candidates
        .get("a.test", "https://a.test/world/france")
        .unwrap()
        .unwrap();
    assert_eq!(candidate.status, CandidateStatus::Validated);

    assert_eq!(summary.determination, Some(Determination::Processed));
}

#[tokio::test]
async fn hub_upsert_idempotent_across_runs() {
    let h = harness(a_test_dspl(), vec![country("France", "fr", 0.9)]);
    h.fetcher.script(
        "https://a.test/world/france",
        ScriptedResponse::ok(&hub_body("france")),
    );

    let mut opts = options(true);
    opts.patterns_per_place = 1;

    let first = h
        .processor
        .process(
            request("https://a.test/", opts.clone()),
            JobControl::new(),
            "run-1",
        )
        .await
        .unwrap();
    assert_eq!(first.inserted_hubs, 1);

    // Second run over the unchanged corpus: the fresh fetch row makes the
    // candidate a cache hit, so no hub writes happen.
    let second = h
        .processor
        .process(request("https://a.test/", opts), JobControl::new(), "run-2")
        .await
        .unwrap();
    assert_eq!(second.inserted_hubs, 0);
    assert_eq!(second.updated_hubs, 0);
    assert_eq!(second.cached, 1);
    assert_eq!(h.hubs.all().len(), 1);
}

#[tokio::test]
async fn rate_limit_soft_abort() {
    // Two countries, three predictions each. The second fetch returns 429.
    let h = harness(
        a_test_dspl(),
        vec![country("France", "fr", 0.9), country("Spain", "es", 0.8)],
    );
    h.fetcher.script(
        "https://a.test/world/france",
        ScriptedResponse::ok(&hub_body("france")),
    );
    h.fetcher
        .script("https://a.test/news/france", ScriptedResponse::status(429));

    let summary = h
        .processor
        .process(
            request("https://a.test/", options(true)),
            JobControl::new(),
            "run-1",
        )
        .await
        .unwrap();

    assert_eq!(summary.rate_limited, 1);
    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.determination, Some(Determination::RateLimited));
    assert_eq!(
        summary
            .decisions
            .iter()
            .filter(|d| d.kind == "rate-limited")
            .count(),
        1
    );

    // The remaining four candidates were never fetched.
    assert_eq!(h.fetcher.request_count(), 2);
    assert_eq!(h.fetch_log.records().len(), 2);
    assert!(h
        .fetch_log
        .records()
        .iter()
        .all(|r| r.url.contains("france")));

    // Enumerated URLs exceed processed ones only because of the abort.
    assert!(summary.total_urls >= summary.processed_candidates());
}

#[tokio::test]
async fn stop_request_aborts_cleanly() {
    let h = harness(
        a_test_dspl(),
        vec![country("France", "fr", 0.9), country("Spain", "es", 0.8)],
    );
    let control = JobControl::new();
    control.request_abort();

    let summary = h
        .processor
        .process(
            request("https://a.test/", options(true)),
            control,
            "run-1",
        )
        .await
        .unwrap();

    assert!(summary.aborted);
    assert!(summary.decisions.iter().any(|d| d.kind == "aborted"));
    assert_eq!(h.fetcher.request_count(), 0);
}

#[tokio::test]
async fn validation_failure_buckets_reasons() {
    let h = harness(a_test_dspl(), vec![country("France", "fr", 0.9)]);
    // A page with links but none of them articles
    h.fetcher.script(
        "https://a.test/world/france",
        ScriptedResponse::ok(
            "<html><head><title>france</title></head><body>\
             <a href=\"/one\">1</a><a href=\"/two\">2</a></body></html>",
        ),
    );

    let mut opts = options(true);
    opts.patterns_per_place = 1;
    let summary = h
        .processor
        .process(request("https://a.test/", opts), JobControl::new(), "run-1")
        .await
        .unwrap();

    assert_eq!(summary.validation_failed, 1);
    assert_eq!(summary.inserted_hubs, 0);
    assert_eq!(
        summary.validation_failure_reasons["too-few-article-links"],
        1
    );

    let audit = h.audit.all();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].decision, Decision::Rejected);

    let candidate = h
        .candidates
        .get("a.test", "https://a.test/world/france")
        .unwrap()
        .unwrap();
    assert_eq!(candidate.status, CandidateStatus::ValidationFailed);
}

#[tokio::test]
async fn fresh_404_stored_and_counted() {
    let h = harness(a_test_dspl(), vec![country("France", "fr", 0.9)]);
    // No scripts: the stub answers 404 for everything.

    let summary = h
        .processor
        .process(
            request("https://a.test/", options(true)),
            JobControl::new(),
            "run-1",
        )
        .await
        .unwrap();

    assert_eq!(summary.stored_404, 3);
    assert_eq!(summary.fetched, 3);
    assert_eq!(h.fetch_log.records().len(), 3);
    assert!(h.fetch_log.records().iter().all(|r| r.http_status == 404));
    assert_eq!(summary.determination, Some(Determination::Processed));
}
