//! Facade-level flows: operations, sequences, and file-based sequence
//! configs over in-memory stores.

use std::collections::HashMap;
use std::sync::Arc;

use hubscout::discovery::{ConventionAnalyzer, Dspl, DsplAnalyzer, HubValidator, StaticGazetteer};
use hubscout::fetch::{ScriptedResponse, StubFetcher};
use hubscout::repository::memory::{
    MemoryAuditLog, MemoryCandidateStore, MemoryDeterminationLog, MemoryEventStore, MemoryFetchLog,
    MemoryHubStore,
};
use hubscout::services::{
    run_sequence, CrawlOptions, CrawlService, JobRegistry, NullPlaybook, ProcessorDeps,
    ResultStatus, RunConfigInput, RunPresetInput, SequenceConfig, SequenceMetadata,
    SequenceRunInput, SequenceStatus, SequenceStepConfig, StepStatus, TelemetryBus,
};

struct Env {
    fetch_log: Arc<MemoryFetchLog>,
    events: Arc<MemoryEventStore>,
    fetcher: Arc<StubFetcher>,
    service: Arc<CrawlService>,
}

fn env() -> Env {
    env_with_config_dir(std::path::PathBuf::from("config"))
}

fn env_with_config_dir(config_dir: std::path::PathBuf) -> Env {
    let fetch_log = Arc::new(MemoryFetchLog::new());
    let events = Arc::new(MemoryEventStore::new());
    let fetcher = Arc::new(StubFetcher::new());

    let dspl = Dspl::builtin();
    let deps = Arc::new(ProcessorDeps {
        fetch_log: fetch_log.clone(),
        candidates: Arc::new(MemoryCandidateStore::new()),
        hubs: Arc::new(MemoryHubStore::new()),
        audit: Arc::new(MemoryAuditLog::new()),
        determinations: Arc::new(MemoryDeterminationLog::new()),
        fetcher: fetcher.clone(),
        analyzers: vec![
            Arc::new(DsplAnalyzer::new(dspl.clone())),
            Arc::new(ConventionAnalyzer),
        ],
        places: Arc::new(StaticGazetteer),
        validator: HubValidator::default(),
        dspl,
    });
    let bus = Arc::new(TelemetryBus::new(Some(events.clone())));
    let service = Arc::new(CrawlService::new(
        deps,
        bus,
        Arc::new(JobRegistry::new(false)),
        CrawlOptions {
            rate_limit_ms: 1,
            ..CrawlOptions::default()
        },
        config_dir,
        Arc::new(NullPlaybook),
        serde_json::json!({"featureFlags": {"topics": true}}),
    ));

    Env {
        fetch_log,
        events,
        fetcher,
        service,
    }
}

fn seed_page() -> &'static str {
    r#"<html><head><title>a.test front</title></head><body>
    <a href="/news/big-story-about-things">one</a>
    <a href="/news/another-long-story-here">two</a>
    <a href="/about">about</a>
    </body></html>"#
}

#[tokio::test]
async fn availability_lists_operations_and_presets() {
    let env = env();
    let availability = env.service.availability();

    let names: Vec<&str> = availability
        .operations
        .iter()
        .map(|o| o.name.as_str())
        .collect();
    assert!(names.contains(&"basicArticleCrawl"));
    assert!(names.contains(&"ensureCountryHubs"));
    assert!(names.contains(&"explorePlaceTopicHubs"));

    assert!(!availability.sequence_presets.is_empty());
    let preset = &availability.sequence_presets[0];
    assert!(preset.step_count >= 1);
}

#[tokio::test]
async fn basic_article_crawl_records_fetches() {
    let env = env();
    env.fetcher
        .script("https://a.test/", ScriptedResponse::ok(seed_page()));
    env.fetcher.script(
        "https://a.test/news/big-story-about-things",
        ScriptedResponse::ok("<html><body>story</body></html>"),
    );
    env.fetcher.script(
        "https://a.test/news/another-long-story-here",
        ScriptedResponse::ok("<html><body>story</body></html>"),
    );

    let result = env
        .service
        .run_operation("basicArticleCrawl", "https://a.test/", serde_json::json!({}))
        .await
        .unwrap();

    assert_eq!(result.status, ResultStatus::Ok);
    let summary = result.stats.unwrap();
    // Seed plus the two article links; /about is navigation
    assert_eq!(summary.fetched, 3);
    assert_eq!(summary.total_urls, 3);
    assert_eq!(env.fetch_log.records().len(), 3);
}

#[tokio::test]
async fn unknown_operation_is_an_error() {
    let env = env();
    let result = env
        .service
        .run_operation("doTheThing", "https://a.test/", serde_json::json!({}))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn preset_sequence_runs_and_emits_step_events() {
    let env = env();
    env.fetcher
        .script("https://a.test/", ScriptedResponse::ok(seed_page()));

    let result = env
        .service
        .run_sequence_preset(RunPresetInput {
            sequence_name: "articlePulse".to_string(),
            start_url: Some("https://a.test/".to_string()),
            shared_overrides: serde_json::json!({}),
            step_overrides: HashMap::new(),
            continue_on_error: None,
            context: serde_json::json!({}),
        })
        .await
        .unwrap();

    assert_eq!(result.status, SequenceStatus::Ok);
    assert_eq!(result.steps.len(), 1);
    assert_eq!(result.steps[0].sequence_index, 0);

    // Step start/success events reached the persistent store
    let step_events: Vec<_> = env
        .events
        .all()
        .into_iter()
        .filter(|e| e.task_type == "sequence" && e.event_type == "step")
        .collect();
    assert!(step_events.len() >= 2);
    assert_eq!(step_events[0].data["phase"], "start");
}

fn two_step_config() -> SequenceConfig {
    SequenceConfig {
        name: "ab".to_string(),
        host: None,
        start_url: Some("https://a.test/".to_string()),
        shared_overrides: serde_json::json!({}),
        continue_on_error: false,
        steps: vec![
            SequenceStepConfig {
                id: "a".to_string(),
                operation: "basicArticleCrawl".to_string(),
                label: None,
                start_url: None,
                overrides: serde_json::json!({}),
                continue_on_error: false,
            },
            SequenceStepConfig {
                id: "b".to_string(),
                operation: "ensureCountryHubs".to_string(),
                label: None,
                start_url: None,
                // Unknown key makes the step blow up at parse time
                overrides: serde_json::json!({"bogusKnob": 1}),
                continue_on_error: false,
            },
        ],
        metadata: SequenceMetadata {
            source: "test".to_string(),
            resolved_tokens: Vec::new(),
            warnings: Vec::new(),
        },
    }
}

#[tokio::test]
async fn sequence_aborts_then_mixes_with_continue_on_error() {
    let env = env();
    env.fetcher
        .script("https://a.test/", ScriptedResponse::ok(seed_page()));

    let aborted = run_sequence(
        env.service.as_ref(),
        env.service.bus(),
        SequenceRunInput {
            config: two_step_config(),
            start_url: None,
            shared_overrides: serde_json::json!({}),
            step_overrides: HashMap::new(),
            continue_on_error: None,
            context: serde_json::Value::Null,
        },
    )
    .await
    .unwrap();

    assert_eq!(aborted.status, SequenceStatus::Aborted);
    assert_eq!(aborted.steps.len(), 2);
    assert_eq!(aborted.steps[0].status, StepStatus::Ok);
    assert_eq!(aborted.steps[1].status, StepStatus::Error);
    assert!(aborted.steps[1].error.as_ref().unwrap().message.contains("bogusKnob"));

    let mixed = run_sequence(
        env.service.as_ref(),
        env.service.bus(),
        SequenceRunInput {
            config: two_step_config(),
            start_url: None,
            shared_overrides: serde_json::json!({}),
            step_overrides: HashMap::new(),
            continue_on_error: Some(true),
            context: serde_json::Value::Null,
        },
    )
    .await
    .unwrap();

    assert_eq!(mixed.status, SequenceStatus::Mixed);
    assert_eq!(mixed.steps.len(), 2);
}

#[tokio::test]
async fn sequence_config_file_resolves_cli_tokens() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("pulse.yaml"),
        r#"
name: pulse
startUrl: "@cli.startUrl"
steps:
  - operation: basicArticleCrawl
"#,
    )
    .unwrap();

    let env = env_with_config_dir(dir.path().to_path_buf());
    env.fetcher
        .script("https://a.test/", ScriptedResponse::ok(seed_page()));

    let (result, metadata) = env
        .service
        .run_sequence_config(RunConfigInput {
            sequence_config_name: "pulse".to_string(),
            config_dir: None,
            config_host: None,
            start_url: Some("https://a.test/".to_string()),
            shared_overrides: serde_json::json!({}),
            step_overrides: HashMap::new(),
            config_cli_overrides: serde_json::json!({}),
            continue_on_error: None,
        })
        .await
        .unwrap();

    assert_eq!(result.status, SequenceStatus::Ok);
    assert_eq!(metadata.resolved_tokens.len(), 1);
    assert_eq!(metadata.resolved_tokens[0].token, "@cli.startUrl");
    assert!(metadata.warnings.is_empty());
    assert_eq!(result.steps[0].start_url, "https://a.test/");
}

#[tokio::test]
async fn missing_sequence_config_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let env = env_with_config_dir(dir.path().to_path_buf());

    let result = env
        .service
        .run_sequence_config(RunConfigInput {
            sequence_config_name: "ghost".to_string(),
            config_dir: None,
            config_host: None,
            start_url: Some("https://a.test/".to_string()),
            shared_overrides: serde_json::json!({}),
            step_overrides: HashMap::new(),
            config_cli_overrides: serde_json::json!({}),
            continue_on_error: None,
        })
        .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn start_operation_registers_and_completes_job() {
    let env = env();
    env.fetcher
        .script("https://a.test/", ScriptedResponse::ok(seed_page()));

    let job = env
        .service
        .start_operation("basicArticleCrawl", "https://a.test/", serde_json::json!({}))
        .unwrap();

    // The job runs in the background; poll until terminal.
    let mut finished = None;
    for _ in 0..100 {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let current = env.service.jobs().get(&job.id).unwrap();
        if current.status.is_terminal() {
            finished = Some(current);
            break;
        }
    }
    let finished = finished.expect("job should finish");
    assert_eq!(finished.status, hubscout::models::JobStatus::Completed);
    assert!(finished.finished_at.is_some());
}
