//! Domain processor: the hub-discovery pipeline.
//!
//! Ordered steps: normalize → readiness → select places/topics →
//! processable check → per-kind candidate loop → finalize. Per-candidate
//! faults (network errors, validation failures) fold into the run summary;
//! only invalid input and unexpected infrastructure faults surface as
//! errors. A 429 response aborts the whole domain for the rest of the run.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use crate::discovery::{
    assess_readiness, Dspl, DomainSignals, HubAnalyzer, HubValidator, PlaceProvider,
    ReadinessStatus,
};
use crate::fetch::{CacheDecision, CachePolicy, FetchMethod, FetchOptions, Fetcher};
use crate::models::{
    AuditEntry, Candidate, CandidateStatus, Decision, Determination, Domain, DomainDetermination,
    FetchRecord, FetchStage, FetchTags, Hub, Place, PlaceKind, Prediction, TaskEvent, Topic,
    ValidationStatus,
};
use crate::repository::{
    AuditLog, CandidateStore, DeterminationLog, FetchLog, HubStore, HubUpsert, RepositoryError,
    StatusUpdate, ValidationUpdate,
};
use crate::utils::html;
use crate::utils::url::canonicalize;

use super::jobs::JobControl;
use super::summary::{DecisionEntry, DiffEntry, DiffUpdateEntry, RunSummary};
use super::telemetry::TelemetryBus;
use super::{CrawlOptions, OrchestrationError};

/// Everything the pipeline needs, injected once at construction.
pub struct ProcessorDeps {
    pub fetch_log: Arc<dyn FetchLog>,
    pub candidates: Arc<dyn CandidateStore>,
    pub hubs: Arc<dyn HubStore>,
    pub audit: Arc<dyn AuditLog>,
    pub determinations: Arc<dyn DeterminationLog>,
    pub fetcher: Arc<dyn Fetcher>,
    pub analyzers: Vec<Arc<dyn HubAnalyzer>>,
    pub places: Arc<dyn PlaceProvider>,
    pub validator: HubValidator,
    pub dspl: Dspl,
}

/// One pipeline invocation.
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    pub start_url: String,
    pub operation: String,
    pub options: CrawlOptions,
}

/// What a candidate is expected to be a hub for.
#[derive(Debug, Clone)]
enum HubTarget {
    Place(Place),
    Topic(Topic),
    Combination(Place, Topic),
}

impl HubTarget {
    fn place(&self) -> Option<&Place> {
        match self {
            Self::Place(p) | Self::Combination(p, _) => Some(p),
            Self::Topic(_) => None,
        }
    }

    fn topic(&self) -> Option<&Topic> {
        match self {
            Self::Topic(t) | Self::Combination(_, t) => Some(t),
            Self::Place(_) => None,
        }
    }

    fn label(&self) -> String {
        match self {
            Self::Place(p) => format!("{}:{}", p.kind.as_str(), p.slug()),
            Self::Topic(t) => format!("topic:{}", t.slug),
            Self::Combination(p, t) => format!("{}+{}", p.slug(), t.slug),
        }
    }
}

/// State shared by candidate workers within one run.
struct RunShared {
    summary: Mutex<RunSummary>,
    /// Monotone: once set, no further candidates or places start.
    abort: AtomicBool,
    rate_limited: AtomicBool,
    downloads: AtomicU64,
    control: Arc<JobControl>,
}

impl RunShared {
    fn should_stop(&self) -> bool {
        self.abort.load(Ordering::SeqCst) || self.control.abort_requested()
    }
}

pub struct DomainProcessor {
    deps: Arc<ProcessorDeps>,
    bus: Arc<TelemetryBus>,
}

impl DomainProcessor {
    pub fn new(deps: Arc<ProcessorDeps>, bus: Arc<TelemetryBus>) -> Self {
        Self { deps, bus }
    }

    fn policy(options: &CrawlOptions) -> CachePolicy {
        CachePolicy::from_days(
            options.max_age_days,
            options.refresh_404_days,
            options.retry_4xx_days,
        )
    }

    fn processing_error(
        domain: &Domain,
        summary: &RunSummary,
        error: RepositoryError,
    ) -> OrchestrationError {
        OrchestrationError::Processing {
            domain: domain.host.clone(),
            message: error.to_string(),
            summary: Box::new(summary.clone()),
        }
    }

    /// Run the full hub-discovery pipeline for one domain.
    pub async fn process(
        &self,
        request: ProcessRequest,
        control: Arc<JobControl>,
        task_id: &str,
    ) -> Result<RunSummary, OrchestrationError> {
        let options = request.options.clone();
        options.validate()?;

        let domain = Domain::normalize(&request.start_url)
            .map_err(|e| OrchestrationError::InvalidInput(e.to_string()))?;
        let attempt_id = uuid::Uuid::new_v4().to_string();
        let mut summary = RunSummary::new(&domain.host, &request.operation, task_id, &attempt_id);

        self.bus.emit(TaskEvent::lifecycle(
            "operation",
            task_id,
            "started",
            serde_json::json!({
                "operation": request.operation,
                "domain": domain.host,
                "kinds": options.kinds,
            }),
        ));

        // Readiness gate; insufficient data ends the run before any fetch.
        let readiness = self
            .assess(&domain, &options)
            .map_err(|e| Self::processing_error(&domain, &summary, e))?;
        let data_limited = readiness.status == ReadinessStatus::DataLimited;
        let insufficient = readiness.status == ReadinessStatus::InsufficientData;
        let readiness_reason = readiness.reason.clone();
        summary.readiness = Some(readiness);

        if insufficient {
            summary.set_determination(Determination::InsufficientData, readiness_reason.clone());
            self.record_determination(&domain, &summary)
                .map_err(|e| Self::processing_error(&domain, &summary, e))?;
            summary.finalize();
            self.finish(task_id, &summary);
            return Ok(summary);
        }

        // Select places per requested kind, importance order.
        let mut selected: Vec<(PlaceKind, Vec<Place>)> = Vec::new();
        for kind in &options.kinds {
            if !self.deps.analyzers.iter().any(|a| a.supports(*kind)) {
                summary.unsupported_kinds.push(kind.as_str().to_string());
                continue;
            }
            let places = self.deps.places.places(*kind, options.place_limit);
            summary.total_places += places.len() as u64;
            selected.push((*kind, places));
        }

        // Topics only when asked for.
        let topics: Vec<Topic> = if options.enable_topic_discovery
            || options.enable_combination_discovery
            || !options.topics.is_empty()
        {
            if options.topics.is_empty() {
                self.deps.places.topics(options.place_limit)
            } else {
                options.topics.iter().map(|s| Topic::from_slug(s)).collect()
            }
        } else {
            Vec::new()
        };
        summary.total_topics = topics.len() as u64;

        // Nothing to do is a successful, empty run.
        if summary.total_places == 0 && topics.is_empty() {
            summary.set_determination(Determination::Processed, "no places or topics selected");
            self.record_determination(&domain, &summary)
                .map_err(|e| Self::processing_error(&domain, &summary, e))?;
            summary.finalize();
            self.finish(task_id, &summary);
            return Ok(summary);
        }

        let planned = (summary.total_places as usize + topics.len()) * options.patterns_per_place;
        self.bus.set_batch_hint(planned);

        let shared = Arc::new(RunShared {
            summary: Mutex::new(summary),
            abort: AtomicBool::new(false),
            rate_limited: AtomicBool::new(false),
            downloads: AtomicU64::new(0),
            control: control.clone(),
        });
        let domain = Arc::new(domain);
        let options = Arc::new(options);
        let run_ids = Arc::new((task_id.to_string(), attempt_id));

        // Place hubs, kind by kind, deduplicated on (kind, slug).
        let mut seen_places: HashSet<(PlaceKind, String)> = HashSet::new();
        'kinds: for (kind, places) in &selected {
            for place in places {
                if shared.should_stop() {
                    break 'kinds;
                }
                if !seen_places.insert((*kind, place.slug())) {
                    shared.summary.lock().unwrap().skipped_duplicate_place += 1;
                    continue;
                }
                self.process_target(
                    &shared,
                    &domain,
                    HubTarget::Place(place.clone()),
                    &options,
                    &run_ids,
                )
                .await;
            }
        }

        // Topic hubs.
        if options.enable_topic_discovery || !options.topics.is_empty() {
            let mut seen_topics: HashSet<String> = HashSet::new();
            for topic in &topics {
                if shared.should_stop() {
                    break;
                }
                if !seen_topics.insert(topic.slug.clone()) {
                    shared.summary.lock().unwrap().skipped_duplicate_topic += 1;
                    continue;
                }
                self.process_target(
                    &shared,
                    &domain,
                    HubTarget::Topic(topic.clone()),
                    &options,
                    &run_ids,
                )
                .await;
            }
        }

        // Place-topic combinations over the selected place set.
        if options.enable_combination_discovery {
            let mut seen_combos: HashSet<(String, String)> = HashSet::new();
            'combos: for (_, places) in &selected {
                for place in places {
                    for topic in &topics {
                        if shared.should_stop() {
                            break 'combos;
                        }
                        if !seen_combos.insert((place.slug(), topic.slug.clone())) {
                            shared.summary.lock().unwrap().skipped_duplicate_combination += 1;
                            continue;
                        }
                        self.process_target(
                            &shared,
                            &domain,
                            HubTarget::Combination(place.clone(), topic.clone()),
                            &options,
                            &run_ids,
                        )
                        .await;
                    }
                }
            }
        }

        // Finalize: determination precedence is rate-limit > data-limited >
        // processed, with stop requests noted as a decision.
        let rate_limited = shared.rate_limited.load(Ordering::SeqCst);
        let stopped = control.abort_requested();
        let mut summary = match Arc::try_unwrap(shared) {
            Ok(shared) => shared.summary.into_inner().unwrap(),
            Err(shared) => shared.summary.lock().unwrap().clone(),
        };

        if stopped {
            summary.aborted = true;
            summary
                .decisions
                .push(DecisionEntry::new("aborted", None, "stop requested"));
        }

        if rate_limited {
            summary.set_determination(
                Determination::RateLimited,
                format!("HTTP 429 from {}", domain.host),
            );
        } else if data_limited {
            summary.set_determination(Determination::DataLimited, readiness_reason);
        } else {
            let reason = if stopped {
                "completed partially after stop request"
            } else {
                "completed"
            };
            summary.set_determination(Determination::Processed, reason);
        }

        self.record_determination(&domain, &summary)
            .map_err(|e| Self::processing_error(&domain, &summary, e))?;
        summary.finalize();
        self.finish(task_id, &summary);
        Ok(summary)
    }

    /// The "basic article crawl": fetch the seed page, follow same-host
    /// article links, and record fetch history. No hub validation.
    pub async fn crawl_articles(
        &self,
        request: ProcessRequest,
        control: Arc<JobControl>,
        task_id: &str,
    ) -> Result<RunSummary, OrchestrationError> {
        let options = request.options.clone();
        options.validate()?;

        let domain = Domain::normalize(&request.start_url)
            .map_err(|e| OrchestrationError::InvalidInput(e.to_string()))?;
        let attempt_id = uuid::Uuid::new_v4().to_string();
        let mut summary = RunSummary::new(&domain.host, &request.operation, task_id, &attempt_id);
        let policy = Self::policy(&options);

        self.bus.emit(TaskEvent::lifecycle(
            "operation",
            task_id,
            "started",
            serde_json::json!({"operation": request.operation, "domain": domain.host}),
        ));

        let seed_path = url::Url::parse(&request.start_url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| "/".to_string());
        let seed_url = canonicalize(&domain.absolute_url(&seed_path));
        let fetch_options = FetchOptions {
            method: FetchMethod::Get,
            timeout: Duration::from_millis(options.fetch_timeout_ms),
            headers: Default::default(),
        };

        let seed = self.deps.fetcher.fetch(&seed_url, &fetch_options).await;
        summary.fetched += 1;
        summary.total_urls += 1;
        self.record_fetch(&domain, &seed_url, &seed, &attempt_id)
            .map_err(|e| Self::processing_error(&domain, &summary, e))?;

        if seed.http_status == 429 {
            summary.rate_limited += 1;
            summary.decisions.push(DecisionEntry::new(
                "rate-limited",
                Some(seed_url.clone()),
                "seed fetch returned 429",
            ));
            summary.set_determination(
                Determination::RateLimited,
                format!("HTTP 429 from {}", domain.host),
            );
        } else if !seed.ok {
            if seed.http_status == 404 {
                summary.stored_404 += 1;
            } else {
                summary.errors += 1;
            }
            summary.set_determination(
                Determination::Error,
                format!("seed fetch failed with HTTP {}", seed.http_status),
            );
        } else {
            // Same-host article links, deduplicated, bounded by the
            // download cap.
            let cap = options.max_downloads.unwrap_or(20) as usize;
            let mut seen: HashSet<String> = HashSet::new();
            let links: Vec<String> = html::extract_links(&seed.body)
                .into_iter()
                .filter(|href| html::is_article_path(href))
                .map(|href| canonicalize(&domain.absolute_url(&href)))
                .filter(|url| url.starts_with(&domain.base))
                .filter(|url| seen.insert(url.clone()))
                .take(cap)
                .collect();
            summary.total_urls += links.len() as u64;

            let mut rate_limited = false;
            for link in links {
                if control.abort_requested() {
                    summary.aborted = true;
                    summary
                        .decisions
                        .push(DecisionEntry::new("aborted", None, "stop requested"));
                    break;
                }
                control.wait_if_paused().await;

                let latest = self
                    .deps
                    .fetch_log
                    .latest_fetch(&link)
                    .map_err(|e| Self::processing_error(&domain, &summary, e))?;
                match policy.decide(latest.as_ref(), Utc::now()) {
                    CacheDecision::CachedOk => {
                        summary.cached += 1;
                        continue;
                    }
                    CacheDecision::Known404 => {
                        summary.skipped += 1;
                        continue;
                    }
                    CacheDecision::Recent4xx => {
                        summary.skipped_recent_4xx += 1;
                        continue;
                    }
                    CacheDecision::Fetch => {}
                }

                let outcome = self.deps.fetcher.fetch(&link, &fetch_options).await;
                summary.fetched += 1;
                self.record_fetch(&domain, &link, &outcome, &attempt_id)
                    .map_err(|e| Self::processing_error(&domain, &summary, e))?;
                self.bus.emit(TaskEvent::progress(
                    "operation",
                    task_id,
                    "article",
                    serde_json::json!({"url": link, "httpStatus": outcome.http_status}),
                ));

                match outcome.http_status {
                    429 => {
                        summary.rate_limited += 1;
                        summary.decisions.push(DecisionEntry::new(
                            "rate-limited",
                            Some(link.clone()),
                            "article fetch returned 429",
                        ));
                        rate_limited = true;
                        break;
                    }
                    404 => summary.stored_404 += 1,
                    s if (200..300).contains(&s) => {}
                    _ => summary.errors += 1,
                }
            }

            if rate_limited {
                summary.set_determination(
                    Determination::RateLimited,
                    format!("HTTP 429 from {}", domain.host),
                );
            } else {
                summary.set_determination(Determination::Processed, "completed");
            }
        }

        self.record_determination(&domain, &summary)
            .map_err(|e| Self::processing_error(&domain, &summary, e))?;
        summary.finalize();
        self.finish(task_id, &summary);
        Ok(summary)
    }

    fn assess(
        &self,
        domain: &Domain,
        options: &CrawlOptions,
    ) -> Result<crate::discovery::Readiness, RepositoryError> {
        let dspl_summary = self.deps.dspl.summarize(&domain.host);
        let signals = DomainSignals {
            verified_patterns: dspl_summary.verified_patterns,
            hub_count: self.deps.hubs.count_for_domain(&domain.host)?,
            fetch_total: self.deps.fetch_log.count_for_domain(&domain.host)?,
            candidate_count: self.deps.candidates.count_for_domain(&domain.host)?,
            probe_timed_out: false,
        };
        let latest = self.deps.determinations.latest(&domain.host)?;
        Ok(assess_readiness(
            domain,
            &options.kinds,
            &signals,
            dspl_summary,
            latest.as_ref(),
        ))
    }

    /// Enumerate, normalize, dedup, rank, and truncate candidate URLs for
    /// one target.
    fn enumerate(
        &self,
        domain: &Domain,
        target: &HubTarget,
        options: &CrawlOptions,
    ) -> Vec<(String, Prediction)> {
        let mut predictions: Vec<Prediction> = Vec::new();
        for analyzer in &self.deps.analyzers {
            let mut batch = match target {
                HubTarget::Place(p) => analyzer.predict_place_hub_urls(domain, p),
                HubTarget::Topic(t) => analyzer.predict_topic_hub_urls(domain, t),
                HubTarget::Combination(p, t) => {
                    analyzer.predict_combination_hub_urls(domain, p, t)
                }
            };
            predictions.append(&mut batch);
        }

        let mut seen: HashSet<String> = HashSet::new();
        let mut candidates: Vec<(String, Prediction)> = predictions
            .into_iter()
            .filter_map(|p| {
                let canonical = canonicalize(&domain.absolute_url(&p.url));
                seen.insert(canonical.clone()).then_some((canonical, p))
            })
            .collect();

        // Score descending; stable, so unscored input order survives.
        candidates.sort_by(|(_, a), (_, b)| {
            b.score
                .unwrap_or(f64::MIN)
                .partial_cmp(&a.score.unwrap_or(f64::MIN))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(options.patterns_per_place);
        candidates
    }

    /// Process one target's candidates with the bounded worker pool.
    async fn process_target(
        &self,
        shared: &Arc<RunShared>,
        domain: &Arc<Domain>,
        target: HubTarget,
        options: &Arc<CrawlOptions>,
        run_ids: &Arc<(String, String)>,
    ) {
        let urls = self.enumerate(domain, &target, options);
        if urls.is_empty() {
            debug!("no predictions for {} on {}", target.label(), domain.host);
            return;
        }
        shared.summary.lock().unwrap().total_urls += urls.len() as u64;

        let queue: Arc<Mutex<VecDeque<(String, Prediction)>>> =
            Arc::new(Mutex::new(urls.into_iter().collect()));
        let workers = options.concurrency.min(queue.lock().unwrap().len()).max(1);
        let target = Arc::new(target);

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let deps = self.deps.clone();
            let bus = self.bus.clone();
            let shared = shared.clone();
            let domain = domain.clone();
            let target = target.clone();
            let options = options.clone();
            let run_ids = run_ids.clone();
            let queue = queue.clone();

            handles.push(tokio::spawn(async move {
                let worker = CandidateWorker {
                    deps,
                    bus,
                    shared,
                    domain,
                    target,
                    options,
                    run_ids,
                };
                worker.drain(queue).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    fn record_fetch(
        &self,
        domain: &Domain,
        url: &str,
        outcome: &crate::fetch::FetchOutcome,
        attempt_id: &str,
    ) -> Result<(), RepositoryError> {
        record_fetch_row(
            self.deps.fetch_log.as_ref(),
            &domain.host,
            url,
            outcome,
            attempt_id,
        )
    }

    fn record_determination(
        &self,
        domain: &Domain,
        summary: &RunSummary,
    ) -> Result<(), RepositoryError> {
        let determination = match summary.determination {
            Some(d) => d,
            None => return Ok(()),
        };
        self.deps.determinations.append(&DomainDetermination::new(
            &domain.host,
            determination,
            summary
                .determination_reason
                .clone()
                .unwrap_or_else(|| determination.as_str().to_string()),
            serde_json::json!({
                "operation": summary.operation,
                "runId": summary.run_id,
                "fetched": summary.fetched,
                "insertedHubs": summary.inserted_hubs,
                "updatedHubs": summary.updated_hubs,
                "errors": summary.errors,
            }),
        ))
    }

    fn finish(&self, task_id: &str, summary: &RunSummary) {
        self.bus.emit(TaskEvent::lifecycle(
            "operation",
            task_id,
            "finished",
            serde_json::json!({
                "domain": summary.domain,
                "determination": summary.determination,
                "fetched": summary.fetched,
                "cached": summary.cached,
                "insertedHubs": summary.inserted_hubs,
                "updatedHubs": summary.updated_hubs,
                "durationMs": summary.duration_ms,
            }),
        ));
        self.bus.flush();
    }
}

/// One fetch row per HTTP attempt.
fn record_fetch_row(
    fetch_log: &dyn FetchLog,
    host: &str,
    url: &str,
    outcome: &crate::fetch::FetchOutcome,
    attempt_id: &str,
) -> Result<(), RepositoryError> {
    let title = outcome
        .ok
        .then(|| html::extract_title(&outcome.body))
        .flatten();
    fetch_log.record(
        &FetchRecord {
            url: url.to_string(),
            domain: host.to_string(),
            http_status: outcome.http_status,
            http_success: outcome.ok,
            title,
            request_method: "GET".to_string(),
            request_started_at: outcome.metrics.request_started_at,
            fetched_at: outcome.metrics.fetched_at,
            bytes_downloaded: outcome.metrics.bytes_downloaded,
            content_type: outcome.metrics.content_type.clone(),
            content_length: outcome.metrics.content_length,
            total_ms: outcome.metrics.total_ms,
            download_ms: outcome.metrics.download_ms,
            redirect_count: outcome.metrics.redirect_count,
        },
        &FetchTags {
            stage: FetchStage::Get,
            attempt_id: attempt_id.to_string(),
            cache_hit: false,
        },
    )
}

/// One worker in the candidate pool.
struct CandidateWorker {
    deps: Arc<ProcessorDeps>,
    bus: Arc<TelemetryBus>,
    shared: Arc<RunShared>,
    domain: Arc<Domain>,
    target: Arc<HubTarget>,
    options: Arc<CrawlOptions>,
    /// (run id, attempt id)
    run_ids: Arc<(String, String)>,
}

impl CandidateWorker {
    async fn drain(&self, queue: Arc<Mutex<VecDeque<(String, Prediction)>>>) {
        loop {
            if self.shared.should_stop() {
                break;
            }
            self.shared.control.wait_if_paused().await;
            if self.shared.should_stop() {
                break;
            }

            let item = queue.lock().unwrap().pop_front();
            let Some((canonical, prediction)) = item else {
                break;
            };

            if let Err(e) = self.process_candidate(&canonical, &prediction).await {
                warn!("candidate {} failed: {}", canonical, e);
                self.shared.summary.lock().unwrap().errors += 1;
            }
        }
    }

    fn build_candidate(&self, canonical: &str, prediction: &Prediction) -> Candidate {
        let attempt_id = &self.run_ids.1;
        match self.target.as_ref() {
            HubTarget::Place(p) => Candidate::for_place(
                &self.domain.host,
                canonical.to_string(),
                p,
                prediction,
                attempt_id,
            ),
            HubTarget::Topic(t) => Candidate::for_topic(
                &self.domain.host,
                canonical.to_string(),
                t,
                prediction,
                attempt_id,
            ),
            HubTarget::Combination(p, t) => Candidate::for_combination(
                &self.domain.host,
                canonical.to_string(),
                p,
                t,
                prediction,
                attempt_id,
            ),
        }
    }

    fn mark(&self, url: &str, status: CandidateStatus, http_status: Option<u16>, error: Option<String>) -> Result<(), RepositoryError> {
        self.deps.candidates.mark_status(&StatusUpdate {
            domain: self.domain.host.clone(),
            url: url.to_string(),
            status,
            http_status,
            error_message: error,
            last_seen_at: Utc::now(),
        })
    }

    fn emit_candidate(&self, url: &str, status: CandidateStatus) {
        self.bus.emit(TaskEvent::progress(
            "operation",
            &self.run_ids.0,
            "candidate",
            serde_json::json!({
                "url": url,
                "target": self.target.label(),
                "status": status.as_str(),
            }),
        ));
    }

    async fn process_candidate(
        &self,
        canonical: &str,
        prediction: &Prediction,
    ) -> Result<(), RepositoryError> {
        let candidate = self.build_candidate(canonical, prediction);
        self.deps.candidates.save_candidate(&candidate)?;

        // Cache skip ladder.
        let policy = DomainProcessor::policy(&self.options);
        let latest = self.deps.fetch_log.latest_fetch(canonical)?;
        match policy.decide(latest.as_ref(), Utc::now()) {
            CacheDecision::CachedOk => {
                self.mark(canonical, CandidateStatus::CachedOk, latest.map(|l| l.http_status), None)?;
                self.shared.summary.lock().unwrap().cached += 1;
                self.emit_candidate(canonical, CandidateStatus::CachedOk);
                return Ok(());
            }
            CacheDecision::Known404 => {
                self.mark(canonical, CandidateStatus::Cached404, Some(404), None)?;
                self.shared.summary.lock().unwrap().skipped += 1;
                self.emit_candidate(canonical, CandidateStatus::Cached404);
                return Ok(());
            }
            CacheDecision::Recent4xx => {
                self.mark(canonical, CandidateStatus::Cached4xx, latest.map(|l| l.http_status), None)?;
                self.shared.summary.lock().unwrap().skipped_recent_4xx += 1;
                self.emit_candidate(canonical, CandidateStatus::Cached4xx);
                return Ok(());
            }
            CacheDecision::Fetch => {}
        }

        // Global download cap.
        if let Some(cap) = self.options.max_downloads {
            if self.shared.downloads.load(Ordering::SeqCst) >= cap {
                if !self.shared.abort.swap(true, Ordering::SeqCst) {
                    let mut summary = self.shared.summary.lock().unwrap();
                    summary.decisions.push(DecisionEntry::new(
                        "download-cap",
                        None,
                        format!("maxDownloads={} reached", cap),
                    ));
                }
                return Ok(());
            }
        }

        let fetch_options = FetchOptions {
            method: FetchMethod::Get,
            timeout: Duration::from_millis(self.options.fetch_timeout_ms),
            headers: Default::default(),
        };
        let outcome = self.deps.fetcher.fetch(canonical, &fetch_options).await;
        self.shared.downloads.fetch_add(1, Ordering::SeqCst);

        // One fetch row per attempt, whatever the status.
        record_fetch_row(
            self.deps.fetch_log.as_ref(),
            &self.domain.host,
            canonical,
            &outcome,
            &self.run_ids.1,
        )?;
        self.shared.summary.lock().unwrap().fetched += 1;

        // Transport failure (synthetic 408/500 with an error message).
        if let Some(error) = &outcome.error {
            self.mark(
                canonical,
                CandidateStatus::FetchError,
                Some(outcome.http_status),
                Some(error.clone()),
            )?;
            self.shared.summary.lock().unwrap().errors += 1;
            self.emit_candidate(canonical, CandidateStatus::FetchError);
            return Ok(());
        }

        match outcome.http_status {
            404 => {
                self.mark(canonical, CandidateStatus::FetchedError, Some(404), None)?;
                self.shared.summary.lock().unwrap().stored_404 += 1;
                self.emit_candidate(canonical, CandidateStatus::FetchedError);
                Ok(())
            }
            429 => {
                // Domain-wide soft abort; no retry, no backoff.
                self.mark(canonical, CandidateStatus::FetchedError, Some(429), None)?;
                self.shared.rate_limited.store(true, Ordering::SeqCst);
                self.shared.abort.store(true, Ordering::SeqCst);
                {
                    let mut summary = self.shared.summary.lock().unwrap();
                    summary.rate_limited += 1;
                    summary.decisions.push(DecisionEntry::new(
                        "rate-limited",
                        Some(canonical.to_string()),
                        format!("HTTP 429 from {}", self.domain.host),
                    ));
                }
                self.bus.emit(TaskEvent::error(
                    "operation",
                    &self.run_ids.0,
                    "rate-limited",
                    serde_json::json!({"url": canonical, "domain": self.domain.host}),
                ));
                Ok(())
            }
            s if (200..300).contains(&s) => {
                self.mark(canonical, CandidateStatus::FetchedOk, Some(s), None)?;
                self.validate_and_store(canonical, &outcome.body).await
            }
            s => {
                self.mark(canonical, CandidateStatus::FetchedError, Some(s), None)?;
                self.shared.summary.lock().unwrap().errors += 1;
                self.emit_candidate(canonical, CandidateStatus::FetchedError);
                Ok(())
            }
        }
    }

    async fn validate_and_store(&self, canonical: &str, body: &str) -> Result<(), RepositoryError> {
        let validator = &self.deps.validator;
        let outcome = match self.target.as_ref() {
            HubTarget::Place(p) => validator.validate_place_hub(body, p, &self.domain),
            HubTarget::Topic(t) => validator.validate_topic_hub(body, t, &self.domain),
            HubTarget::Combination(p, t) => {
                validator.validate_place_topic_hub(body, p, t, &self.domain)
            }
        };

        let status = if outcome.is_valid {
            CandidateStatus::Validated
        } else {
            CandidateStatus::ValidationFailed
        };
        self.deps.candidates.update_validation(&ValidationUpdate {
            domain: self.domain.host.clone(),
            url: canonical.to_string(),
            status,
            validation_status: if outcome.is_valid {
                ValidationStatus::Passed
            } else {
                ValidationStatus::Failed
            },
            confidence: Some(outcome.confidence),
            metrics: outcome.metrics_json(),
            reason: outcome.reason.clone(),
            last_seen_at: Utc::now(),
        })?;

        // Every validation outcome leaves an audit trail entry.
        self.deps.audit.append(&AuditEntry {
            run_id: self.run_ids.0.clone(),
            attempt_id: self.run_ids.1.clone(),
            domain: self.domain.host.clone(),
            url: canonical.to_string(),
            place_kind: self.target.place().map(|p| p.kind),
            place_name: self.target.place().map(|p| p.name.clone()),
            decision: if outcome.is_valid {
                Decision::Accepted
            } else {
                Decision::Rejected
            },
            validation_metrics: outcome.metrics_json(),
            created_at: Utc::now(),
        })?;

        if !outcome.is_valid {
            let reason = outcome.reason.as_deref().unwrap_or("unspecified");
            self.shared
                .summary
                .lock()
                .unwrap()
                .bucket_validation_failure(reason);
            self.emit_candidate(canonical, CandidateStatus::ValidationFailed);
            return Ok(());
        }

        self.shared.summary.lock().unwrap().validation_succeeded += 1;

        let now = Utc::now();
        let hub = Hub {
            domain: self.domain.host.clone(),
            url: canonical.to_string(),
            place_slug: self.target.place().map(|p| p.slug()),
            place_kind: self.target.place().map(|p| p.kind),
            topic_slug: self.target.topic().map(|t| t.slug.clone()),
            topic_label: self.target.topic().map(|t| t.label.clone()),
            title: outcome.title.clone(),
            nav_links_count: outcome.nav_link_count,
            article_links_count: outcome.article_link_count,
            evidence: outcome.metrics_json(),
            created_at: now,
            updated_at: now,
        };

        if self.options.apply {
            match self.deps.hubs.upsert(&hub)? {
                HubUpsert::Inserted => {
                    let mut summary = self.shared.summary.lock().unwrap();
                    summary.inserted_hubs += 1;
                    summary.diff_preview.inserted.push(DiffEntry {
                        url: hub.url.clone(),
                        place_slug: hub.place_slug.clone(),
                        topic_slug: hub.topic_slug.clone(),
                        title: hub.title.clone(),
                    });
                    drop(summary);
                    self.bus.emit(TaskEvent::milestone(
                        "operation",
                        &self.run_ids.0,
                        "hub-inserted",
                        serde_json::json!({"url": hub.url, "target": self.target.label()}),
                    ));
                }
                HubUpsert::Updated(changes) => {
                    let mut summary = self.shared.summary.lock().unwrap();
                    summary.updated_hubs += 1;
                    summary.diff_preview.updated.push(DiffUpdateEntry {
                        url: hub.url.clone(),
                        changes,
                    });
                }
                HubUpsert::Unchanged => {}
            }
        } else {
            // Dry run: preview what apply would have written.
            match self.deps.hubs.get(&self.domain.host, canonical)? {
                None => {
                    self.shared
                        .summary
                        .lock()
                        .unwrap()
                        .diff_preview
                        .inserted
                        .push(DiffEntry {
                            url: hub.url.clone(),
                            place_slug: hub.place_slug.clone(),
                            topic_slug: hub.topic_slug.clone(),
                            title: hub.title.clone(),
                        });
                }
                Some(existing) => {
                    let changes = crate::models::collect_hub_changes(&existing, &hub);
                    if !changes.is_empty() {
                        self.shared
                            .summary
                            .lock()
                            .unwrap()
                            .diff_preview
                            .updated
                            .push(DiffUpdateEntry {
                                url: hub.url.clone(),
                                changes,
                            });
                    }
                }
            }
        }

        self.emit_candidate(canonical, CandidateStatus::Validated);
        Ok(())
    }
}
