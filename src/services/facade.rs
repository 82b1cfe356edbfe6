//! The operations facade consumed by the CLI and the HTTP surface.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info};

use crate::models::Job;

use super::jobs::{JobControl, JobRegistry};
use super::operations::{
    ErrorInfo, OperationMode, OperationResult, OperationsRegistry, ResultStatus,
};
use super::processor::{DomainProcessor, ProcessRequest, ProcessorDeps};
use super::sequence::{
    run_sequence, OperationInvoker, SequenceConfig, SequenceMetadata, SequenceResult,
    SequenceRunInput, SequenceStepConfig,
};
use super::sequence_config::{
    load_sequence_config, peek_host, resolve_config_path, CliResolver, ConfigResolver,
    PlaybookProvider, PlaybookResolver, TokenResolver,
};
use super::telemetry::TelemetryBus;
use super::{CrawlOptions, CrawlOverrides, OrchestrationError};

/// A sequence shipped in-code rather than loaded from a file.
pub struct SequencePreset {
    pub name: &'static str,
    pub label: Option<&'static str>,
    pub description: Option<&'static str>,
    pub continue_on_error: bool,
    pub steps: Vec<PresetStep>,
}

pub struct PresetStep {
    pub operation: &'static str,
    pub label: Option<&'static str>,
    pub overrides: serde_json::Value,
}

fn standard_presets() -> Vec<SequencePreset> {
    vec![
        SequencePreset {
            name: "countryHubSweep",
            label: Some("Country hub sweep"),
            description: Some("Persist country hubs, then a wide dry-run exploration"),
            continue_on_error: false,
            steps: vec![
                PresetStep {
                    operation: "ensureCountryHubs",
                    label: Some("Ensure hubs"),
                    overrides: serde_json::json!({"apply": true}),
                },
                PresetStep {
                    operation: "exploreCountryHubs",
                    label: Some("Explore"),
                    overrides: serde_json::json!({}),
                },
            ],
        },
        SequencePreset {
            name: "fullDiscovery",
            label: Some("Full discovery"),
            description: Some("Country, region, and topic hubs in one pass"),
            continue_on_error: true,
            steps: vec![
                PresetStep {
                    operation: "ensureCountryHubs",
                    label: None,
                    overrides: serde_json::json!({}),
                },
                PresetStep {
                    operation: "discoverRegionHubs",
                    label: None,
                    overrides: serde_json::json!({}),
                },
                PresetStep {
                    operation: "discoverTopicHubs",
                    label: None,
                    overrides: serde_json::json!({}),
                },
            ],
        },
        SequencePreset {
            name: "articlePulse",
            label: Some("Article pulse"),
            description: Some("Quick seed-page article crawl"),
            continue_on_error: false,
            steps: vec![PresetStep {
                operation: "basicArticleCrawl",
                label: None,
                overrides: serde_json::json!({}),
            }],
        },
    ]
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationInfo {
    pub name: String,
    pub summary: String,
    pub default_options: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetStepInfo {
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub continue_on_error: bool,
    pub step_count: usize,
    pub steps: Vec<PresetStepInfo>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub operations: Vec<OperationInfo>,
    pub sequence_presets: Vec<PresetInfo>,
}

/// Inputs for running a preset sequence.
pub struct RunPresetInput {
    pub sequence_name: String,
    pub start_url: Option<String>,
    pub shared_overrides: serde_json::Value,
    pub step_overrides: HashMap<String, serde_json::Value>,
    pub continue_on_error: Option<bool>,
    pub context: serde_json::Value,
}

/// Inputs for running a file-based sequence config.
pub struct RunConfigInput {
    pub sequence_config_name: String,
    pub config_dir: Option<PathBuf>,
    pub config_host: Option<String>,
    pub start_url: Option<String>,
    pub shared_overrides: serde_json::Value,
    pub step_overrides: HashMap<String, serde_json::Value>,
    pub config_cli_overrides: serde_json::Value,
    pub continue_on_error: Option<bool>,
}

/// The service API: availability, operations, sequences, jobs.
pub struct CrawlService {
    processor: DomainProcessor,
    registry: OperationsRegistry,
    presets: Vec<SequencePreset>,
    jobs: Arc<JobRegistry>,
    bus: Arc<TelemetryBus>,
    base_options: CrawlOptions,
    config_dir: PathBuf,
    playbook: Arc<dyn PlaybookProvider>,
    config_snapshot: serde_json::Value,
}

impl CrawlService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        deps: Arc<ProcessorDeps>,
        bus: Arc<TelemetryBus>,
        jobs: Arc<JobRegistry>,
        base_options: CrawlOptions,
        config_dir: PathBuf,
        playbook: Arc<dyn PlaybookProvider>,
        config_snapshot: serde_json::Value,
    ) -> Self {
        Self {
            processor: DomainProcessor::new(deps, bus.clone()),
            registry: OperationsRegistry::standard(),
            presets: standard_presets(),
            jobs,
            bus,
            base_options,
            config_dir,
            playbook,
            config_snapshot,
        }
    }

    pub fn bus(&self) -> &Arc<TelemetryBus> {
        &self.bus
    }

    pub fn jobs(&self) -> &Arc<JobRegistry> {
        &self.jobs
    }

    /// Everything a client can launch.
    pub fn availability(&self) -> Availability {
        let operations = self
            .registry
            .iter()
            .map(|spec| OperationInfo {
                name: spec.name.to_string(),
                summary: spec.summary.to_string(),
                default_options: serde_json::to_value(
                    self.registry.default_options(spec, &self.base_options),
                )
                .unwrap_or_default(),
            })
            .collect();

        let sequence_presets = self
            .presets
            .iter()
            .map(|preset| PresetInfo {
                name: preset.name.to_string(),
                label: preset.label.map(|s| s.to_string()),
                description: preset.description.map(|s| s.to_string()),
                continue_on_error: preset.continue_on_error,
                step_count: preset.steps.len(),
                steps: preset
                    .steps
                    .iter()
                    .map(|s| PresetStepInfo {
                        operation: s.operation.to_string(),
                        label: s.label.map(|l| l.to_string()),
                    })
                    .collect(),
            })
            .collect();

        Availability {
            operations,
            sequence_presets,
        }
    }

    /// Run an operation to completion in the caller's task.
    pub async fn run_operation(
        &self,
        operation_name: &str,
        start_url: &str,
        overrides: serde_json::Value,
    ) -> Result<OperationResult, OrchestrationError> {
        let task_id = uuid::Uuid::new_v4().to_string();
        self.execute(&task_id, operation_name, start_url, overrides, JobControl::new())
            .await
    }

    /// Launch an operation as a registered background job.
    pub fn start_operation(
        self: &Arc<Self>,
        operation_name: &str,
        start_url: &str,
        overrides: serde_json::Value,
    ) -> Result<Job, OrchestrationError> {
        if !self.registry.contains(operation_name) {
            return Err(OrchestrationError::UnknownOperation(
                operation_name.to_string(),
            ));
        }
        // Reject malformed overrides before a job record exists
        CrawlOverrides::from_value(&overrides)?;

        let (job, control) = self.jobs.create(operation_name, start_url, overrides.clone())?;

        let service = self.clone();
        let job_id = job.id.clone();
        let name = operation_name.to_string();
        let url = start_url.to_string();
        tokio::spawn(async move {
            let outcome = service
                .execute(&job_id, &name, &url, overrides, control)
                .await;
            match outcome {
                Ok(result) => {
                    let failed = result.status == ResultStatus::Error;
                    let progress = serde_json::to_value(&result).unwrap_or_default();
                    service.jobs.complete(&job_id, failed, progress);
                }
                Err(e) => {
                    error!("job {} failed: {}", job_id, e);
                    service.jobs.complete(
                        &job_id,
                        true,
                        serde_json::json!({"error": {"code": e.code(), "message": e.to_string()}}),
                    );
                }
            }
        });

        info!("started job {} ({})", job.id, operation_name);
        Ok(job)
    }

    /// Run a named preset sequence.
    pub async fn run_sequence_preset(
        &self,
        input: RunPresetInput,
    ) -> Result<SequenceResult, OrchestrationError> {
        let preset = self
            .presets
            .iter()
            .find(|p| p.name == input.sequence_name)
            .ok_or_else(|| {
                OrchestrationError::InvalidInput(format!(
                    "unknown sequence preset: {}",
                    input.sequence_name
                ))
            })?;

        let config = SequenceConfig {
            name: preset.name.to_string(),
            host: None,
            start_url: None,
            shared_overrides: serde_json::json!({}),
            continue_on_error: preset.continue_on_error,
            steps: preset
                .steps
                .iter()
                .enumerate()
                .map(|(index, step)| SequenceStepConfig {
                    id: format!("{}#{}", step.operation, index),
                    operation: step.operation.to_string(),
                    label: step.label.map(|l| l.to_string()),
                    start_url: None,
                    overrides: step.overrides.clone(),
                    continue_on_error: false,
                })
                .collect(),
            metadata: SequenceMetadata {
                source: "preset".to_string(),
                resolved_tokens: Vec::new(),
                warnings: Vec::new(),
            },
        };

        run_sequence(
            self,
            &self.bus,
            SequenceRunInput {
                config,
                start_url: input.start_url,
                shared_overrides: input.shared_overrides,
                step_overrides: input.step_overrides,
                continue_on_error: input.continue_on_error,
                context: input.context,
            },
        )
        .await
    }

    /// Load a sequence config file, resolve its tokens, and run it.
    pub async fn run_sequence_config(
        &self,
        input: RunConfigInput,
    ) -> Result<(SequenceResult, SequenceMetadata), OrchestrationError> {
        let dir = input
            .config_dir
            .clone()
            .unwrap_or_else(|| self.config_dir.clone());
        let path = resolve_config_path(
            &dir,
            input.config_host.as_deref(),
            &input.sequence_config_name,
        )
        .ok_or_else(|| {
            OrchestrationError::SequenceConfig(super::SequenceConfigError::NotFound(format!(
                "{} (dir {})",
                input.sequence_config_name,
                dir.display()
            )))
        })?;

        // The file's own host drives playbook resolution unless the caller
        // pinned one.
        let host = input.config_host.clone().or_else(|| peek_host(&path));

        let cli = CliResolver::new(
            input.start_url.as_deref(),
            &input.shared_overrides,
            &input.config_cli_overrides,
        );
        let playbook = PlaybookResolver::new(self.playbook.as_ref(), host.as_deref());
        let config_resolver = ConfigResolver::new(self.config_snapshot.clone());
        let resolvers: Vec<&dyn TokenResolver> = vec![&cli, &playbook, &config_resolver];

        let config = load_sequence_config(&path, &resolvers)?;
        let metadata = config.metadata.clone();

        let result = run_sequence(
            self,
            &self.bus,
            SequenceRunInput {
                config,
                start_url: input.start_url,
                shared_overrides: input.shared_overrides,
                step_overrides: input.step_overrides,
                continue_on_error: input.continue_on_error,
                context: serde_json::Value::Null,
            },
        )
        .await?;

        Ok((result, metadata))
    }

    /// Resolve, merge, validate, and run one operation.
    async fn execute(
        &self,
        task_id: &str,
        operation_name: &str,
        start_url: &str,
        overrides: serde_json::Value,
        control: Arc<JobControl>,
    ) -> Result<OperationResult, OrchestrationError> {
        let spec = self.registry.get(operation_name).ok_or_else(|| {
            OrchestrationError::UnknownOperation(operation_name.to_string())
        })?;

        let parsed = CrawlOverrides::from_value(&overrides)?;
        let effective = spec.defaults.merged(&parsed);
        let options = self.base_options.with_overrides(&effective);
        options.validate()?;

        let request = ProcessRequest {
            start_url: start_url.to_string(),
            operation: spec.name.to_string(),
            options,
        };

        let start = Instant::now();
        let outcome = match spec.mode {
            OperationMode::HubDiscovery => {
                self.processor.process(request, control, task_id).await
            }
            OperationMode::ArticleCrawl => {
                self.processor.crawl_articles(request, control, task_id).await
            }
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(summary) => Ok(OperationResult {
                status: ResultStatus::Ok,
                operation: spec.name.to_string(),
                elapsed_ms,
                stats: Some(summary),
                error: None,
            }),
            // A crashed pipeline still reports its partial summary
            Err(OrchestrationError::Processing {
                message, summary, ..
            }) => Ok(OperationResult {
                status: ResultStatus::Error,
                operation: spec.name.to_string(),
                elapsed_ms,
                stats: Some(*summary),
                error: Some(ErrorInfo {
                    code: "PROCESSING_ERROR".to_string(),
                    message,
                }),
            }),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl OperationInvoker for CrawlService {
    fn has_operation(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    async fn invoke(
        &self,
        task_id: &str,
        operation: &str,
        start_url: &str,
        overrides: serde_json::Value,
    ) -> Result<OperationResult, OrchestrationError> {
        self.execute(task_id, operation, start_url, overrides, JobControl::new())
            .await
    }
}
