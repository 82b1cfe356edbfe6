//! Service layer: operations facade, domain processor, sequence runner,
//! job registry, and telemetry.

#![allow(dead_code)]

mod facade;
mod jobs;
mod operations;
mod options;
mod processor;
mod sequence;
mod sequence_config;
mod summary;
mod telemetry;

pub use facade::{
    Availability, CrawlService, OperationInfo, PresetInfo, PresetStep, PresetStepInfo,
    RunConfigInput, RunPresetInput, SequencePreset,
};
pub use jobs::{JobControl, JobRegistry};
pub use operations::{
    ErrorInfo, OperationMode, OperationResult, OperationSpec, OperationsRegistry, ResultStatus,
};
pub use options::{merge_override_values, CrawlOptions, CrawlOverrides};
pub use processor::{DomainProcessor, ProcessRequest, ProcessorDeps};
pub use sequence::{
    run_sequence, OperationInvoker, SequenceConfig, SequenceMetadata, SequenceResult,
    SequenceRunInput, SequenceStatus, SequenceStepConfig, StepResult, StepStatus,
};
pub use sequence_config::{
    load_sequence_config, peek_host, resolve_config_path, CliResolver, ConfigResolver,
    NullPlaybook, PlaybookProvider, PlaybookResolver, ResolvedToken, SequenceConfigError,
    TokenResolver,
};
pub use summary::{DecisionEntry, DiffEntry, DiffPreview, DiffUpdateEntry, RunSummary};
pub use telemetry::TelemetryBus;

use thiserror::Error;

/// Error taxonomy for the orchestration layer.
///
/// The domain processor folds per-candidate faults (network, validation)
/// into the run summary; only these surface to callers.
#[derive(Error, Debug)]
pub enum OrchestrationError {
    /// A user-supplied value failed a precondition. Never touches the store.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("unknown job: {0}")]
    UnknownJob(String),

    /// A second job was started while one is running and multi-job mode is off.
    #[error("job conflict: {0}")]
    JobConflict(String),

    #[error(transparent)]
    SequenceConfig(#[from] SequenceConfigError),

    /// Unexpected fault inside the pipeline. The partial summary is attached.
    #[error("processing error for {domain}: {message}")]
    Processing {
        domain: String,
        message: String,
        summary: Box<RunSummary>,
    },
}

impl OrchestrationError {
    /// Stable machine-readable code for the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "BAD_REQUEST",
            Self::UnknownOperation(_) => "UNKNOWN_OPERATION",
            Self::UnknownJob(_) => "UNKNOWN_JOB",
            Self::JobConflict(_) => "JOB_CONFLICT",
            Self::SequenceConfig(_) => "SEQUENCE_CONFIG_ERROR",
            Self::Processing { .. } => "PROCESSING_ERROR",
        }
    }
}
