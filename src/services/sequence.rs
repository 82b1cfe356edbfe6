//! Sequence runner: strictly sequential execution of named operation
//! steps with shared/step/runtime override layering and a
//! continue-on-error policy.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::models::TaskEvent;

use super::operations::{ErrorInfo, OperationResult, ResultStatus};
use super::options::merge_override_values;
use super::telemetry::TelemetryBus;
use super::OrchestrationError;

/// One step in a sequence definition.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceStepConfig {
    /// Unique within the sequence; defaults to `{operation}#{index}`.
    pub id: String,
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_url: Option<String>,
    pub overrides: serde_json::Value,
    pub continue_on_error: bool,
}

/// Token-resolution record kept on the loaded config.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceMetadata {
    /// Where the config came from (file path or "preset").
    pub source: String,
    pub resolved_tokens: Vec<super::sequence_config::ResolvedToken>,
    pub warnings: Vec<String>,
}

/// A loaded, immutable sequence definition.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_url: Option<String>,
    pub shared_overrides: serde_json::Value,
    pub continue_on_error: bool,
    pub steps: Vec<SequenceStepConfig>,
    pub metadata: SequenceMetadata,
}

/// Runtime inputs layered over a config.
pub struct SequenceRunInput {
    pub config: SequenceConfig,
    pub start_url: Option<String>,
    pub shared_overrides: serde_json::Value,
    /// Keyed by step id, operation name, or 0-based index.
    pub step_overrides: HashMap<String, serde_json::Value>,
    pub continue_on_error: Option<bool>,
    pub context: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SequenceStatus {
    /// Every step succeeded.
    Ok,
    /// Stopped at the first failure.
    Aborted,
    /// Failures occurred but continue-on-error carried the run through.
    Mixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub id: String,
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// 0-based position in the config.
    pub sequence_index: usize,
    pub status: StepStatus,
    pub start_url: String,
    pub overrides: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<OperationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceResult {
    pub name: String,
    pub status: SequenceStatus,
    pub steps: Vec<StepResult>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

/// Seam between the runner and the operations facade.
#[async_trait]
pub trait OperationInvoker: Send + Sync {
    fn has_operation(&self, name: &str) -> bool;
    async fn invoke(
        &self,
        task_id: &str,
        operation: &str,
        start_url: &str,
        overrides: serde_json::Value,
    ) -> Result<OperationResult, OrchestrationError>;
}

/// Run a sequence. Steps execute in order with no parallelism; each step's
/// failure either aborts the remainder or is carried per the
/// continue-on-error policy.
pub async fn run_sequence(
    invoker: &dyn OperationInvoker,
    bus: &TelemetryBus,
    input: SequenceRunInput,
) -> Result<SequenceResult, OrchestrationError> {
    let task_id = uuid::Uuid::new_v4().to_string();
    let config = &input.config;
    let sequence_continue = input.continue_on_error.unwrap_or(config.continue_on_error);
    let started_at = Utc::now();

    // Unknown operations fail the whole sequence before any step runs.
    for step in &config.steps {
        if !invoker.has_operation(&step.operation) {
            return Err(OrchestrationError::UnknownOperation(step.operation.clone()));
        }
    }

    bus.emit(TaskEvent::lifecycle(
        "sequence",
        &task_id,
        "started",
        serde_json::json!({
            "sequence": config.name,
            "stepCount": config.steps.len(),
            "context": input.context,
        }),
    ));

    let mut steps: Vec<StepResult> = Vec::with_capacity(config.steps.len());
    let mut any_failed = false;
    let mut aborted = false;

    for (index, step) in config.steps.iter().enumerate() {
        let start_url = step
            .start_url
            .clone()
            .or_else(|| input.start_url.clone())
            .or_else(|| config.start_url.clone());
        let start_url = match start_url {
            Some(url) => url,
            None => {
                return Err(OrchestrationError::InvalidInput(format!(
                    "step {} has no start URL (step, runtime, and config level are all empty)",
                    step.id
                )))
            }
        };

        // Shared < step < runtime, later wins. Runtime overrides match by
        // step id, then operation name, then index.
        let runtime = input
            .step_overrides
            .get(&step.id)
            .or_else(|| input.step_overrides.get(&step.operation))
            .or_else(|| input.step_overrides.get(&index.to_string()))
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        let effective_overrides = merge_override_values(&[
            &config.shared_overrides,
            &input.shared_overrides,
            &step.overrides,
            &runtime,
        ]);

        bus.emit(TaskEvent::progress(
            "sequence",
            &task_id,
            "step",
            serde_json::json!({
                "phase": "start",
                "step": step.id,
                "operation": step.operation,
                "index": index,
                "startUrl": start_url,
                "overrides": effective_overrides,
            }),
        ));

        let step_started = Utc::now();
        let invocation = invoker
            .invoke(&task_id, &step.operation, &start_url, effective_overrides.clone())
            .await;
        let elapsed_ms = (Utc::now() - step_started).num_milliseconds().max(0) as u64;

        let (status, result, error) = match invocation {
            Ok(result) => {
                let status = match result.status {
                    ResultStatus::Ok => StepStatus::Ok,
                    ResultStatus::Error => StepStatus::Error,
                };
                let error = result.error.clone();
                (status, Some(result), error)
            }
            Err(e) => (
                StepStatus::Error,
                None,
                Some(ErrorInfo {
                    code: e.code().to_string(),
                    message: e.to_string(),
                }),
            ),
        };

        let failed = status == StepStatus::Error;
        bus.emit(TaskEvent::progress(
            "sequence",
            &task_id,
            "step",
            serde_json::json!({
                "phase": if failed { "failure" } else { "success" },
                "step": step.id,
                "index": index,
                "elapsedMs": elapsed_ms,
                "error": error,
            }),
        ));

        steps.push(StepResult {
            id: step.id.clone(),
            operation: step.operation.clone(),
            label: step.label.clone(),
            sequence_index: index,
            status,
            start_url,
            overrides: effective_overrides,
            result,
            error,
            started_at: step_started,
            elapsed_ms,
        });

        if failed {
            any_failed = true;
            if step.continue_on_error || sequence_continue {
                warn!(
                    "sequence {} step {} failed, continuing",
                    config.name, step.id
                );
                continue;
            }
            aborted = true;
            break;
        }
    }

    let status = if aborted {
        SequenceStatus::Aborted
    } else if any_failed {
        SequenceStatus::Mixed
    } else {
        SequenceStatus::Ok
    };

    let elapsed_ms = (Utc::now() - started_at).num_milliseconds().max(0) as u64;
    bus.emit(TaskEvent::lifecycle(
        "sequence",
        &task_id,
        "finished",
        serde_json::json!({
            "sequence": config.name,
            "status": status,
            "steps": steps.len(),
            "elapsedMs": elapsed_ms,
        }),
    ));
    info!(
        "sequence {} finished: {:?} after {} step(s)",
        config.name,
        status,
        steps.len()
    );

    Ok(SequenceResult {
        name: config.name.clone(),
        status,
        steps,
        started_at,
        elapsed_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Invoker that records calls and fails on demand.
    struct ScriptedInvoker {
        fail_operations: Vec<&'static str>,
        calls: Mutex<Vec<(String, String, serde_json::Value)>>,
    }

    impl ScriptedInvoker {
        fn new(fail_operations: Vec<&'static str>) -> Self {
            Self {
                fail_operations,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl OperationInvoker for ScriptedInvoker {
        fn has_operation(&self, name: &str) -> bool {
            name != "unknownOp"
        }

        async fn invoke(
            &self,
            _task_id: &str,
            operation: &str,
            start_url: &str,
            overrides: serde_json::Value,
        ) -> Result<OperationResult, OrchestrationError> {
            self.calls.lock().unwrap().push((
                operation.to_string(),
                start_url.to_string(),
                overrides,
            ));
            if self.fail_operations.contains(&operation) {
                return Err(OrchestrationError::InvalidInput(format!(
                    "{} exploded",
                    operation
                )));
            }
            Ok(OperationResult {
                status: ResultStatus::Ok,
                operation: operation.to_string(),
                elapsed_ms: 1,
                stats: None,
                error: None,
            })
        }
    }

    fn config(steps: Vec<SequenceStepConfig>, continue_on_error: bool) -> SequenceConfig {
        SequenceConfig {
            name: "evening-sequence".to_string(),
            host: None,
            start_url: Some("https://a.test/".to_string()),
            shared_overrides: serde_json::json!({"plannerVerbosity": 2}),
            continue_on_error,
            steps,
            metadata: SequenceMetadata {
                source: "test".to_string(),
                resolved_tokens: Vec::new(),
                warnings: Vec::new(),
            },
        }
    }

    fn step(id: &str, operation: &'static str) -> SequenceStepConfig {
        SequenceStepConfig {
            id: id.to_string(),
            operation: operation.to_string(),
            label: None,
            start_url: None,
            overrides: serde_json::Value::Null,
            continue_on_error: false,
        }
    }

    fn input(config: SequenceConfig) -> SequenceRunInput {
        SequenceRunInput {
            config,
            start_url: None,
            shared_overrides: serde_json::Value::Null,
            step_overrides: HashMap::new(),
            continue_on_error: None,
            context: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_all_steps_ok() {
        let invoker = ScriptedInvoker::new(vec![]);
        let bus = TelemetryBus::new(None);
        let result = run_sequence(
            &invoker,
            &bus,
            input(config(
                vec![step("a", "ensureCountryHubs"), step("b", "exploreCountryHubs")],
                false,
            )),
        )
        .await
        .unwrap();

        assert_eq!(result.status, SequenceStatus::Ok);
        assert_eq!(result.steps.len(), 2);
        assert_eq!(result.steps[0].sequence_index, 0);
        assert_eq!(result.steps[1].sequence_index, 1);
        // Shared overrides flowed into every step
        assert_eq!(result.steps[0].overrides["plannerVerbosity"], 2);
    }

    #[tokio::test]
    async fn test_abort_on_first_failure() {
        let invoker = ScriptedInvoker::new(vec!["exploreCountryHubs"]);
        let bus = TelemetryBus::new(None);
        let result = run_sequence(
            &invoker,
            &bus,
            input(config(
                vec![
                    step("a", "ensureCountryHubs"),
                    step("b", "exploreCountryHubs"),
                    step("c", "discoverTopicHubs"),
                ],
                false,
            )),
        )
        .await
        .unwrap();

        assert_eq!(result.status, SequenceStatus::Aborted);
        assert_eq!(result.steps.len(), 2);
        assert_eq!(result.steps[1].status, StepStatus::Error);
        assert!(result.steps[1].error.as_ref().unwrap().message.contains("exploded"));
    }

    #[tokio::test]
    async fn test_continue_on_error_gives_mixed() {
        let invoker = ScriptedInvoker::new(vec!["exploreCountryHubs"]);
        let bus = TelemetryBus::new(None);
        let mut run_input = input(config(
            vec![
                step("a", "ensureCountryHubs"),
                step("b", "exploreCountryHubs"),
                step("c", "discoverTopicHubs"),
            ],
            false,
        ));
        run_input.continue_on_error = Some(true);
        let result = run_sequence(&invoker, &bus, run_input).await.unwrap();

        assert_eq!(result.status, SequenceStatus::Mixed);
        assert_eq!(result.steps.len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_operation_fails_fast() {
        let invoker = ScriptedInvoker::new(vec![]);
        let bus = TelemetryBus::new(None);
        let result = run_sequence(
            &invoker,
            &bus,
            input(config(
                vec![step("a", "ensureCountryHubs"), step("b", "unknownOp")],
                false,
            )),
        )
        .await;

        assert!(matches!(
            result,
            Err(OrchestrationError::UnknownOperation(_))
        ));
        // Nothing ran
        assert!(invoker.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_override_layering_runtime_wins() {
        let invoker = ScriptedInvoker::new(vec![]);
        let bus = TelemetryBus::new(None);

        let mut step_a = step("a", "ensureCountryHubs");
        step_a.overrides = serde_json::json!({"apply": false, "placeLimit": 3});
        let mut run_input = input(config(vec![step_a], false));
        run_input
            .step_overrides
            .insert("a".to_string(), serde_json::json!({"apply": true}));

        let result = run_sequence(&invoker, &bus, run_input).await.unwrap();
        let overrides = &result.steps[0].overrides;
        assert_eq!(overrides["apply"], true);
        assert_eq!(overrides["placeLimit"], 3);
        assert_eq!(overrides["plannerVerbosity"], 2);
    }

    #[tokio::test]
    async fn test_start_url_precedence() {
        let invoker = ScriptedInvoker::new(vec![]);
        let bus = TelemetryBus::new(None);

        let mut step_a = step("a", "ensureCountryHubs");
        step_a.start_url = Some("https://step.test/".to_string());
        let step_b = step("b", "ensureCountryHubs");

        let mut run_input = input(config(vec![step_a, step_b], false));
        run_input.start_url = Some("https://runtime.test/".to_string());

        let result = run_sequence(&invoker, &bus, run_input).await.unwrap();
        assert_eq!(result.steps[0].start_url, "https://step.test/");
        assert_eq!(result.steps[1].start_url, "https://runtime.test/");
    }
}
