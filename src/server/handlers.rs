//! HTTP request handlers.

use std::collections::HashMap;

use axum::extract::{Path, RawQuery, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use futures::stream::Stream;
use serde::Deserialize;

use crate::services::{OrchestrationError, RunConfigInput, RunPresetInput, SequenceConfigError};

use super::AppState;

/// Error envelope: `{status: "error", error: {code, message}}`.
pub struct ApiError {
    status: StatusCode,
    code: String,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "status": "error",
            "error": {"code": self.code, "message": self.message},
        });
        (self.status, Json(body)).into_response()
    }
}

impl From<OrchestrationError> for ApiError {
    fn from(error: OrchestrationError) -> Self {
        let status = match &error {
            OrchestrationError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            OrchestrationError::UnknownOperation(_) | OrchestrationError::UnknownJob(_) => {
                StatusCode::NOT_FOUND
            }
            OrchestrationError::JobConflict(_) => StatusCode::CONFLICT,
            OrchestrationError::SequenceConfig(SequenceConfigError::NotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            // Structural sequence faults are the client's problem, never a 500
            OrchestrationError::SequenceConfig(_) => StatusCode::BAD_REQUEST,
            OrchestrationError::Processing { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, error.code(), error.to_string())
    }
}

pub async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "hubscout",
        "framework": "axum",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `/v1/availability?all|operations|sequences`
pub async fn availability(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> impl IntoResponse {
    let scope = query.unwrap_or_else(|| "all".to_string());
    let availability = state.service.availability();

    let mut body = serde_json::Map::new();
    let totals = serde_json::json!({
        "operations": availability.operations.len(),
        "sequencePresets": availability.sequence_presets.len(),
    });
    match scope.as_str() {
        "operations" => {
            body.insert(
                "operations".to_string(),
                serde_json::to_value(&availability.operations).unwrap_or_default(),
            );
        }
        "sequences" => {
            body.insert(
                "sequencePresets".to_string(),
                serde_json::to_value(&availability.sequence_presets).unwrap_or_default(),
            );
        }
        _ => {
            body = match serde_json::to_value(&availability) {
                Ok(serde_json::Value::Object(map)) => map,
                _ => serde_json::Map::new(),
            };
        }
    }

    Json(serde_json::json!({
        "status": "ok",
        "availability": body,
        "totals": totals,
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOperationBody {
    pub start_url: Option<String>,
    #[serde(default)]
    pub overrides: serde_json::Value,
}

pub async fn run_operation(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Option<Json<RunOperationBody>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let start_url = require_start_url(body.start_url)?;

    let result = state
        .service
        .run_operation(&name, &start_url, body.overrides)
        .await?;

    Ok(Json(serde_json::json!({
        "status": "ok",
        "mode": "operation",
        "operation": name,
        "result": result,
    })))
}

pub async fn start_operation(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Option<Json<RunOperationBody>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let start_url = require_start_url(body.start_url)?;

    let job = state
        .service
        .start_operation(&name, &start_url, body.overrides)?;

    Ok(Json(serde_json::json!({
        "status": "ok",
        "mode": "operation-job",
        "jobId": job.id,
        "job": job,
    })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunPresetBody {
    pub start_url: Option<String>,
    #[serde(default)]
    pub shared_overrides: serde_json::Value,
    #[serde(default)]
    pub step_overrides: HashMap<String, serde_json::Value>,
    pub continue_on_error: Option<bool>,
    #[serde(default)]
    pub context: serde_json::Value,
}

pub async fn run_sequence_preset(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Option<Json<RunPresetBody>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();

    let result = state
        .service
        .run_sequence_preset(RunPresetInput {
            sequence_name: name.clone(),
            start_url: body.start_url,
            shared_overrides: body.shared_overrides,
            step_overrides: body.step_overrides,
            continue_on_error: body.continue_on_error,
            context: body.context,
        })
        .await?;

    Ok(Json(serde_json::json!({
        "status": "ok",
        "mode": "sequence-preset",
        "sequence": name,
        "result": result,
    })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfigBody {
    pub config_dir: Option<String>,
    pub config_host: Option<String>,
    pub start_url: Option<String>,
    #[serde(default)]
    pub shared_overrides: serde_json::Value,
    #[serde(default)]
    pub step_overrides: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub config_cli_overrides: serde_json::Value,
    pub continue_on_error: Option<bool>,
}

pub async fn run_sequence_config(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Option<Json<RunConfigBody>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();

    let (result, metadata) = state
        .service
        .run_sequence_config(RunConfigInput {
            sequence_config_name: name.clone(),
            config_dir: body.config_dir.map(std::path::PathBuf::from),
            config_host: body.config_host,
            start_url: body.start_url,
            shared_overrides: body.shared_overrides,
            step_overrides: body.step_overrides,
            config_cli_overrides: body.config_cli_overrides,
            continue_on_error: body.continue_on_error,
        })
        .await?;

    Ok(Json(serde_json::json!({
        "status": "ok",
        "mode": "sequence-config",
        "sequenceConfig": name,
        "result": result,
        "metadata": metadata,
    })))
}

pub async fn list_jobs(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "jobs": state.service.jobs().list(),
    }))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let job = state
        .service
        .jobs()
        .get(&id)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "UNKNOWN_JOB", format!("unknown job: {}", id)))?;
    Ok(Json(serde_json::json!({"status": "ok", "job": job})))
}

pub async fn pause_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let job = state.service.jobs().pause(&id)?;
    Ok(Json(serde_json::json!({"status": "ok", "job": job})))
}

pub async fn resume_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let job = state.service.jobs().resume(&id)?;
    Ok(Json(serde_json::json!({"status": "ok", "job": job})))
}

pub async fn stop_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let job = state.service.jobs().stop(&id)?;
    Ok(Json(serde_json::json!({"status": "ok", "job": job})))
}

/// `/events`: live task event stream.
pub async fn events_sse(State(state): State<AppState>) -> impl IntoResponse {
    let rx = state.service.bus().subscribe();
    Sse::new(make_event_stream(rx)).keep_alive(KeepAlive::default())
}

fn make_event_stream(
    mut rx: tokio::sync::broadcast::Receiver<crate::models::TaskEvent>,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let name = format!("{}.{}", event.category.as_str(), event.event_type);
                    let data = serde_json::to_string(&event).unwrap_or_default();
                    yield Ok(Event::default().event(name).data(data));
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    let msg = format!("{{\"warning\":\"missed {n} events\"}}");
                    yield Ok(Event::default().event("warning").data(msg));
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    break;
                }
            }
        }
    }
}

fn require_start_url(start_url: Option<String>) -> Result<String, ApiError> {
    match start_url {
        Some(url) if !url.trim().is_empty() => Ok(url),
        _ => Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "BAD_REQUEST",
            "startUrl is required",
        )),
    }
}
