//! Router configuration for the service API.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use super::handlers;
use super::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        // Availability
        .route("/v1/availability", get(handlers::availability))
        // Operations
        .route("/v1/operations/:name/run", post(handlers::run_operation))
        .route(
            "/v1/operations/:name/start",
            post(handlers::start_operation),
        )
        // Sequences
        .route(
            "/v1/sequences/presets/:name/run",
            post(handlers::run_sequence_preset),
        )
        .route(
            "/v1/sequences/configs/:name/run",
            post(handlers::run_sequence_config),
        )
        // Jobs
        .route("/v1/jobs", get(handlers::list_jobs))
        .route("/v1/jobs/:id", get(handlers::get_job))
        .route("/v1/jobs/:id/pause", post(handlers::pause_job))
        .route("/v1/jobs/:id/resume", post(handlers::resume_job))
        .route("/v1/jobs/:id/stop", post(handlers::stop_job))
        // Telemetry stream
        .route("/events", get(handlers::events_sse))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
