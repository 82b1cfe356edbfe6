//! JSON/SSE service surface for launching operations and sequences and
//! following job telemetry.

#![allow(dead_code)]

mod handlers;
mod routes;

pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::services::CrawlService;

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CrawlService>,
}

/// Start the web server.
pub async fn serve(service: Arc<CrawlService>, host: &str, port: u16) -> anyhow::Result<()> {
    let state = AppState { service };
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
