use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use shipsync_order::RunPhase;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::metrics::SyncMetrics;

#[derive(Clone)]
pub struct OpsState {
    pub metrics: Arc<SyncMetrics>,
    pub phase: watch::Receiver<RunPhase>,
}

/// Ops endpoints: liveness and Prometheus scrape.
pub fn app(state: OpsState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(
    state: OpsState,
    port: u16,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Ops server listening on {}", addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(async move {
            // Sender dropped counts as shutdown too.
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
}

fn phase_label(phase: RunPhase) -> String {
    match phase {
        RunPhase::Idle => "idle".to_string(),
        RunPhase::Selecting => "selecting".to_string(),
        RunPhase::Processing(n) => format!("processing({})", n),
        RunPhase::Reporting => "reporting".to_string(),
    }
}

async fn health_handler(State(state): State<OpsState>) -> impl IntoResponse {
    let phase = *state.phase.borrow();
    let last_run = state.metrics.last_run_finished_seconds.get();
    let last_run_finished = (last_run > 0).then_some(last_run);
    Json(json!({
        "status": "healthy",
        "service": "shipsync",
        "phase": phase_label(phase),
        "last_run_finished": last_run_finished,
    }))
}

async fn metrics_handler(State(state): State<OpsState>) -> Response {
    let encoder = TextEncoder::new();
    let families = state.metrics.registry().gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    ([(header::CONTENT_TYPE, encoder.format_type().to_string())], buffer).into_response()
}
