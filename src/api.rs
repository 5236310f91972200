//! HTTP surface for Pagescout.
//!
//! This module exposes a compact Axum router with a handful of endpoints:
//!
//! - `POST /search` – Run a relevance batch and stream NDJSON status events
//!   as documents move through the pipeline. The request names a query and,
//!   optionally, a grade filter and an explicit list of candidate PDF URLs;
//!   when no URLs are supplied, discovery runs inside the batch.
//! - `GET /search/history` – List the most recent recorded searches.
//! - `GET /metrics` – Observe processing counters and pool concurrency.
//! - `GET /health` – Liveness probe.

use crate::discovery::SearchClient;
use crate::metrics::ProcessingMetrics;
use crate::pipeline::DocumentProcessor;
use crate::pool::WorkerPool;
use crate::protocol::{BatchRequest, run_batch};
use crate::store::Store;
use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures_util::StreamExt;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{error, warn};

/// Shared state behind every endpoint. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Discovery client for batches without explicit links.
    pub search: Arc<SearchClient>,
    /// The per-document pipeline.
    pub processor: Arc<dyn DocumentProcessor>,
    /// Worker pool bounding pipeline concurrency.
    pub pool: WorkerPool,
    /// Record store for search history.
    pub store: Store,
    /// Processing counters.
    pub metrics: Arc<ProcessingMetrics>,
}

/// Build the HTTP router exposing the search API surface.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/search", post(search))
        .route("/search/history", get(search_history))
        .route("/metrics", get(get_metrics))
        .route("/health", get(health))
        .with_state(state)
}

async fn search(State(state): State<AppState>, Json(request): Json<BatchRequest>) -> Response {
    if request.query.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "status": "error",
                "message": "query must not be empty",
            })),
        )
            .into_response();
    }

    // History is best-effort; a write failure must not block the search.
    if let Err(db_error) = state
        .store
        .record_search(&request.query, request.grade.as_deref())
        .await
    {
        warn!(error = %db_error, "Failed to record search history entry");
    }

    let events = run_batch(state.search, state.processor, state.pool, request);
    let body = Body::from_stream(events.map(|event| Ok::<_, Infallible>(event.to_ndjson())));

    (
        [
            (header::CONTENT_TYPE, "application/x-ndjson"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}

async fn search_history(State(state): State<AppState>) -> Response {
    match state.store.recent_searches(20).await {
        Ok(entries) => Json(json!({ "history": entries })).into_response(),
        Err(db_error) => {
            error!(error = %db_error, "Failed to load search history");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "failed to load search history" })),
            )
                .into_response()
        }
    }
}

async fn get_metrics(State(state): State<AppState>) -> Response {
    let snapshot = state.metrics.snapshot();
    Json(json!({
        "documents_processed": snapshot.documents_processed,
        "documents_failed": snapshot.documents_failed,
        "cache_hits": snapshot.cache_hits,
        "workers_active": state.pool.active_now(),
        "workers_peak": state.pool.peak_active(),
    }))
    .into_response()
}

async fn health() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}
