//! Route handlers (spec §6). Each handler is a thin translation between
//! wire JSON and the engine/indexer types; no business logic lives here.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::candidate::SearchFilters;
use crate::error::Result;
use crate::http::state::AppState;
use crate::indexer::unix_now;
use crate::search::ScoredCandidate;

/// `GET /` — liveness-independent informational route (SPEC_FULL §F.2).
pub async fn root() -> impl IntoResponse {
    Json(json!({
        "service": "candidate-hybrid-search",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(serde::Serialize)]
struct SearchResponse {
    results: Vec<ScoredCandidate>,
}

/// `POST /v1/search/` (spec §6). Body is a `SearchFilters`; 500 on internal
/// failure, 400 on validation failure (via `SearchServiceError`'s
/// `IntoResponse`).
pub async fn search(
    State(state): State<AppState>,
    Json(filters): Json<SearchFilters>,
) -> Result<Json<SearchResponse>> {
    let results = state.search_engine.search(filters).await?;
    Ok(Json(SearchResponse { results }))
}

#[derive(serde::Serialize)]
struct RebuildResponse {
    message: String,
    task_id: Uuid,
}

/// `POST /v1/search/index/rebuild` (spec §6). Starts the full reindex as a
/// detached background task and returns immediately; the job continues
/// past the response (SPEC_FULL §F.4: no status endpoint is exposed for it).
pub async fn rebuild(State(state): State<AppState>) -> impl IntoResponse {
    let task_id = Uuid::new_v4();
    let indexer = state.indexer.clone();

    tokio::spawn(async move {
        info!(%task_id, "full reindex started");
        match indexer.full_reindex(unix_now()).await {
            Ok(report) => info!(%task_id, index = %report.index, total = report.candidates_indexed, "full reindex completed"),
            Err(err) => error!(%task_id, %err, "full reindex aborted"),
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(RebuildResponse {
            message: "reindex started".to_string(),
            task_id,
        }),
    )
}

/// `GET /health` (spec §6): 200 if the lexical store is reachable, the ANN
/// collection exists, and the message bus connection is open; 503
/// otherwise with a reason.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let lexical_ok = state.lexical.ping().await.unwrap_or(false);
    let vector_ok = state
        .vector
        .collection_exists(&state.vector_collection)
        .await
        .unwrap_or(false);
    let bus_ok = state.consumer.check_connection();

    if lexical_ok && vector_ok && bus_ok {
        return (StatusCode::OK, Json(json!({ "status": "ok" })));
    }

    let mut reasons = Vec::new();
    if !lexical_ok {
        reasons.push("lexical store unreachable");
    }
    if !vector_ok {
        reasons.push("vector collection unavailable");
    }
    if !bus_ok {
        reasons.push("message bus connection closed");
    }

    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "status": "unhealthy", "reason": reasons.join(", ") })),
    )
}
