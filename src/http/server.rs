//! Axum router assembly and the HTTP listen loop, following the teacher
//! server crate's `build_router`/`start_server` split (spec §6).

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::error::Result;
use crate::error::SearchServiceError;
use crate::http::routes;
use crate::http::state::AppState;

/// Default request timeout for the search/rebuild/health surface. The spec
/// names no HTTP-level timeout; this is a defensive ceiling, not a spec
/// requirement, matching the teacher server crate's own `TimeoutLayer` use.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Caps concurrent in-flight requests so a burst of `/v1/search/` calls
/// can't starve the bounded embedding worker pool behind it.
const MAX_CONCURRENT_REQUESTS: usize = 64;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::root))
        .route("/health", get(routes::health))
        .route("/v1/search/", post(routes::search))
        .route("/v1/search/index/rebuild", post(routes::rebuild))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve `app` until `shutdown` resolves.
pub async fn serve(app: Router, addr: SocketAddr, shutdown: impl std::future::Future<Output = ()> + Send + 'static) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| SearchServiceError::internal(format!("failed to bind {addr}: {err}")))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|err| SearchServiceError::internal(format!("HTTP server error: {err}")))
}
