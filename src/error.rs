//! Crate-wide error type and `Result` alias.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Errors produced by any component of the search service.
///
/// Adapters and engines return this type uniformly so that the HTTP layer
/// and the ingest consumer can each apply their own disposition policy
/// (status code vs. ack/reject) without matching on string messages.
#[derive(Debug, Error)]
pub enum SearchServiceError {
    /// A request or message failed schema/range validation before any I/O
    /// was attempted. HTTP maps this to 4xx, the consumer to reject-no-requeue.
    #[error("validation error: {0}")]
    Validation(String),

    /// A call to the lexical store (Elasticsearch-shaped) failed.
    #[error("lexical store error: {0}")]
    LexicalStore(String),

    /// A call to the vector store (Milvus-shaped) failed.
    #[error("vector store error: {0}")]
    VectorStore(String),

    /// The upstream candidate API failed after exhausting retries.
    #[error("candidate source error: {0}")]
    CandidateSource(String),

    /// The embedding model failed to load or to encode text.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// The message bus connection or channel failed.
    #[error("message bus error: {0}")]
    MessageBus(String),

    /// Configuration was missing or invalid at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Catch-all for failures that don't need a distinct disposition.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SearchServiceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error represents a caller mistake (as opposed to a
    /// transient or internal failure). Used by the consumer to decide
    /// reject-no-requeue vs. plain reject, and by the HTTP layer for 4xx vs 5xx.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, SearchServiceError>;

/// Translates to the HTTP status codes implied by spec §6/§7: validation
/// failures are the caller's fault (4xx), everything else is an internal
/// failure (500) — the search endpoint has no 404/409 cases of its own.
impl IntoResponse for SearchServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            SearchServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
