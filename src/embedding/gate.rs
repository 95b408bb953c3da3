//! C1 — Embedding Gate.
//!
//! Single point of access to the embedding model: a bounded LRU cache over
//! exact query text in front of the model, and a dedicated worker pool
//! behind it so embedding never contends with the I/O scheduler.
//!
//! The spec describes lazy, first-use initialization of the process-global
//! model instance; per the design notes this is an optimization, not a
//! requirement, so this service initializes the gate eagerly at startup
//! (`EmbeddingGate::init`) and treats a failure there as fatal, which is
//! strictly simpler and observably equivalent: either way there is exactly
//! one model instance, created once, and its failure to load stops the
//! process before it serves traffic.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{info, instrument, warn};

use lru::LruCache;
use std::num::NonZeroUsize;

use crate::embedding::embedder::Embedder;
use crate::embedding::worker_pool::EmbeddingWorkerPool;
use crate::error::{Result, SearchServiceError};

/// Capacity of the query-embedding LRU cache (spec §4.1).
pub const QUERY_CACHE_CAPACITY: usize = 1024;

static GATE: OnceCell<Arc<EmbeddingGate>> = OnceCell::new();

pub struct EmbeddingGate {
    embedder: Arc<dyn Embedder>,
    pool: EmbeddingWorkerPool,
    /// Keyed by exact normalized query text. `parking_lot::Mutex` because
    /// the critical section is cache-only bookkeeping, never an await point.
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl EmbeddingGate {
    fn new(embedder: Arc<dyn Embedder>, pool: EmbeddingWorkerPool) -> Self {
        Self {
            embedder,
            pool,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(QUERY_CACHE_CAPACITY).expect("capacity is nonzero"),
            )),
        }
    }

    /// Build a gate and warm the model up, without installing it as the
    /// process singleton. Used by `init` and directly by callers (tests,
    /// the indexer's own construction path) that want an owned instance
    /// rather than the global one.
    pub async fn build(embedder: Arc<dyn Embedder>) -> Result<Arc<EmbeddingGate>> {
        let pool = EmbeddingWorkerPool::new()?;

        embedder.warm_up().await.map_err(|err| {
            SearchServiceError::Embedding(format!("embedding model warm-up failed: {err}"))
        })?;
        info!("embedding model warmed up");

        Ok(Arc::new(EmbeddingGate::new(embedder, pool)))
    }

    /// Build the gate and install it as the process singleton. Must be
    /// called exactly once, before the gate is used; calling it twice is a
    /// programming error.
    #[instrument(skip_all)]
    pub async fn init(embedder: Arc<dyn Embedder>) -> Result<Arc<EmbeddingGate>> {
        let gate = Self::build(embedder).await?;
        GATE.set(gate.clone())
            .map_err(|_| SearchServiceError::internal("embedding gate already initialized"))?;
        Ok(gate)
    }

    /// Fetch the process-global gate. Panics if `init` has not completed —
    /// model-load failure is fatal and terminal per spec §4.1, so there is
    /// no code path where this is reachable without a live gate.
    pub fn global() -> Arc<EmbeddingGate> {
        GATE.get()
            .expect("embedding gate used before initialization")
            .clone()
    }

    /// Encode a single query, served from the LRU cache when possible.
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    pub async fn encode_one(&self, text: &str) -> Result<Vec<f32>> {
        let key = text.trim().to_string();

        if let Some(hit) = self.cache.lock().get(&key).cloned() {
            return Ok(hit);
        }

        let embedder = self.embedder.clone();
        let owned = key.clone();
        let vector = self
            .pool
            .run(async move { embedder.embed_one(&owned).await })
            .await?;

        self.cache.lock().put(key, vector.clone());
        Ok(vector)
    }

    /// Encode a batch of documents. Not cached: document text is rarely
    /// repeated verbatim across a reindex, so caching it would only grow
    /// memory for no hit rate.
    #[instrument(skip(self, texts), fields(batch_size = texts.len()))]
    pub async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let embedder = self.embedder.clone();
        let owned = texts.to_vec();
        self.pool
            .run(async move { embedder.embed_batch(&owned).await })
            .await
    }

    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    pub fn shutdown(self: Arc<Self>) {
        warn!("shutting down embedding worker pool");
        if let Ok(inner) = Arc::try_unwrap(self) {
            inner.pool.shutdown();
        }
    }
}
