//! The `Embedder` trait: the pure-function boundary the spec draws around
//! the embedding model (spec §1, "out of scope: the embedding model").
//!
//! Everything downstream of this trait (the gate's cache, the worker pool)
//! is in scope; everything behind it is a black box that turns text into a
//! fixed-length vector.

use async_trait::async_trait;

use crate::error::Result;

/// Embedding dimension fixed by the vector store schema (spec §3, §6).
pub const EMBEDDING_DIM: usize = 768;

/// A model that turns text into `EMBEDDING_DIM`-length vectors.
///
/// Implementations are expected to be `Send + Sync` and safe to call
/// concurrently; the gate serializes access through its worker pool, not
/// through this trait.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Encode a single piece of text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>>;

    /// Encode a batch of texts. Implementations should prefer a single
    /// model invocation over a loop of `embed_one` calls where the
    /// underlying model supports batching.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Output vector dimension. Always `EMBEDDING_DIM` for this service.
    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }

    /// A warm-up call made once after the model is loaded, to pay any
    /// lazy-initialization cost (first CUDA kernel launch, tokenizer
    /// vocabulary build, etc.) before the gate starts serving traffic.
    async fn warm_up(&self) -> Result<()> {
        self.embed_one("warm up").await.map(|_| ())
    }
}
