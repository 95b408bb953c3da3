//! C1 — Embedding Gate: the embedder trait, its candle-based default
//! implementation, the dedicated worker pool, and the cached gate in front
//! of all three.

pub mod candle_bert_embedder;
pub mod embedder;
pub mod gate;
pub mod worker_pool;

pub use candle_bert_embedder::CandleBertEmbedder;
pub use embedder::{EMBEDDING_DIM, Embedder};
pub use gate::EmbeddingGate;
pub use worker_pool::{EMBEDDING_WORKER_POOL_SIZE, EmbeddingWorkerPool};
