//! A dedicated worker pool for CPU-bound embedding work, kept strictly
//! separate from the I/O scheduler (spec §5: "embedding never runs on the
//! I/O scheduler").
//!
//! Adapted from the teacher library's `EmbedderExecutor`: a private
//! multi-threaded Tokio runtime sized to the spec's fixed worker count,
//! with work handed to it by spawning onto its handle and awaiting the
//! result on the caller's own (I/O) runtime. This is *not* the same
//! abstraction as `tokio::task::spawn_blocking`, which shares the default
//! blocking pool with the rest of the process; a private runtime gives the
//! spec's "bounded, explicit construct" its own thread budget.

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};

use crate::error::{Result, SearchServiceError};

/// Fixed worker count mandated by spec §4.8 / §5.
pub const EMBEDDING_WORKER_POOL_SIZE: usize = 4;

#[derive(Clone)]
pub struct EmbeddingWorkerPool {
    runtime: Arc<Runtime>,
}

impl EmbeddingWorkerPool {
    pub fn new() -> Result<Self> {
        Self::with_size(EMBEDDING_WORKER_POOL_SIZE)
    }

    pub fn with_size(size: usize) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(size.max(1))
            .thread_name("embedding-worker")
            .enable_all()
            .build()
            .map_err(|err| {
                SearchServiceError::Embedding(format!(
                    "failed to initialize embedding worker pool: {err}"
                ))
            })?;
        Ok(Self {
            runtime: Arc::new(runtime),
        })
    }

    /// Run `future` on the worker pool and await its completion from the
    /// calling (I/O) task without blocking that task's own executor thread.
    pub async fn run<F, T>(&self, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let handle = self.runtime.handle().clone();
        handle
            .spawn(future)
            .await
            .map_err(|err| SearchServiceError::Embedding(format!("worker pool task panicked: {err}")))?
    }

    /// Shut the pool down, draining in-flight work. Called during
    /// cooperative application shutdown (spec §5).
    pub fn shutdown(self) {
        if let Ok(runtime) = Arc::try_unwrap(self.runtime) {
            runtime.shutdown_background();
        }
    }
}
