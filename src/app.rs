//! Top-level application wiring and lifecycle (SPEC_FULL §F.3).
//!
//! Every process-wide singleton (embedding gate, store adapters, consumer)
//! is constructed here and handed to the components that need it — spec
//! §9's "dependency-injected ... rather than global" applies to the whole
//! binary, not just the embedding gate (which additionally keeps a true
//! process-global handle for `encode_one`/`encode_batch` call sites deep in
//! the indexer and search engine, per spec §4.1).

use std::sync::Arc;

use tracing::info;

use crate::config::AppConfig;
use crate::consumer::IngestConsumer;
use crate::embedding::{CandleBertEmbedder, Embedder, EmbeddingGate};
use crate::error::Result;
use crate::http::build_router;
use crate::http::server;
use crate::http::state::AppState;
use crate::indexer::Indexer;
use crate::lexical::{EsLexicalStore, LexicalStoreAdapter};
use crate::search::HybridSearchEngine;
use crate::source::CandidateSourceClient;
use crate::vector::{MilvusVectorStore, VectorStoreAdapter};

pub struct Application {
    config: AppConfig,
    state: AppState,
}

impl Application {
    /// Build every collaborator and wire them together. Eagerly warms up
    /// the embedding model (spec §9: "eager warm-up at startup is
    /// equivalent and simpler" than the spec's lazy first-use option) and
    /// bootstraps the lexical alias (SPEC_FULL §F.1) before returning;
    /// both are fatal-on-failure, matching spec §4.1/§7's posture for
    /// model-load and configuration errors.
    pub async fn bootstrap(config: AppConfig) -> Result<Arc<Self>> {
        let lexical: Arc<dyn LexicalStoreAdapter> =
            Arc::new(EsLexicalStore::new(&config.elasticsearch_url)?);
        let vector: Arc<dyn VectorStoreAdapter> =
            Arc::new(MilvusVectorStore::new(config.milvus_url())?);
        let source = Arc::new(CandidateSourceClient::new(&config.candidate_api_url)?);

        let embedder: Arc<dyn Embedder> =
            Arc::new(CandleBertEmbedder::new(&config.sentence_model_name).await?);
        let gate = EmbeddingGate::init(embedder).await?;

        lexical.ensure_alias_exists(&config.candidate_alias).await?;
        vector
            .ensure_collection(&config.vector_collection, gate.dimension())
            .await?;

        let indexer = Arc::new(Indexer::new(
            lexical.clone(),
            vector.clone(),
            source,
            gate.clone(),
            config.candidate_alias.clone(),
            config.vector_collection.clone(),
            config.batch_size,
        ));

        let search_engine = Arc::new(HybridSearchEngine::new(
            lexical.clone(),
            vector.clone(),
            gate,
            config.candidate_alias.clone(),
            config.vector_collection.clone(),
            config.rrf_k,
        ));

        let consumer = Arc::new(IngestConsumer::new(
            config.rabbitmq_url(),
            config.candidate_exchange_name.clone(),
            indexer.clone(),
        ));

        let state = AppState {
            search_engine,
            indexer,
            lexical,
            vector,
            consumer,
            vector_collection: config.vector_collection.clone(),
        };

        Ok(Arc::new(Self { config, state }))
    }

    /// Start the ingest consumer, serve HTTP until a shutdown signal
    /// arrives, then shut down cooperatively. Blocks for the lifetime of
    /// the process.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        self.state.consumer.start().await?;

        let addr = self.config.socket_addr()?;
        let router = build_router(self.state.clone());

        info!(%addr, "HTTP server listening");
        let shutdown_app = self.clone();
        server::serve(router, addr, async move {
            wait_for_shutdown_signal().await;
            shutdown_app.shutdown().await;
        })
        .await
    }

    /// Cooperative shutdown (spec §5): cancel the consume task and close
    /// the message bus connection. Store adapters here are stateless HTTP
    /// clients with no persistent connection to close (unlike the upstream
    /// Python service's explicit `milvus_client.disconnect()`), so the
    /// "close connections in reverse dependency order" guidance collapses
    /// to the one collaborator that actually holds a connection.
    pub async fn shutdown(&self) {
        info!("shutting down");
        self.state.consumer.shutdown().await;
    }
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
