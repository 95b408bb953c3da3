//! Shared application state handed to every Axum handler, following the
//! teacher server crate's `ServerState` (spec §9: "dependency-injected into
//! components at startup rather than global").

use std::sync::Arc;

use crate::consumer::IngestConsumer;
use crate::indexer::Indexer;
use crate::lexical::LexicalStoreAdapter;
use crate::search::HybridSearchEngine;
use crate::vector::VectorStoreAdapter;

#[derive(Clone)]
pub struct AppState {
    pub search_engine: Arc<HybridSearchEngine>,
    pub indexer: Arc<Indexer>,
    pub lexical: Arc<dyn LexicalStoreAdapter>,
    pub vector: Arc<dyn VectorStoreAdapter>,
    pub consumer: Arc<IngestConsumer>,
    pub vector_collection: String,
}
