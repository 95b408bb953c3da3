//! C6 — Indexer: keeps the lexical and vector stores consistent, both
//! incrementally (per-candidate upsert/delete) and via periodic zero-downtime
//! full reindexes (spec §4.6).

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, instrument, warn};

use crate::candidate::{Candidate, DocumentProjector};
use crate::embedding::EmbeddingGate;
use crate::error::Result;
use crate::lexical::LexicalStoreAdapter;
use crate::source::CandidateSourceClient;
use crate::vector::VectorStoreAdapter;

/// Candidates fetched per page during a full reindex (spec §6, `BATCH_SIZE`).
pub const DEFAULT_BATCH_SIZE: usize = 500;

pub struct Indexer {
    lexical: Arc<dyn LexicalStoreAdapter>,
    vector: Arc<dyn VectorStoreAdapter>,
    source: Arc<CandidateSourceClient>,
    gate: Arc<EmbeddingGate>,
    alias: String,
    vector_collection: String,
    batch_size: usize,
}

impl Indexer {
    pub fn new(
        lexical: Arc<dyn LexicalStoreAdapter>,
        vector: Arc<dyn VectorStoreAdapter>,
        source: Arc<CandidateSourceClient>,
        gate: Arc<EmbeddingGate>,
        alias: impl Into<String>,
        vector_collection: impl Into<String>,
        batch_size: usize,
    ) -> Self {
        Self {
            lexical,
            vector,
            source,
            gate,
            alias: alias.into(),
            vector_collection: vector_collection.into(),
            batch_size,
        }
    }

    /// Incrementally upsert one candidate into both stores (spec §4.8,
    /// `candidate.created`/`candidate.updated`). Treats every update as a
    /// full snapshot of the candidate, not a partial patch: the upstream
    /// event always carries the complete candidate document.
    #[instrument(skip(self, candidate), fields(candidate_id = %candidate.id))]
    pub async fn upsert(&self, candidate: &Candidate) -> Result<()> {
        let doc = DocumentProjector::to_lexical(candidate)?;
        self.lexical.index(&self.alias, &doc).await?;

        let semantic_text = DocumentProjector::to_semantic_text(candidate);
        if !semantic_text.is_empty() {
            let vector = self.gate.encode_one(&semantic_text).await?;
            self.vector.upsert(&self.vector_collection, &candidate.id, &vector).await?;
        }

        Ok(())
    }

    /// Remove a candidate from both stores (spec §4.8, `candidate.deleted`).
    #[instrument(skip(self))]
    pub async fn delete(&self, candidate_id: &str) -> Result<()> {
        self.lexical.delete_by_id(&self.alias, candidate_id).await?;
        self.vector.delete(&self.vector_collection, candidate_id).await?;
        Ok(())
    }

    /// Rebuild both stores from scratch behind a fresh index, then swap the
    /// lexical alias atomically (spec §4.6). Steps:
    ///
    /// 1. Create a new, timestamped lexical index with the candidate mapping.
    /// 2. Drop and recreate the ANN collection empty.
    /// 3. Page through the candidate source, projecting and bulk-indexing
    ///    into the new index and upserting embeddings into the vector store.
    /// 4. Swap the alias onto the new index and remove it from any old ones,
    ///    in a single atomic call.
    /// 5. Drop the old lexical indices (best-effort; failure here is logged
    ///    but not fatal, since the alias already points at the live data).
    ///
    /// If any step before the swap fails, the live alias is left untouched
    /// and the new index is abandoned — online writes against the old alias
    /// are uninterrupted throughout. The ANN collection is shared (not
    /// timestamped like the lexical index) because the vector store has no
    /// alias concept; recreating it empty accepts the same loss window for
    /// mid-rebuild vector writes that spec §9 already accepts for the
    /// lexical side.
    #[instrument(skip(self, now_unix_secs))]
    pub async fn full_reindex(&self, now_unix_secs: u64) -> Result<ReindexReport> {
        let new_index = format!("{}-{now_unix_secs}", self.alias);
        self.lexical.create_index(&new_index).await?;

        self.vector.drop_collection(&self.vector_collection).await.unwrap_or_else(|err| {
            warn!(%err, "no prior ANN collection to drop, continuing");
        });
        self.vector
            .ensure_collection(&self.vector_collection, self.gate.dimension())
            .await?;

        let old_indices = self.lexical.list_indices_for_alias(&self.alias).await.unwrap_or_default();

        let mut offset = 0;
        let mut total = 0usize;
        loop {
            let page = self.source.fetch_batch(self.batch_size, offset).await?;
            if page.is_empty() {
                break;
            }
            let page_len = page.len();

            let lexical_docs: Vec<_> = page
                .iter()
                .filter_map(|c| DocumentProjector::to_lexical(c).ok())
                .collect();
            let bulk_result = self.lexical.bulk_index(&new_index, &lexical_docs).await?;
            if !bulk_result.failures.is_empty() {
                warn!(
                    failed = bulk_result.failures.len(),
                    ids = ?bulk_result.failures,
                    "some documents failed to bulk-index, excluded from candidates_indexed"
                );
            }

            let mut rows = Vec::with_capacity(page.len());
            for candidate in &page {
                let text = DocumentProjector::to_semantic_text(candidate);
                if text.is_empty() {
                    continue;
                }
                let vector = self.gate.encode_one(&text).await?;
                rows.push((candidate.id.clone(), vector));
            }
            self.vector.upsert_batch(&self.vector_collection, &rows).await?;

            total += bulk_result.success_count;
            info!(offset, page_len, indexed = bulk_result.success_count, total, "reindex page processed");
            offset += self.batch_size;
        }

        self.lexical.swap_alias(&self.alias, &new_index, &old_indices).await?;
        info!(new_index, total, "alias swapped onto new index");

        for old in &old_indices {
            if let Err(err) = self.lexical.drop_index(old).await {
                warn!(old_index = %old, %err, "failed to drop stale index, leaving it in place");
            }
        }

        Ok(ReindexReport {
            index: new_index,
            candidates_indexed: total,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ReindexReport {
    pub index: String,
    pub candidates_indexed: usize,
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::{Candidate, LexicalDoc};
    use crate::embedding::Embedder;
    use crate::lexical::{BulkResult, LexicalHit};
    use crate::vector::VectorHit;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::Value;

    struct StubEmbedder;
    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed_one(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.1; 768])
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.1; 768]).collect())
        }
    }

    #[derive(Default)]
    struct StubLexicalStore {
        indexed: Mutex<Vec<(String, String)>>,
        deleted: Mutex<Vec<String>>,
        swapped: Mutex<Option<(String, String, Vec<String>)>>,
    }

    #[async_trait]
    impl LexicalStoreAdapter for StubLexicalStore {
        async fn search(&self, _alias: &str, _query: &Value, _size: usize) -> Result<Vec<LexicalHit>> {
            Ok(Vec::new())
        }
        async fn index(&self, index: &str, doc: &LexicalDoc) -> Result<()> {
            self.indexed.lock().push((index.to_string(), doc.id.clone()));
            Ok(())
        }
        async fn bulk_index(&self, index: &str, docs: &[LexicalDoc]) -> Result<BulkResult> {
            for doc in docs {
                self.indexed.lock().push((index.to_string(), doc.id.clone()));
            }
            Ok(BulkResult { success_count: docs.len(), failures: Vec::new() })
        }
        async fn delete_by_id(&self, _alias: &str, id: &str) -> Result<()> {
            self.deleted.lock().push(id.to_string());
            Ok(())
        }
        async fn create_index(&self, _index: &str) -> Result<()> {
            Ok(())
        }
        async fn drop_index(&self, _index: &str) -> Result<()> {
            Ok(())
        }
        async fn list_indices_for_alias(&self, _alias: &str) -> Result<Vec<String>> {
            Ok(vec!["candidates-old".into()])
        }
        async fn swap_alias(&self, alias: &str, new_index: &str, old_indices: &[String]) -> Result<()> {
            *self.swapped.lock() = Some((alias.to_string(), new_index.to_string(), old_indices.to_vec()));
            Ok(())
        }
        async fn ensure_alias_exists(&self, _alias: &str) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct StubVectorStore {
        upserted: Mutex<Vec<String>>,
        deleted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl VectorStoreAdapter for StubVectorStore {
        async fn ensure_collection(&self, _collection: &str, _dimension: usize) -> Result<()> {
            Ok(())
        }
        async fn upsert(&self, _collection: &str, id: &str, _vector: &[f32]) -> Result<()> {
            self.upserted.lock().push(id.to_string());
            Ok(())
        }
        async fn upsert_batch(&self, _collection: &str, rows: &[(String, Vec<f32>)]) -> Result<()> {
            for (id, _) in rows {
                self.upserted.lock().push(id.clone());
            }
            Ok(())
        }
        async fn delete(&self, _collection: &str, id: &str) -> Result<()> {
            self.deleted.lock().push(id.to_string());
            Ok(())
        }
        async fn drop_collection(&self, _collection: &str) -> Result<()> {
            Ok(())
        }
        async fn search(&self, _collection: &str, _query_vector: &[f32], _top_k: usize, _allowed_ids: &[String]) -> Result<Vec<VectorHit>> {
            Ok(Vec::new())
        }
    }

    fn sample_candidate(id: &str) -> Candidate {
        Candidate {
            id: id.into(),
            telegram_id: 1,
            headline_role: Some("Engineer".into()),
            experience_years: Some(2.0),
            location: None,
            work_modes: vec![],
            skills: vec![],
            projects: vec![],
            experiences: vec![],
            display_name: None,
        }
    }

    async fn make_gate() -> Arc<EmbeddingGate> {
        EmbeddingGate::build(Arc::new(StubEmbedder)).await.unwrap()
    }

    #[tokio::test]
    async fn upsert_writes_to_both_stores() {
        let lexical = Arc::new(StubLexicalStore::default());
        let vector = Arc::new(StubVectorStore::default());
        let source = Arc::new(CandidateSourceClient::new("http://localhost:0").unwrap());
        let gate = make_gate().await;

        let indexer = Indexer::new(lexical.clone(), vector.clone(), source, gate, "candidates", "candidates", 500);
        indexer.upsert(&sample_candidate("c-1")).await.unwrap();

        assert_eq!(lexical.indexed.lock().len(), 1);
        assert_eq!(vector.upserted.lock().len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_from_both_stores() {
        let lexical = Arc::new(StubLexicalStore::default());
        let vector = Arc::new(StubVectorStore::default());
        let source = Arc::new(CandidateSourceClient::new("http://localhost:0").unwrap());
        let gate = make_gate().await;

        let indexer = Indexer::new(lexical.clone(), vector.clone(), source, gate, "candidates", "candidates", 500);
        indexer.delete("c-1").await.unwrap();

        assert_eq!(lexical.deleted.lock().as_slice(), &["c-1".to_string()]);
        assert_eq!(vector.deleted.lock().as_slice(), &["c-1".to_string()]);
    }
}
