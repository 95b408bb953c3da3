//! C7 — Hybrid Search Engine: two-stage retrieval (lexical filter, then
//! vector ANN search scoped to the filtered candidate set) fused by
//! Reciprocal Rank Fusion (spec §4.7).

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::candidate::SearchFilters;
use crate::embedding::EmbeddingGate;
use crate::error::Result;
use crate::lexical::{LexicalStoreAdapter, build_query};
use crate::vector::VectorStoreAdapter;

/// Size of the lexical Stage 1 candidate set handed to Stage 2 as an ANN
/// allowlist (spec §4.7).
pub const LEXICAL_STAGE_SIZE: usize = 500;

/// Fixed ANN result size for Stage 2 (spec §4.7: "run C3.search with
/// `top_k=10`"). Not request-configurable.
pub const SEMANTIC_STAGE_TOP_K: usize = 10;

/// Default RRF constant (spec §4.7, `RRF_K`).
pub const DEFAULT_RRF_K: f64 = 60.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub candidate_id: String,
    pub score: f64,
}

pub struct HybridSearchEngine {
    lexical: Arc<dyn LexicalStoreAdapter>,
    vector: Arc<dyn VectorStoreAdapter>,
    gate: Arc<EmbeddingGate>,
    alias: String,
    vector_collection: String,
    rrf_k: f64,
}

impl HybridSearchEngine {
    pub fn new(
        lexical: Arc<dyn LexicalStoreAdapter>,
        vector: Arc<dyn VectorStoreAdapter>,
        gate: Arc<EmbeddingGate>,
        alias: impl Into<String>,
        vector_collection: impl Into<String>,
        rrf_k: f64,
    ) -> Self {
        Self {
            lexical,
            vector,
            gate,
            alias: alias.into(),
            vector_collection: vector_collection.into(),
            rrf_k,
        }
    }

    /// Run the two-stage pipeline (spec §4.7) and return every candidate
    /// with a nonzero fused score, ranked descending. The HTTP request body
    /// *is* a `SearchFilters` (spec §6); there is no separate free-text
    /// query field — the semantic query is derived from the filters
    /// themselves (role + nice_skills).
    #[instrument(skip(self, filters))]
    pub async fn search(&self, filters: SearchFilters) -> Result<Vec<ScoredCandidate>> {
        let filters = filters.normalize()?;
        let query = build_query(&filters);

        // Stage 1 — structured filter.
        let lexical_hits = self.lexical.search(&self.alias, &query, LEXICAL_STAGE_SIZE).await?;
        if lexical_hits.is_empty() {
            return Ok(Vec::new());
        }
        let lexical_ids: Vec<String> = lexical_hits.iter().map(|h| h.id.clone()).collect();

        // Stage 2 — semantic rerank, skipped if there's nothing to embed.
        let semantic_query_text = build_query_semantic_text(filters.role.as_deref(), &filters.nice_skills);
        let vector_ids: Vec<String> = if semantic_query_text.is_empty() {
            Vec::new()
        } else {
            match self.gate.encode_one(&semantic_query_text).await {
                Ok(query_vector) => {
                    match self
                        .vector
                        .search(&self.vector_collection, &query_vector, SEMANTIC_STAGE_TOP_K, &lexical_ids)
                        .await
                    {
                        Ok(hits) => hits.into_iter().map(|h| h.id).collect(),
                        Err(err) => {
                            // Degrade to lexical-only ranking on ANN failure (spec §7).
                            warn!(%err, "vector search failed, degrading to lexical-only results");
                            Vec::new()
                        }
                    }
                }
                Err(err) => {
                    warn!(%err, "query encoding failed, degrading to lexical-only results");
                    Vec::new()
                }
            }
        };

        if vector_ids.is_empty() {
            // Stage 2 skipped or degraded: RRF of `L` alone (spec §4.7/§8),
            // not raw lexical scores — the output `score` contract is RRF's
            // regardless of which stages actually ran.
            return Ok(fuse_rrf(&lexical_ids, &[], self.rrf_k));
        }

        // Stage 3 — Reciprocal Rank Fusion.
        Ok(fuse_rrf(&lexical_ids, &vector_ids, self.rrf_k))
    }
}

/// Reciprocal Rank Fusion (spec §4.7): `score(doc) = sum over ranked lists
/// containing doc of 1 / (RRF_K + rank + 1)`, ranks zero-based. Ties are
/// broken by lexicographically smaller id.
pub fn fuse_rrf(lexical_ranked_ids: &[String], vector_ranked_ids: &[String], k: f64) -> Vec<ScoredCandidate> {
    let mut scores: HashMap<&str, f64> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();

    for (rank, id) in lexical_ranked_ids.iter().enumerate() {
        let entry = scores.entry(id.as_str()).or_insert_with(|| {
            order.push(id.as_str());
            0.0
        });
        *entry += 1.0 / (k + rank as f64 + 1.0);
    }
    for (rank, id) in vector_ranked_ids.iter().enumerate() {
        let entry = scores.entry(id.as_str()).or_insert_with(|| {
            order.push(id.as_str());
            0.0
        });
        *entry += 1.0 / (k + rank as f64 + 1.0);
    }

    let mut ranked: Vec<(&str, f64)> = order.into_iter().map(|id| (id, scores[id])).collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });
    ranked
        .into_iter()
        .map(|(id, score)| ScoredCandidate { candidate_id: id.to_string(), score })
        .collect()
}

/// Build `semantic_query_text` exactly as spec §4.7 defines it: `role` (if
/// present) then each `nice_skill`, joined with `", "`.
pub fn build_query_semantic_text(role: Option<&str>, nice_skills: &[String]) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if let Some(role) = role.filter(|r| !r.trim().is_empty()) {
        parts.push(role.trim());
    }
    for skill in nice_skills {
        if !skill.is_empty() {
            parts.push(skill.as_str());
        }
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rrf_ranks_documents_present_in_both_lists_higher() {
        let lexical = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let vector = vec!["b".to_string(), "a".to_string(), "d".to_string()];

        let fused = fuse_rrf(&lexical, &vector, DEFAULT_RRF_K);
        assert_eq!(fused[0].candidate_id, "a");
        assert_eq!(fused[1].candidate_id, "b");
    }

    #[test]
    fn rrf_score_matches_closed_form() {
        let lexical = vec!["a".to_string()];
        let vector = vec!["a".to_string()];
        let fused = fuse_rrf(&lexical, &vector, 60.0);
        let expected = 1.0 / 61.0 + 1.0 / 61.0;
        assert!((fused[0].score - expected).abs() < 1e-12);
    }

    #[test]
    fn rrf_ties_break_lexicographically() {
        let fused = fuse_rrf(&["x".to_string()], &["y".to_string()], 60.0);
        assert_eq!(fused[0].candidate_id, "x");
        assert_eq!(fused[1].candidate_id, "y");
    }

    #[test]
    fn build_query_semantic_text_joins_role_then_nice_skills() {
        let text = build_query_semantic_text(Some("Backend"), &["kafka".to_string(), "go".to_string()]);
        assert_eq!(text, "Backend, kafka, go");
    }

    #[test]
    fn build_query_semantic_text_empty_when_nothing_present() {
        assert_eq!(build_query_semantic_text(None, &[]), "");
    }
}
