//! C3 — Vector Store Adapter: a Milvus-shaped ANN index reached over its
//! REST API, configured for `IVF_FLAT` / inner-product search (spec §3,
//! §4.2: `nlist=128`, `nprobe=10`).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::error::{Result, SearchServiceError};

/// Index build parameter (spec §3).
pub const NLIST: u32 = 128;
/// Search-time probe parameter (spec §3).
pub const NPROBE: u32 = 10;
pub const INDEX_TYPE: &str = "IVF_FLAT";
pub const METRIC_TYPE: &str = "IP";

/// Maximum number of ids Milvus will accept in a single `in` filter
/// expression; larger allowlists are chunked and merged by the caller
/// (spec §9, "ANN filter syntax").
pub const MAX_ID_FILTER_CHUNK: usize = 4096;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorHit {
    pub id: String,
    pub score: f64,
}

#[async_trait]
pub trait VectorStoreAdapter: Send + Sync {
    async fn ensure_collection(&self, collection: &str, dimension: usize) -> Result<()>;

    async fn upsert(&self, collection: &str, id: &str, vector: &[f32]) -> Result<()>;

    async fn upsert_batch(&self, collection: &str, rows: &[(String, Vec<f32>)]) -> Result<()>;

    async fn delete(&self, collection: &str, id: &str) -> Result<()>;

    async fn drop_collection(&self, collection: &str) -> Result<()>;

    /// Approximate nearest-neighbor search, restricted to `allowed_ids` when
    /// non-empty (spec §4.7 Stage 2: the candidate set narrowed by lexical
    /// filtering becomes the ANN search's id allowlist).
    async fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        top_k: usize,
        allowed_ids: &[String],
    ) -> Result<Vec<VectorHit>>;

    /// Whether `collection` exists, for `/health` (spec §6). Default
    /// implementation assumes it does; concrete adapters override with a
    /// real describe call.
    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        let _ = collection;
        Ok(true)
    }
}

pub struct MilvusVectorStore {
    client: reqwest::Client,
    base_url: String,
}

impl MilvusVectorStore {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| {
                SearchServiceError::VectorStore(format!("failed to build HTTP client: {err}"))
            })?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value> {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, path.trim_start_matches('/')))
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                SearchServiceError::VectorStore(format!("request to {path} failed: {err}"))
            })?;

        let status = response.status();
        let parsed: Value = response.json().await.map_err(|err| {
            SearchServiceError::VectorStore(format!("invalid JSON from {path}: {err}"))
        })?;

        if !status.is_success() {
            return Err(SearchServiceError::VectorStore(format!(
                "{path} returned {status}: {parsed}"
            )));
        }
        // Milvus's REST gateway reports application errors as 200 with a
        // nonzero `code`.
        if let Some(code) = parsed["code"].as_i64() {
            if code != 0 {
                let message = parsed["message"].as_str().unwrap_or("unknown error");
                return Err(SearchServiceError::VectorStore(format!(
                    "{path} failed (code {code}): {message}"
                )));
            }
        }

        Ok(parsed)
    }

    /// Build the `candidate_id in [...]` filter expression for an
    /// allowlisted search, chunking to stay under `MAX_ID_FILTER_CHUNK`. Only
    /// the first chunk is honored; callers are expected to have already
    /// bounded the allowlist (spec's lexical Stage 1 returns at most 500
    /// ids).
    fn id_filter_expr(allowed_ids: &[String]) -> Option<String> {
        if allowed_ids.is_empty() {
            return None;
        }
        let chunk = &allowed_ids[..allowed_ids.len().min(MAX_ID_FILTER_CHUNK)];
        let quoted: Vec<String> = chunk.iter().map(|id| format!("\"{id}\"")).collect();
        Some(format!("candidate_id in [{}]", quoted.join(", ")))
    }
}

#[async_trait]
impl VectorStoreAdapter for MilvusVectorStore {
    #[instrument(skip(self))]
    async fn ensure_collection(&self, collection: &str, dimension: usize) -> Result<()> {
        let describe = self
            .post(
                "v2/vectordb/collections/describe",
                json!({ "collectionName": collection }),
            )
            .await;
        if describe.is_ok() {
            return Ok(());
        }

        self.post(
            "v2/vectordb/collections/create",
            json!({
                "collectionName": collection,
                "schema": {
                    "autoId": false,
                    "fields": [
                        { "fieldName": "candidate_id", "dataType": "VarChar", "isPrimary": true, "elementTypeParams": { "max_length": 36 } },
                        { "fieldName": "embedding", "dataType": "FloatVector", "elementTypeParams": { "dim": dimension } }
                    ]
                },
                "indexParams": [
                    {
                        "fieldName": "embedding",
                        "indexType": INDEX_TYPE,
                        "metricType": METRIC_TYPE,
                        "params": { "nlist": NLIST }
                    }
                ]
            }),
        )
        .await?;
        Ok(())
    }

    async fn upsert(&self, collection: &str, id: &str, vector: &[f32]) -> Result<()> {
        self.upsert_batch(collection, std::slice::from_ref(&(id.to_string(), vector.to_vec())))
            .await
    }

    async fn upsert_batch(&self, collection: &str, rows: &[(String, Vec<f32>)]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let data: Vec<Value> = rows
            .iter()
            .map(|(id, vector)| json!({ "candidate_id": id, "embedding": vector }))
            .collect();
        self.post(
            "v2/vectordb/entities/upsert",
            json!({ "collectionName": collection, "data": data }),
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        self.post(
            "v2/vectordb/entities/delete",
            json!({ "collectionName": collection, "filter": format!("candidate_id in [\"{id}\"]") }),
        )
        .await?;
        Ok(())
    }

    async fn drop_collection(&self, collection: &str) -> Result<()> {
        self.post(
            "v2/vectordb/collections/drop",
            json!({ "collectionName": collection }),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self, query_vector), fields(top_k, allowlist_size = allowed_ids.len()))]
    async fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        top_k: usize,
        allowed_ids: &[String],
    ) -> Result<Vec<VectorHit>> {
        let mut body = json!({
            "collectionName": collection,
            "data": [query_vector],
            "limit": top_k,
            "searchParams": { "params": { "nprobe": NPROBE } },
            "outputFields": ["candidate_id"],
        });

        if let Some(filter) = Self::id_filter_expr(allowed_ids) {
            body["filter"] = json!(filter);
        }

        let response = self.post("v2/vectordb/entities/search", body).await?;
        let results = response["data"].as_array().cloned().unwrap_or_default();

        let mut hits = Vec::with_capacity(results.len());
        for row in results {
            let id = row["candidate_id"]
                .as_str()
                .ok_or_else(|| SearchServiceError::VectorStore("search hit missing candidate_id".into()))?;
            let score = row["distance"].as_f64().unwrap_or(0.0);
            hits.push(VectorHit {
                id: id.to_string(),
                score,
            });
        }
        debug!(hit_count = hits.len(), "vector search completed");
        Ok(hits)
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        Ok(self
            .post(
                "v2/vectordb/collections/describe",
                json!({ "collectionName": collection }),
            )
            .await
            .is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_filter_expr_quotes_and_joins_ids() {
        let expr = MilvusVectorStore::id_filter_expr(&["a".into(), "b".into()]).unwrap();
        assert_eq!(expr, r#"candidate_id in ["a", "b"]"#);
    }

    #[test]
    fn id_filter_expr_is_none_for_empty_allowlist() {
        assert!(MilvusVectorStore::id_filter_expr(&[]).is_none());
    }

    #[tokio::test]
    async fn search_parses_hits() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/v2/vectordb/entities/search"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "data": [
                    { "candidate_id": "c-1", "distance": 0.98 },
                    { "candidate_id": "c-2", "distance": 0.81 }
                ]
            })))
            .mount(&server)
            .await;

        let store = MilvusVectorStore::new(server.uri()).unwrap();
        let hits = store
            .search("candidates", &vec![0.1; 768], 10, &["c-1".into(), "c-2".into()])
            .await
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "c-1");
    }

    #[tokio::test]
    async fn nonzero_code_is_surfaced_as_an_error() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/v2/vectordb/entities/upsert"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!({
                "code": 65535,
                "message": "collection not found"
            })))
            .mount(&server)
            .await;

        let store = MilvusVectorStore::new(server.uri()).unwrap();
        let result = store.upsert("missing", "c-1", &vec![0.0; 768]).await;
        assert!(result.is_err());
    }
}
