//! C2 — Lexical Store Adapter: an Elasticsearch-shaped keyword search store
//! reached over its REST API, kept behind an alias for zero-downtime
//! reindexing (spec §4.6).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use crate::candidate::LexicalDoc;
use crate::error::{Result, SearchServiceError};

/// A single hit returned from a lexical search, ranked position preserved by
/// the caller (RRF needs rank, not raw score, per spec §4.7).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexicalHit {
    pub id: String,
    pub score: f64,
}

/// Outcome of a bulk write (spec §4.2: `bulk` "returns `(success_count,
/// failures)`"). `failures` carries the id of each document the store
/// rejected, so callers can log or retry them individually.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkResult {
    pub success_count: usize,
    pub failures: Vec<String>,
}

#[async_trait]
pub trait LexicalStoreAdapter: Send + Sync {
    /// Run `query` against `alias`, returning up to `size` hits ordered by
    /// descending relevance.
    async fn search(&self, alias: &str, query: &Value, size: usize) -> Result<Vec<LexicalHit>>;

    /// Upsert a single document by id.
    async fn index(&self, index: &str, doc: &LexicalDoc) -> Result<()>;

    /// Upsert a batch of documents via the bulk API, reporting per-document
    /// success/failure rather than failing the whole batch on a partial
    /// error (spec §4.2).
    async fn bulk_index(&self, index: &str, docs: &[LexicalDoc]) -> Result<BulkResult>;

    async fn delete_by_id(&self, alias: &str, id: &str) -> Result<()>;

    /// Create a concrete, timestamped index with the fixed candidate
    /// mapping (spec §3/§4.6).
    async fn create_index(&self, index: &str) -> Result<()>;

    async fn drop_index(&self, index: &str) -> Result<()>;

    /// Indices currently behind `alias`, oldest first.
    async fn list_indices_for_alias(&self, alias: &str) -> Result<Vec<String>>;

    /// Atomically point `alias` at `new_index`, removing `old_indices` from
    /// it in the same alias-update call (spec §4.6 step: atomic alias swap).
    async fn swap_alias(&self, alias: &str, new_index: &str, old_indices: &[String]) -> Result<()>;

    async fn ensure_alias_exists(&self, alias: &str) -> Result<()>;

    /// Lightweight reachability probe for `/health` (spec §6). Default
    /// implementation assumes reachable; concrete adapters override with a
    /// real cluster ping.
    async fn ping(&self) -> Result<bool> {
        Ok(true)
    }
}

pub struct EsLexicalStore {
    client: reqwest::Client,
    base_url: String,
}

impl EsLexicalStore {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| {
                SearchServiceError::LexicalStore(format!("failed to build HTTP client: {err}"))
            })?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn request_json(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value> {
        let mut request = self.client.request(method, self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|err| {
            SearchServiceError::LexicalStore(format!("request to {path} failed: {err}"))
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|err| {
            SearchServiceError::LexicalStore(format!("reading response from {path}: {err}"))
        })?;

        if !status.is_success() && status.as_u16() != 404 {
            return Err(SearchServiceError::LexicalStore(format!(
                "{path} returned {status}: {text}"
            )));
        }

        if text.is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text).map_err(|err| {
            SearchServiceError::LexicalStore(format!("invalid JSON from {path}: {err}"))
        })
    }
}

#[async_trait]
impl LexicalStoreAdapter for EsLexicalStore {
    #[instrument(skip(self, query), fields(alias, size))]
    async fn search(&self, alias: &str, query: &Value, size: usize) -> Result<Vec<LexicalHit>> {
        let body = json!({ "query": query, "size": size, "_source": false });
        let response = self
            .request_json(reqwest::Method::POST, &format!("{alias}/_search"), Some(&body))
            .await?;

        let hits = response["hits"]["hits"].as_array().cloned().unwrap_or_default();
        let mut out = Vec::with_capacity(hits.len());
        for hit in hits {
            let id = hit["_id"].as_str().ok_or_else(|| {
                SearchServiceError::LexicalStore("hit missing _id".into())
            })?;
            let score = hit["_score"].as_f64().unwrap_or(0.0);
            out.push(LexicalHit {
                id: id.to_string(),
                score,
            });
        }
        debug!(hit_count = out.len(), "lexical search completed");
        Ok(out)
    }

    async fn index(&self, index: &str, doc: &LexicalDoc) -> Result<()> {
        self.request_json(
            reqwest::Method::PUT,
            &format!("{index}/_doc/{}", doc.id),
            Some(&serde_json::to_value(doc).map_err(|err| {
                SearchServiceError::LexicalStore(format!("serializing document: {err}"))
            })?),
        )
        .await?;
        Ok(())
    }

    async fn bulk_index(&self, index: &str, docs: &[LexicalDoc]) -> Result<BulkResult> {
        if docs.is_empty() {
            return Ok(BulkResult::default());
        }

        let mut body = String::new();
        for doc in docs {
            let action = json!({ "index": { "_index": index, "_id": doc.id } });
            body.push_str(&action.to_string());
            body.push('\n');
            body.push_str(&serde_json::to_string(doc).map_err(|err| {
                SearchServiceError::LexicalStore(format!("serializing document: {err}"))
            })?);
            body.push('\n');
        }

        let response = self
            .client
            .post(self.url("_bulk"))
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(|err| SearchServiceError::LexicalStore(format!("bulk index failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchServiceError::LexicalStore(format!(
                "bulk index request failed with status {status}"
            )));
        }

        let parsed: Value = response.json().await.map_err(|err| {
            SearchServiceError::LexicalStore(format!("invalid bulk response: {err}"))
        })?;

        // Each `items` entry nests its outcome under the action name used in
        // the request (`index`, here). A missing/non-2xx nested `status`
        // means that document failed even though the overall HTTP call
        // succeeded — this is exactly what the top-level `errors: true` flag
        // summarizes, but per-document we need the detail.
        let mut success_count = 0usize;
        let mut failures = Vec::new();
        match parsed["items"].as_array() {
            Some(items) => {
                for (item, doc) in items.iter().zip(docs) {
                    let outcome = &item["index"];
                    let item_status = outcome["status"].as_u64().unwrap_or(0);
                    if (200..300).contains(&item_status) {
                        success_count += 1;
                    } else {
                        warn!(candidate_id = %doc.id, status = item_status, "bulk index item failed");
                        failures.push(doc.id.clone());
                    }
                }
            }
            None => {
                // No `items` array at all is not a shape the real bulk API
                // produces for a successful call; treat it as a hard failure
                // rather than silently reporting zero successes.
                return Err(SearchServiceError::LexicalStore(format!(
                    "bulk index response missing items array: {parsed}"
                )));
            }
        }

        Ok(BulkResult { success_count, failures })
    }

    async fn delete_by_id(&self, alias: &str, id: &str) -> Result<()> {
        self.request_json(reqwest::Method::DELETE, &format!("{alias}/_doc/{id}"), None)
            .await?;
        Ok(())
    }

    async fn create_index(&self, index: &str) -> Result<()> {
        let mapping = json!({
            "mappings": {
                "properties": {
                    "id": { "type": "keyword" },
                    "telegram_id": { "type": "long" },
                    "headline_role": { "type": "text" },
                    "experience_years": { "type": "float" },
                    "location": {
                        "type": "text",
                        "fields": { "keyword": { "type": "keyword" } }
                    },
                    "work_modes": { "type": "keyword" },
                    "skills": { "type": "keyword" }
                }
            }
        });
        self.request_json(reqwest::Method::PUT, index, Some(&mapping)).await?;
        Ok(())
    }

    async fn drop_index(&self, index: &str) -> Result<()> {
        match self.request_json(reqwest::Method::DELETE, index, None).await {
            Ok(_) => Ok(()),
            Err(err) => {
                warn!(index, %err, "failed to drop stale index after alias swap");
                Ok(())
            }
        }
    }

    async fn list_indices_for_alias(&self, alias: &str) -> Result<Vec<String>> {
        let response = self
            .request_json(reqwest::Method::GET, &format!("{alias}/_alias"), None)
            .await?;
        let Value::Object(map) = response else {
            return Ok(Vec::new());
        };
        let mut indices: Vec<String> = map.into_keys().collect();
        indices.sort();
        Ok(indices)
    }

    async fn swap_alias(&self, alias: &str, new_index: &str, old_indices: &[String]) -> Result<()> {
        let mut actions = vec![json!({ "add": { "index": new_index, "alias": alias } })];
        for old in old_indices {
            actions.push(json!({ "remove": { "index": old, "alias": alias } }));
        }
        self.request_json(
            reqwest::Method::POST,
            "_aliases",
            Some(&json!({ "actions": actions })),
        )
        .await?;
        Ok(())
    }

    async fn ensure_alias_exists(&self, alias: &str) -> Result<()> {
        let existing = self.list_indices_for_alias(alias).await;
        if matches!(&existing, Ok(indices) if !indices.is_empty()) {
            return Ok(());
        }

        let index_name = format!("{alias}-bootstrap-000001");
        self.create_index(&index_name).await?;
        self.swap_alias(alias, &index_name, &[]).await
    }

    async fn ping(&self) -> Result<bool> {
        let response = self
            .request_json(reqwest::Method::GET, "_cluster/health", None)
            .await?;
        Ok(response["status"].as_str().is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn search_parses_hits_and_scores() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/candidates/_search"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!({
                "hits": {
                    "hits": [
                        { "_id": "c-1", "_score": 4.2 },
                        { "_id": "c-2", "_score": 2.1 }
                    ]
                }
            })))
            .mount(&server)
            .await;

        let store = EsLexicalStore::new(server.uri()).unwrap();
        let hits = store
            .search("candidates", &json!({ "match_all": {} }), 10)
            .await
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "c-1");
        assert_eq!(hits[0].score, 4.2);
    }

    #[tokio::test]
    async fn swap_alias_sends_add_and_remove_actions() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/_aliases"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!({ "acknowledged": true })))
            .mount(&server)
            .await;

        let store = EsLexicalStore::new(server.uri()).unwrap();
        store
            .swap_alias("candidates", "candidates-20260101", &["candidates-20251201".into()])
            .await
            .unwrap();
    }

    fn sample_docs(ids: &[&str]) -> Vec<LexicalDoc> {
        ids.iter()
            .map(|id| LexicalDoc {
                id: (*id).to_string(),
                telegram_id: 1,
                headline_role: None,
                experience_years: None,
                location: None,
                work_modes: Default::default(),
                skills: Default::default(),
            })
            .collect()
    }

    #[tokio::test]
    async fn bulk_index_counts_all_successes() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/_bulk"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!({
                "errors": false,
                "items": [
                    { "index": { "_id": "c-1", "status": 201 } },
                    { "index": { "_id": "c-2", "status": 200 } }
                ]
            })))
            .mount(&server)
            .await;

        let store = EsLexicalStore::new(server.uri()).unwrap();
        let result = store.bulk_index("candidates-1", &sample_docs(&["c-1", "c-2"])).await.unwrap();

        assert_eq!(result.success_count, 2);
        assert!(result.failures.is_empty());
    }

    #[tokio::test]
    async fn bulk_index_reports_per_document_failures() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/_bulk"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!({
                "errors": true,
                "items": [
                    { "index": { "_id": "c-1", "status": 201 } },
                    { "index": { "_id": "c-2", "status": 409, "error": { "type": "version_conflict_engine_exception" } } }
                ]
            })))
            .mount(&server)
            .await;

        let store = EsLexicalStore::new(server.uri()).unwrap();
        let result = store.bulk_index("candidates-1", &sample_docs(&["c-1", "c-2"])).await.unwrap();

        assert_eq!(result.success_count, 1);
        assert_eq!(result.failures, vec!["c-2".to_string()]);
    }

    #[tokio::test]
    async fn bulk_index_of_empty_batch_is_a_no_op() {
        let store = EsLexicalStore::new("http://localhost:0").unwrap();
        let result = store.bulk_index("candidates-1", &[]).await.unwrap();
        assert_eq!(result, BulkResult::default());
    }
}
