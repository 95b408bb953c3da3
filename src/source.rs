//! C4 — Candidate Source Client: a paginated, retrying HTTP client over the
//! upstream candidate API (spec §4.4).

use std::time::Duration;

use tracing::warn;

use crate::candidate::Candidate;
use crate::error::{Result, SearchServiceError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF_MS: u64 = 1_000;
const MAX_BACKOFF_MS: u64 = 10_000;

pub struct CandidateSourceClient {
    client: reqwest::Client,
    base_url: String,
}

impl CandidateSourceClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| {
                SearchServiceError::CandidateSource(format!("failed to build HTTP client: {err}"))
            })?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Fetch one page of candidates, retrying transient failures with
    /// exponential backoff: 1s, 2s, 4s (capped at 10s), three attempts total.
    pub async fn fetch_batch(&self, limit: usize, offset: usize) -> Result<Vec<Candidate>> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.fetch_batch_once(limit, offset).await {
                Ok(candidates) => return Ok(candidates),
                Err(err) if attempt < MAX_ATTEMPTS => {
                    let delay_ms = (BASE_BACKOFF_MS.saturating_mul(1 << (attempt - 1))).min(MAX_BACKOFF_MS);
                    warn!(
                        attempt,
                        delay_ms, %err, "candidate source fetch failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn fetch_batch_once(&self, limit: usize, offset: usize) -> Result<Vec<Candidate>> {
        let response = self
            .client
            .get(format!("{}/candidates/", self.base_url))
            .query(&[("limit", limit.to_string()), ("offset", offset.to_string())])
            .send()
            .await
            .map_err(|err| {
                SearchServiceError::CandidateSource(format!("request failed: {err}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchServiceError::CandidateSource(format!(
                "candidate source returned {status}: {body}"
            )));
        }

        response
            .json::<Vec<Candidate>>()
            .await
            .map_err(|err| SearchServiceError::CandidateSource(format!("invalid response body: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn fetch_batch_passes_through_limit_and_offset() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/candidates/"))
            .and(wiremock::matchers::query_param("limit", "50"))
            .and(wiremock::matchers::query_param("offset", "100"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let client = CandidateSourceClient::new(server.uri()).unwrap();
        let candidates = client.fetch_batch(50, 100).await.unwrap();
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn fetch_batch_retries_on_server_error_then_succeeds() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/candidates/"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/candidates/"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let client = CandidateSourceClient::new(server.uri()).unwrap();
        let candidates = client.fetch_batch(50, 0).await.unwrap();
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn fetch_batch_gives_up_after_max_attempts() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/candidates/"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = CandidateSourceClient::new(server.uri()).unwrap();
        let result = client.fetch_batch(50, 0).await;
        assert!(result.is_err());
    }
}
