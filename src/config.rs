//! Ambient configuration: environment-driven, loaded once at startup via the
//! `config` crate layered over a `.env` file (`dotenvy`), mirroring the
//! teacher's own `ServerConfig::load` (spec §6).
//!
//! Construction is the validation point: a `.env`/environment combination
//! that produces an invalid `AppConfig` (empty URLs, non-positive batch
//! size) fails fast at startup rather than surfacing as a confusing runtime
//! error later, matching spec §7's "fatal at first use" posture extended to
//! configuration.

use serde::Deserialize;

use crate::error::{Result, SearchServiceError};

fn default_alias() -> String {
    "candidates".to_string()
}

fn default_batch_size() -> usize {
    crate::indexer::DEFAULT_BATCH_SIZE
}

fn default_rrf_k() -> f64 {
    crate::search::DEFAULT_RRF_K
}

fn default_rabbitmq_port() -> u16 {
    5672
}

fn default_milvus_port() -> u16 {
    19530
}

fn default_sentence_model() -> String {
    "sentence-transformers/paraphrase-multilingual-mpnet-base-v2".to_string()
}

fn default_vector_collection() -> String {
    "candidates_embeddings".to_string()
}

/// All recognized environment keys from spec §6, each with the default
/// named in the spec where one exists.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub elasticsearch_url: String,
    pub candidate_api_url: String,

    pub rabbitmq_host: String,
    #[serde(default = "default_rabbitmq_port")]
    pub rabbitmq_port: u16,
    pub rabbitmq_user: String,
    pub rabbitmq_pass: String,
    pub candidate_exchange_name: String,

    #[serde(default = "default_alias")]
    pub candidate_alias: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,

    pub milvus_host: String,
    #[serde(default = "default_milvus_port")]
    pub milvus_port: u16,
    /// Overrides index type/metric/params; kept as an opaque JSON string
    /// since the spec leaves its shape to the ANN store's own schema (spec
    /// §6) and this service only needs to pass it through unparsed.
    #[serde(default)]
    pub milvus_index_params: Option<String>,

    #[serde(default = "default_sentence_model")]
    pub sentence_model_name: String,

    #[serde(default = "default_vector_collection")]
    pub vector_collection: String,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl AppConfig {
    /// Load from `.env` (if present) and the process environment, then
    /// validate. Environment variables are read bare (no prefix, no
    /// separator rewriting) since spec §6 names exact key spellings.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let builder = config::Config::builder()
            .set_default("rabbitmq_port", default_rabbitmq_port())
            .map_err(config_err)?
            .set_default("milvus_port", default_milvus_port())
            .map_err(config_err)?
            .set_default("candidate_alias", default_alias())
            .map_err(config_err)?
            .set_default("batch_size", default_batch_size() as i64)
            .map_err(config_err)?
            .set_default("rrf_k", default_rrf_k())
            .map_err(config_err)?
            .set_default("sentence_model_name", default_sentence_model())
            .map_err(config_err)?
            .set_default("vector_collection", default_vector_collection())
            .map_err(config_err)?
            .set_default("bind_addr", default_bind_addr())
            .map_err(config_err)?
            .set_default("port", default_port() as i64)
            .map_err(config_err)?
            .add_source(config::Environment::default().try_parsing(true));

        let raw: Self = builder
            .build()
            .map_err(config_err)?
            .try_deserialize()
            .map_err(config_err)?;

        raw.validate()
    }

    fn validate(self) -> Result<Self> {
        if self.elasticsearch_url.trim().is_empty() {
            return Err(SearchServiceError::Config(
                "ELASTICSEARCH_URL must not be empty".into(),
            ));
        }
        if self.candidate_api_url.trim().is_empty() {
            return Err(SearchServiceError::Config(
                "CANDIDATE_API_URL must not be empty".into(),
            ));
        }
        if self.rabbitmq_host.trim().is_empty() {
            return Err(SearchServiceError::Config(
                "RABBITMQ_HOST must not be empty".into(),
            ));
        }
        if self.candidate_exchange_name.trim().is_empty() {
            return Err(SearchServiceError::Config(
                "CANDIDATE_EXCHANGE_NAME must not be empty".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(SearchServiceError::Config(
                "BATCH_SIZE must be positive".into(),
            ));
        }
        if self.rrf_k <= 0.0 {
            return Err(SearchServiceError::Config(
                "RRF_K must be positive".into(),
            ));
        }
        Ok(self)
    }

    pub fn rabbitmq_url(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/%2f",
            self.rabbitmq_user, self.rabbitmq_pass, self.rabbitmq_host, self.rabbitmq_port
        )
    }

    pub fn milvus_url(&self) -> String {
        format!("http://{}:{}", self.milvus_host, self.milvus_port)
    }

    pub fn socket_addr(&self) -> Result<std::net::SocketAddr> {
        format!("{}:{}", self.bind_addr, self.port)
            .parse()
            .map_err(|err| SearchServiceError::Config(format!("invalid bind address: {err}")))
    }
}

fn config_err(err: impl std::fmt::Display) -> SearchServiceError {
    SearchServiceError::Config(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_required_vars() {
        unsafe {
            std::env::set_var("ELASTICSEARCH_URL", "http://localhost:9200");
            std::env::set_var("CANDIDATE_API_URL", "http://localhost:8001");
            std::env::set_var("RABBITMQ_HOST", "localhost");
            std::env::set_var("RABBITMQ_USER", "guest");
            std::env::set_var("RABBITMQ_PASS", "guest");
            std::env::set_var("CANDIDATE_EXCHANGE_NAME", "candidate_events");
            std::env::set_var("MILVUS_HOST", "localhost");
        }
    }

    #[test]
    #[ignore = "mutates process environment; run with --test-threads=1"]
    fn load_applies_spec_defaults() {
        set_required_vars();
        let config = AppConfig::load().unwrap();
        assert_eq!(config.candidate_alias, "candidates");
        assert_eq!(config.batch_size, 500);
        assert_eq!(config.rrf_k, 60.0);
    }

    #[test]
    fn rabbitmq_url_embeds_credentials() {
        let config = AppConfig {
            elasticsearch_url: "http://es".into(),
            candidate_api_url: "http://api".into(),
            rabbitmq_host: "mq".into(),
            rabbitmq_port: 5672,
            rabbitmq_user: "u".into(),
            rabbitmq_pass: "p".into(),
            candidate_exchange_name: "ex".into(),
            candidate_alias: "candidates".into(),
            batch_size: 500,
            rrf_k: 60.0,
            milvus_host: "milvus".into(),
            milvus_port: 19530,
            milvus_index_params: None,
            sentence_model_name: "model".into(),
            vector_collection: "candidates_embeddings".into(),
            bind_addr: "0.0.0.0".into(),
            port: 8000,
        };
        assert_eq!(config.rabbitmq_url(), "amqp://u:p@mq:5672/%2f");
    }
}
