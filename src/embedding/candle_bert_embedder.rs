//! Local sentence-embedding backend built on `candle`.
//!
//! This is the default `Embedder` implementation, mirroring the upstream
//! Python service's use of a local `sentence-transformers` model
//! (`SENTENCE_MODEL_NAME`, spec §6) rather than a hosted embedding API.
//! Mean-pools the last hidden state over non-padding tokens and L2
//! normalizes, which is the standard sentence-embedding recipe for BERT-family
//! encoders.

use std::path::PathBuf;

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use hf_hub::api::tokio::Api;
use hf_hub::{Repo, RepoType};
use tokenizers::{PaddingParams, Tokenizer};
use tokio::sync::Mutex;

use crate::embedding::embedder::{EMBEDDING_DIM, Embedder};
use crate::error::{Result, SearchServiceError};

/// Sentence embedder backed by a locally-loaded BERT-family model.
///
/// The tokenizer is not internally synchronized against concurrent use by
/// the `tokenizers` crate's own contract, so access is serialized behind a
/// `tokio::sync::Mutex`; the gate's worker pool already bounds concurrency
/// to a handful of in-flight encodes, so this is not a bottleneck in
/// practice.
pub struct CandleBertEmbedder {
    model: BertModel,
    tokenizer: Mutex<Tokenizer>,
    device: Device,
}

impl CandleBertEmbedder {
    /// Load `model_name` (a Hugging Face Hub repo id, e.g.
    /// `sentence-transformers/paraphrase-multilingual-mpnet-base-v2`) from
    /// the local HF cache, downloading it on first use.
    pub async fn new(model_name: &str) -> Result<Self> {
        let device = Device::Cpu;

        let api = Api::new()
            .map_err(|err| SearchServiceError::Embedding(format!("hf-hub init failed: {err}")))?;
        let repo = api.repo(Repo::new(model_name.to_string(), RepoType::Model));

        let config_path = Self::fetch(&repo, "config.json").await?;
        let tokenizer_path = Self::fetch(&repo, "tokenizer.json").await?;
        let weights_path = Self::fetch(&repo, "model.safetensors").await?;

        let config: BertConfig = serde_json::from_slice(
            &std::fs::read(config_path)
                .map_err(|err| SearchServiceError::Embedding(format!("reading config.json: {err}")))?,
        )
        .map_err(|err| SearchServiceError::Embedding(format!("parsing config.json: {err}")))?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|err| SearchServiceError::Embedding(format!("loading tokenizer: {err}")))?;
        tokenizer.with_padding(Some(PaddingParams::default()));

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DTYPE, &device)
                .map_err(|err| SearchServiceError::Embedding(format!("loading weights: {err}")))?
        };
        let model = BertModel::load(vb, &config)
            .map_err(|err| SearchServiceError::Embedding(format!("building model: {err}")))?;

        Ok(Self {
            model,
            tokenizer: Mutex::new(tokenizer),
            device,
        })
    }

    async fn fetch(repo: &hf_hub::api::tokio::ApiRepo, filename: &str) -> Result<PathBuf> {
        repo.get(filename)
            .await
            .map_err(|err| SearchServiceError::Embedding(format!("fetching {filename}: {err}")))
    }

    fn encode_tensors(&self, texts: &[String], tokenizer: &Tokenizer) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|err| SearchServiceError::Embedding(format!("tokenization failed: {err}")))?;

        let token_ids: Vec<Vec<u32>> = encodings.iter().map(|e| e.get_ids().to_vec()).collect();
        let attention_mask: Vec<Vec<u32>> =
            encodings.iter().map(|e| e.get_attention_mask().to_vec()).collect();

        let token_ids = Tensor::new(token_ids, &self.device)
            .map_err(|err| SearchServiceError::Embedding(format!("building input tensor: {err}")))?;
        let attention_mask = Tensor::new(attention_mask, &self.device)
            .map_err(|err| SearchServiceError::Embedding(format!("building mask tensor: {err}")))?;
        let token_type_ids = token_ids
            .zeros_like()
            .map_err(|err| SearchServiceError::Embedding(format!("building type ids: {err}")))?;

        let hidden = self
            .model
            .forward(&token_ids, &token_type_ids, Some(&attention_mask))
            .map_err(|err| SearchServiceError::Embedding(format!("forward pass failed: {err}")))?;

        let mask = attention_mask
            .to_dtype(DType::F32)
            .map_err(|err| SearchServiceError::Embedding(format!("mask cast failed: {err}")))?
            .unsqueeze(2)
            .map_err(|err| SearchServiceError::Embedding(format!("mask reshape failed: {err}")))?;

        let masked = hidden
            .broadcast_mul(&mask)
            .map_err(|err| SearchServiceError::Embedding(format!("mask multiply failed: {err}")))?;
        let summed = masked
            .sum(1)
            .map_err(|err| SearchServiceError::Embedding(format!("sum pooling failed: {err}")))?;
        let counts = mask
            .sum(1)
            .map_err(|err| SearchServiceError::Embedding(format!("mask sum failed: {err}")))?;
        let pooled = summed
            .broadcast_div(&counts)
            .map_err(|err| SearchServiceError::Embedding(format!("mean pooling failed: {err}")))?;

        let norm = pooled
            .sqr()
            .and_then(|t| t.sum_keepdim(1))
            .and_then(|t| t.sqrt())
            .map_err(|err| SearchServiceError::Embedding(format!("norm computation failed: {err}")))?;
        let normalized = pooled
            .broadcast_div(&norm)
            .map_err(|err| SearchServiceError::Embedding(format!("normalization failed: {err}")))?;

        normalized
            .to_vec2::<f32>()
            .map_err(|err| SearchServiceError::Embedding(format!("materializing output failed: {err}")))
    }
}

#[async_trait]
impl Embedder for CandleBertEmbedder {
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let tokenizer = self.tokenizer.lock().await;
        let mut vectors = self.encode_tensors(std::slice::from_ref(&text.to_string()), &tokenizer)?;
        vectors.pop().ok_or_else(|| {
            SearchServiceError::Embedding("encoder returned no vector for input".into())
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let tokenizer = self.tokenizer.lock().await;
        self.encode_tensors(texts, &tokenizer)
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }
}
