//! Query encoder implementations.
//!
//! Every backend implements [`QueryEncoder`] from the core crate:
//! - **[`DisabledEncoder`]**: fails every call; used when no model is configured.
//! - **[`LocalEncoder`]**: runs a sentence-embedding model in-process via fastembed
//!   (primary) or tract (musl/Intel Mac). The model is loaded once at startup.
//! - **[`OllamaEncoder`]**: calls a local Ollama instance's `/api/embed` endpoint.
//! - **[`OpenAIEncoder`]**: calls the OpenAI embeddings API.
//!
//! None of them retry: the first failure is returned to the engine, which
//! reports it as an encoding failure.
//!
//! # Provider Selection
//!
//! | Config Value | Encoder |
//! |-------------|----------|
//! | `"disabled"` | [`DisabledEncoder`] |
//! | `"local"` | `LocalEncoder` (fastembed or tract, see features) |
//! | `"ollama"` | [`OllamaEncoder`] |
//! | `"openai"` | [`OpenAIEncoder`] |

#[cfg(feature = "local-embeddings-tract")]
mod local_tract;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use qa_context_core::embedding::QueryEncoder;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;

/// Model used by the `local` provider when `embedding.model` is unset.
/// Multilingual, since corpus and queries are not assumed to be English.
pub const DEFAULT_LOCAL_MODEL: &str = "multilingual-e5-small";

/// Build the encoder named by `embedding.provider`.
///
/// For `local`, this downloads (first run) and loads the model, so it is
/// called once at startup rather than per query.
pub async fn create_encoder(config: &EmbeddingConfig) -> Result<Arc<dyn QueryEncoder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEncoder)),
        "openai" => Ok(Arc::new(OpenAIEncoder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEncoder::new(config)?)),
        #[cfg(any(feature = "local-embeddings-fastembed", feature = "local-embeddings-tract"))]
        "local" => Ok(Arc::new(LocalEncoder::load(config).await?)),
        #[cfg(not(any(feature = "local-embeddings-fastembed", feature = "local-embeddings-tract")))]
        "local" => bail!(
            "Local embedding provider requires one of: --features local-embeddings-fastembed, --features local-embeddings-tract"
        ),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Disabled ============

/// Encoder that always fails.
pub struct DisabledEncoder;

#[async_trait]
impl QueryEncoder for DisabledEncoder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn encode(&self, _text: &str) -> Result<Vec<f32>> {
        bail!("Embedding provider is disabled")
    }
}

// ============ OpenAI ============

/// Encoder backed by `POST https://api.openai.com/v1/embeddings`.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAIEncoder {
    model: String,
    dims: usize,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIEncoder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims,
            api_key,
            client,
        })
    }
}

#[async_trait]
impl QueryEncoder for OpenAIEncoder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        first_embedding(self.encode_batch(&[text.to_string()]).await?)
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post("https://api.openai.com/v1/embeddings")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("OpenAI API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        parse_openai_response(&json)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        indexed.push((index, json_floats(embedding)?));
    }

    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama ============

/// Encoder backed by a local Ollama instance (`POST {url}/api/embed`).
///
/// Requires an embedding model pulled into Ollama (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaEncoder {
    model: String,
    dims: usize,
    url: String,
    client: reqwest::Client,
}

impl OllamaEncoder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims,
            url,
            client,
        })
    }
}

#[async_trait]
impl QueryEncoder for OllamaEncoder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        first_embedding(self.encode_batch(&[text.to_string()]).await?)
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post(format!("{}/api/embed", self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                anyhow!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.url,
                    e
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Ollama API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|embedding| {
            let arr = embedding
                .as_array()
                .ok_or_else(|| anyhow!("Invalid Ollama response: embedding is not an array"))?;
            json_floats(arr)
        })
        .collect()
}

fn json_floats(values: &[serde_json::Value]) -> Result<Vec<f32>> {
    values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| anyhow!("Invalid embedding value: {}", v))
        })
        .collect()
}

fn first_embedding(batch: Vec<Vec<f32>>) -> Result<Vec<f32>> {
    batch
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Empty embedding response"))
}

// ============ Local (fastembed or tract) ============

/// Resolve the local model name and its output width.
pub fn resolve_local_model(config: &EmbeddingConfig) -> (String, usize) {
    let model_name = config
        .model
        .clone()
        .unwrap_or_else(|| DEFAULT_LOCAL_MODEL.to_string());

    let dims = config.dims.unwrap_or(match model_name.as_str() {
        "all-minilm-l6-v2" => 384,
        "bge-small-en-v1.5" => 384,
        "bge-base-en-v1.5" => 768,
        "bge-large-en-v1.5" => 1024,
        "nomic-embed-text-v1" | "nomic-embed-text-v1.5" => 768,
        "multilingual-e5-small" => 384,
        "multilingual-e5-base" => 768,
        "multilingual-e5-large" => 1024,
        "paraphrase-multilingual-minilm-l12-v2" => 384,
        "paraphrase-multilingual-mpnet-base-v2" => 768,
        _ => 384,
    });

    (model_name, dims)
}

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV1),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        "paraphrase-multilingual-minilm-l12-v2" => {
            Ok(fastembed::EmbeddingModel::ParaphraseMLMiniLML12V2)
        }
        "paraphrase-multilingual-mpnet-base-v2" => {
            Ok(fastembed::EmbeddingModel::ParaphraseMLMpnetBaseV2)
        }
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1, nomic-embed-text-v1.5, \
             multilingual-e5-small, multilingual-e5-base, multilingual-e5-large, \
             paraphrase-multilingual-minilm-l12-v2, paraphrase-multilingual-mpnet-base-v2",
            other
        ),
    }
}

/// In-process sentence-embedding model.
///
/// Inference needs exclusive access to the model, so calls are serialized
/// through a mutex and run on the blocking pool.
#[cfg(any(feature = "local-embeddings-fastembed", feature = "local-embeddings-tract"))]
pub struct LocalEncoder {
    model_name: String,
    dims: usize,
    batch_size: usize,
    #[cfg(feature = "local-embeddings-fastembed")]
    model: Arc<std::sync::Mutex<fastembed::TextEmbedding>>,
    #[cfg(all(feature = "local-embeddings-tract", not(feature = "local-embeddings-fastembed")))]
    model: Arc<local_tract::TractModel>,
}

#[cfg(any(feature = "local-embeddings-fastembed", feature = "local-embeddings-tract"))]
impl LocalEncoder {
    /// Download (first run) and load the configured model.
    pub async fn load(config: &EmbeddingConfig) -> Result<Self> {
        let (model_name, dims) = resolve_local_model(config);
        tracing::info!(model = %model_name, dims, "loading local embedding model");

        #[cfg(feature = "local-embeddings-fastembed")]
        let model = {
            let fastembed_model = config_to_fastembed_model(&model_name)?;
            let loaded = tokio::task::spawn_blocking(move || {
                fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
                )
                .map_err(|e| anyhow!("Failed to initialize local embedding model: {}", e))
            })
            .await??;
            Arc::new(std::sync::Mutex::new(loaded))
        };

        #[cfg(all(feature = "local-embeddings-tract", not(feature = "local-embeddings-fastembed")))]
        let model = {
            let name = model_name.clone();
            Arc::new(tokio::task::spawn_blocking(move || local_tract::TractModel::load(&name)).await??)
        };

        Ok(Self {
            model_name,
            dims,
            batch_size: config.batch_size,
            model,
        })
    }

    #[cfg(feature = "local-embeddings-fastembed")]
    async fn run(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        let batch_size = self.batch_size;
        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| anyhow!("Local embedding model lock poisoned"))?;
            model
                .embed(texts, Some(batch_size))
                .map_err(|e| anyhow!("Local embedding failed: {}", e))
        })
        .await?
    }

    #[cfg(all(feature = "local-embeddings-tract", not(feature = "local-embeddings-fastembed")))]
    async fn run(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        let batch_size = self.batch_size;
        tokio::task::spawn_blocking(move || model.embed(&texts, batch_size)).await?
    }
}

#[cfg(any(feature = "local-embeddings-fastembed", feature = "local-embeddings-tract"))]
#[async_trait]
impl QueryEncoder for LocalEncoder {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        first_embedding(self.run(vec![text.to_string()]).await?)
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.run(texts.to_vec()).await
    }
}
