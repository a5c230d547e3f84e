//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **[`GeminiProvider`]**: calls the Gemini `batchEmbedContents` API (default).
//! - **[`OpenAIProvider`]**: calls the OpenAI embeddings API.
//! - **[`OllamaProvider`]**: calls a local Ollama instance's `/api/embed` endpoint.
//! - **`LocalProvider`**: runs models locally via fastembed (`local-embeddings` feature).
//!
//! Also provides the vector utilities used by the on-disk index:
//! - [`cosine_similarity`]: compute similarity between two embedding vectors
//! - [`vec_to_blob`]: encode a `Vec<f32>` as little-endian bytes for SQLite BLOB storage
//! - [`blob_to_vec`]: decode a SQLite BLOB back into a `Vec<f32>`
//!
//! # Provider Selection
//!
//! | Config Value | Provider | Credentials |
//! |-------------|----------|-------------|
//! | `"gemini"` | [`GeminiProvider`] | `GOOGLE_API_KEY` or `GEMINI_API_KEY` |
//! | `"openai"` | [`OpenAIProvider`] | `OPENAI_API_KEY` |
//! | `"ollama"` | [`OllamaProvider`] | none |
//! | `"local"` | `LocalProvider` | none |
//!
//! The index records which model built it; [`crate::store::VectorStore::load`]
//! refuses to pair an index with a provider of a different model or width.

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{api_key_from_env, EmbeddingConfig};
use crate::error::{Error, Result};
use crate::http::{client_with_timeout, send_json_with_retry, RetryPolicy};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

const GEMINI_DEFAULT_MODEL: &str = "models/text-embedding-004";
const GEMINI_DEFAULT_DIMS: usize = 768;

/// Trait for embedding providers.
///
/// Vectors are returned in input order and are exactly [`dims`](Self::dims)
/// wide.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"models/text-embedding-004"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `768`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single query text.
pub async fn embed_query(provider: &dyn EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
    let results = provider.embed(&[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| Error::Embedding("empty embedding response".to_string()))
}

/// Check that the remote returned one vector of the expected width per input.
fn check_shape(
    vectors: Vec<Vec<f32>>,
    expected_len: usize,
    dims: usize,
) -> anyhow::Result<Vec<Vec<f32>>> {
    if vectors.len() != expected_len {
        bail!(
            "expected {} embeddings, got {}",
            expected_len,
            vectors.len()
        );
    }
    if let Some(v) = vectors.iter().find(|v| v.len() != dims) {
        bail!("expected {}-dimensional embeddings, got {}", dims, v.len());
    }
    if vectors.iter().flatten().any(|x| !x.is_finite()) {
        bail!("embedding contains NaN or infinite values");
    }
    Ok(vectors)
}

fn json_floats(values: &serde_json::Value) -> anyhow::Result<Vec<f32>> {
    let arr = values
        .as_array()
        .ok_or_else(|| anyhow!("embedding is not an array"))?;
    arr.iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| anyhow!("embedding contains a non-number"))
        })
        .collect()
}

// ============ Gemini Provider ============

/// Embedding provider using the Gemini API.
///
/// Calls `POST /v1beta/{model}:batchEmbedContents`, one request per batch.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dims: usize,
    base_url: String,
    policy: RetryPolicy,
}

impl GeminiProvider {
    /// Create a provider reading the API key from the environment.
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let api_key = api_key_from_env(&["GOOGLE_API_KEY", "GEMINI_API_KEY"])?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &EmbeddingConfig, api_key: String) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| GEMINI_DEFAULT_MODEL.to_string());
        let model = if model.starts_with("models/") {
            model
        } else {
            format!("models/{}", model)
        };

        Ok(Self {
            client: client_with_timeout(config.timeout_secs)?,
            api_key,
            model,
            dims: config.dims.unwrap_or(GEMINI_DEFAULT_DIMS),
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            policy: RetryPolicy::new(config.max_retries, config.backoff_ms),
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let url = format!(
            "{}/v1beta/{}:batchEmbedContents",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let requests: Vec<serde_json::Value> = texts
            .iter()
            .map(|t| {
                serde_json::json!({
                    "model": self.model,
                    "content": { "parts": [{ "text": t }] },
                })
            })
            .collect();
        let body = serde_json::json!({ "requests": requests });

        let json = send_json_with_retry("Gemini embeddings API", &self.policy, || {
            self.client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
        })
        .await?;

        parse_gemini_response(&json)
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.embed_batch(texts)
            .await
            .and_then(|v| check_shape(v, texts.len(), self.dims))
            .map_err(|e| Error::Embedding(format!("{:#}", e)))
    }
}

/// Extracts `embeddings[].values` in order.
fn parse_gemini_response(json: &serde_json::Value) -> anyhow::Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid Gemini response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|item| {
            let values = item
                .get("values")
                .ok_or_else(|| anyhow!("Invalid Gemini response: missing values"))?;
            json_floats(values)
        })
        .collect()
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API (`POST /v1/embeddings`).
pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dims: usize,
    base_url: String,
    policy: RetryPolicy,
}

impl OpenAIProvider {
    /// # Errors
    ///
    /// Returns an error if `model` or `dims` is not set in config,
    /// or if `OPENAI_API_KEY` is not in the environment.
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = api_key_from_env(&["OPENAI_API_KEY"])?;

        Ok(Self {
            client: client_with_timeout(config.timeout_secs)?,
            api_key,
            model,
            dims,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            policy: RetryPolicy::new(config.max_retries, config.backoff_ms),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let result = async {
            let json = send_json_with_retry("OpenAI embeddings API", &self.policy, || {
                self.client
                    .post(&url)
                    .bearer_auth(&self.api_key)
                    .json(&body)
            })
            .await?;
            check_shape(parse_openai_response(&json)?, texts.len(), self.dims)
        }
        .await;

        result.map_err(|e| Error::Embedding(format!("{:#}", e)))
    }
}

/// Extracts `data[].embedding`, ordered by `data[].index`.
fn parse_openai_response(json: &serde_json::Value) -> anyhow::Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .unwrap_or(pos as u64);
        indexed.push((index, json_floats(embedding)?));
    }
    indexed.sort_by_key(|(i, _)| *i);

    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default: `http://localhost:11434`).
pub struct OllamaProvider {
    client: reqwest::Client,
    model: String,
    dims: usize,
    url: String,
    policy: RetryPolicy,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
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
            .unwrap_or_else(|| OLLAMA_BASE_URL.to_string());

        Ok(Self {
            client: client_with_timeout(config.timeout_secs)?,
            model,
            dims,
            url,
            policy: RetryPolicy::new(config.max_retries, config.backoff_ms),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let endpoint = format!("{}/api/embed", self.url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let result = async {
            let json = send_json_with_retry("Ollama API", &self.policy, || {
                self.client.post(&endpoint).json(&body)
            })
            .await
            .map_err(|e| anyhow!("{:#} (is Ollama running at {}?)", e, self.url))?;
            check_shape(parse_ollama_response(&json)?, texts.len(), self.dims)
        }
        .await;

        result.map_err(|e| Error::Embedding(format!("{:#}", e)))
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> anyhow::Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?;

    embeddings.iter().map(json_floats).collect()
}

// ============ Local Provider (fastembed) ============

/// Embedding provider for local inference via fastembed.
///
/// Models are downloaded on first use from Hugging Face and cached.
/// After initial download, no network calls are needed.
#[cfg(feature = "local-embeddings")]
pub struct LocalProvider {
    model_name: String,
    dims: usize,
    batch_size: usize,
    model: Arc<std::sync::Mutex<fastembed::TextEmbedding>>,
}

#[cfg(feature = "local-embeddings")]
impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "multilingual-e5-small".to_string());
        let (fastembed_model, default_dims) = config_to_fastembed_model(&model_name)?;
        let model = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
        )
        .map_err(|e| anyhow!("Failed to initialize local embedding model: {}", e))?;

        Ok(Self {
            model_name,
            dims: config.dims.unwrap_or(default_dims),
            batch_size: config.batch_size,
            model: Arc::new(std::sync::Mutex::new(model)),
        })
    }
}

#[cfg(feature = "local-embeddings")]
#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = self.model.clone();
        let batch_size = self.batch_size;
        let owned = texts.to_vec();
        let expected = texts.len();
        let dims = self.dims;

        let result = tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| anyhow!("local embedding model lock poisoned"))?;
            model
                .embed(owned, Some(batch_size))
                .map_err(|e| anyhow!("Local embedding failed: {}", e))
        })
        .await
        .map_err(|e| anyhow!("Local embedding task failed: {}", e))
        .and_then(|r| r)
        .and_then(|v| check_shape(v, expected, dims));

        result.map_err(|e| Error::Embedding(format!("{:#}", e)))
    }
}

#[cfg(feature = "local-embeddings")]
fn config_to_fastembed_model(name: &str) -> anyhow::Result<(fastembed::EmbeddingModel, usize)> {
    match name {
        "all-minilm-l6-v2" => Ok((fastembed::EmbeddingModel::AllMiniLML6V2, 384)),
        "bge-small-en-v1.5" => Ok((fastembed::EmbeddingModel::BGESmallENV15, 384)),
        "multilingual-e5-small" => Ok((fastembed::EmbeddingModel::MultilingualE5Small, 384)),
        "multilingual-e5-base" => Ok((fastembed::EmbeddingModel::MultilingualE5Base, 768)),
        "multilingual-e5-large" => Ok((fastembed::EmbeddingModel::MultilingualE5Large, 1024)),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, \
             multilingual-e5-small, multilingual-e5-base, multilingual-e5-large",
            other
        ),
    }
}

/// Create the [`EmbeddingProvider`] named by `config.provider`.
///
/// # Errors
///
/// Returns an error for unknown provider names or if the provider
/// cannot be initialized (missing config, API key, or feature flag).
pub fn create_provider(config: &EmbeddingConfig) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiProvider::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Arc::new(LocalProvider::new(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use syllabus_advisor::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector. Trailing bytes that do not form
/// a whole `f32` are ignored; callers validate the length first.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors of
/// different lengths, zero vectors, and vectors with NaN components.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    // f64 accumulators: squares of large f32 components overflow f32.
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    let sim = dot / denom;
    if !sim.is_finite() || denom < f64::from(f32::EPSILON) {
        return 0.0;
    }

    sim as f32
}
